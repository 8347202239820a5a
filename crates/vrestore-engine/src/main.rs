//! One-shot restoration session driver.
//!
//! Drives a single session end to end against a running backend: relay
//! the source, submit, poll, finalize. Inputs and knobs come from the
//! environment; on success the durable output URL goes to stdout, and
//! the exit code reflects the terminal state.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vrestore_engine::{BackendClient, EngineConfig, MediaInput, RestoreSession, SessionState};
use vrestore_models::{MediaDimensions, RestoreTask};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vrestore=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vrestore-engine");

    let backend = Arc::new(BackendClient::from_env()?);
    let config = EngineConfig::from_env();

    let mut session = RestoreSession::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend,
        config,
    );
    apply_settings_from_env(&mut session)?;

    let source = media_from_env(
        "VRESTORE_SOURCE_URL",
        "VRESTORE_SOURCE_WIDTH",
        "VRESTORE_SOURCE_HEIGHT",
    )?
    .ok_or_else(|| anyhow::anyhow!("missing required env var VRESTORE_SOURCE_URL"))?;
    session.set_source(source);

    if let Some(mask) = media_from_env(
        "VRESTORE_MASK_URL",
        "VRESTORE_MASK_WIDTH",
        "VRESTORE_MASK_HEIGHT",
    )? {
        session.set_mask(mask);
    }

    info!(
        session_id = %session.session_id(),
        task = %session.settings().task(),
        "Session starting"
    );
    let status = session.start().await?;

    match session.state() {
        SessionState::Succeeded { output_url } => {
            info!(output_url = %output_url, "Restoration succeeded");
            println!("{}", output_url);
            Ok(())
        }
        SessionState::Failed => Err(anyhow::anyhow!(
            "provider failed the job after {} resubmissions",
            session.resubmissions()
        )),
        SessionState::Error { message } => Err(anyhow::anyhow!("session error: {}", message)),
        _ => Err(anyhow::anyhow!("session ended in the {} state", status)),
    }
}

/// Optional media input: a URL variable plus a width/height pair for the
/// resolution precondition. Dimensions must come together or not at all.
fn media_from_env(
    url_var: &str,
    width_var: &str,
    height_var: &str,
) -> anyhow::Result<Option<MediaInput>> {
    let url = match std::env::var(url_var) {
        Ok(url) if !url.trim().is_empty() => url,
        _ => return Ok(None),
    };

    let width: Option<u32> = env_parse(width_var);
    let height: Option<u32> = env_parse(height_var);
    let input = match (width, height) {
        (Some(width), Some(height)) => {
            MediaInput::with_dimensions(url, MediaDimensions::new(width, height))
        }
        (None, None) => MediaInput::new(url),
        _ => {
            return Err(anyhow::anyhow!(
                "{} and {} must be set together",
                width_var,
                height_var
            ))
        }
    };
    Ok(Some(input))
}

/// Apply tuning knobs from the environment. Numeric knobs fall back to
/// their defaults when unset or unparsable; a bad task name is an error
/// because it would silently run the wrong pipeline.
fn apply_settings_from_env(session: &mut RestoreSession) -> anyhow::Result<()> {
    if let Ok(task) = std::env::var("VRESTORE_TASK") {
        let task: RestoreTask = task
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid VRESTORE_TASK: {}", e))?;
        session.settings_mut().set_task(task);
    }

    let settings = session.settings_mut();
    if let Some(steps) = env_parse("VRESTORE_NUM_INFERENCE_STEPS") {
        settings.set_num_inference_steps(steps);
    }
    if let Some(size) = env_parse("VRESTORE_DECODE_CHUNK_SIZE") {
        settings.set_decode_chunk_size(size);
    }
    if let Some(overlap) = env_parse("VRESTORE_OVERLAP") {
        settings.set_overlap(overlap);
    }
    if let Some(strength) = env_parse("VRESTORE_NOISE_AUG_STRENGTH") {
        settings.set_noise_aug_strength(strength);
    }
    if let Some(strength) = env_parse("VRESTORE_I2I_NOISE_STRENGTH") {
        settings.set_i2i_noise_strength(strength);
    }
    if let Some(scale) = env_parse("VRESTORE_MIN_APPEARANCE_GUIDANCE") {
        settings.set_min_appearance_guidance_scale(scale);
    }
    if let Some(scale) = env_parse("VRESTORE_MAX_APPEARANCE_GUIDANCE") {
        settings.set_max_appearance_guidance_scale(scale);
    }
    if let Some(seed) = env_parse("VRESTORE_SEED") {
        settings.set_seed(Some(seed));
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
