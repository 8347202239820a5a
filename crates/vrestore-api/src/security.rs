//! Input validation for user-supplied URLs and identifiers.
//!
//! The upload relay fetches whatever URL the client hands it, so every URL
//! is checked against a host allowlist and a blocklist of internal address
//! patterns before any outbound request is made.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;
use url::Url;

/// Maximum URL length accepted in request bodies.
pub const MAX_URL_LENGTH: usize = 2048;

/// Hosts the relay is allowed to fetch from. Sources arrive from the
/// storage service's upload widget and outputs from the inference
/// provider's delivery CDN; nothing else is a legitimate origin.
static ALLOWED_DOMAINS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        // Storage service (widget uploads and previously relayed assets)
        "cloudinary.com",
        "res.cloudinary.com",
        // Inference provider output delivery
        "replicate.delivery",
        "replicate.com",
        // Firebase / GCS hosted sources
        "firebasestorage.googleapis.com",
        "storage.googleapis.com",
        // Own CDN
        "cdn.vidrestore.io",
    ])
});

/// Blocked URL patterns (internal ranges and cloud metadata endpoints).
static BLOCKED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^https?://127\.").unwrap(),
        Regex::new(r"^https?://localhost").unwrap(),
        Regex::new(r"^https?://10\.").unwrap(),
        Regex::new(r"^https?://172\.(1[6-9]|2[0-9]|3[0-1])\.").unwrap(),
        Regex::new(r"^https?://192\.168\.").unwrap(),
        Regex::new(r"^https?://169\.254\.").unwrap(),
        Regex::new(r"^https?://\[::1\]").unwrap(),
        Regex::new(r"^https?://\[fd").unwrap(),
        Regex::new(r"^https?://\[fe80").unwrap(),
        Regex::new(r"^https?://metadata\.").unwrap(),
        Regex::new(r"^https?://169\.254\.169\.254").unwrap(),
    ]
});

/// Result of URL validation.
#[derive(Debug)]
pub enum UrlValidationResult {
    /// URL is valid and allowed.
    Valid(String),
    /// URL is malformed or uses an unsupported protocol.
    Invalid(String),
    /// URL host is not in the allowlist.
    DomainNotAllowed(String),
    /// URL matches a blocked pattern.
    Blocked(String),
    /// URL exceeds the maximum length.
    TooLong,
}

impl UrlValidationResult {
    /// Convert to Result for easy error handling.
    pub fn into_result(self) -> Result<String, String> {
        match self {
            Self::Valid(url) => Ok(url),
            Self::Invalid(msg) => Err(msg),
            Self::DomainNotAllowed(domain) => Err(format!(
                "Domain '{}' is not a supported media source",
                domain
            )),
            Self::Blocked(reason) => Err(reason),
            Self::TooLong => Err(format!(
                "URL exceeds maximum length of {} characters",
                MAX_URL_LENGTH
            )),
        }
    }
}

/// Validate a media URL before the relay fetches it.
///
/// Checks length, http(s) scheme, the blocked-pattern list, and the host
/// allowlist, in that order.
pub fn validate_media_url(url: &str) -> UrlValidationResult {
    if url.len() > MAX_URL_LENGTH {
        return UrlValidationResult::TooLong;
    }

    let url = url.trim();
    if url.is_empty() {
        return UrlValidationResult::Invalid("URL cannot be empty".to_string());
    }

    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => return UrlValidationResult::Invalid(format!("Invalid URL format: {}", e)),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return UrlValidationResult::Invalid(format!(
                "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
                scheme
            ))
        }
    }

    for pattern in BLOCKED_PATTERNS.iter() {
        if pattern.is_match(url) {
            warn!(url = %url, "Blocked URL pattern detected");
            return UrlValidationResult::Blocked(
                "URL appears to target an internal or restricted endpoint".to_string(),
            );
        }
    }

    let domain = match parsed.host_str() {
        Some(d) => d.to_lowercase(),
        None => return UrlValidationResult::Invalid("URL must have a valid host".to_string()),
    };

    if !is_domain_allowed(&domain) {
        return UrlValidationResult::DomainNotAllowed(domain);
    }

    UrlValidationResult::Valid(url.to_string())
}

/// Check if a host or its parent domain is in the allowlist. Subdomains of
/// allowed domains pass (e.g. `pbxt.replicate.delivery`).
fn is_domain_allowed(domain: &str) -> bool {
    if ALLOWED_DOMAINS.contains(domain) {
        return true;
    }

    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() >= 2 {
        let parent = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
        if ALLOWED_DOMAINS.contains(parent.as_str()) {
            return true;
        }
    }

    false
}

/// Validate a provider job id before it is used in a cache lookup.
///
/// Valid format: alphanumeric characters and hyphens only, 8-64 chars.
pub fn is_valid_job_id(id: &str) -> bool {
    if id.len() < 8 || id.len() > 64 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_storage_urls() {
        assert!(matches!(
            validate_media_url("https://res.cloudinary.com/demo/video/upload/v1/source.mp4"),
            UrlValidationResult::Valid(_)
        ));
        assert!(matches!(
            validate_media_url("https://pbxt.replicate.delivery/output/restored.mp4"),
            UrlValidationResult::Valid(_)
        ));
        assert!(matches!(
            validate_media_url("https://firebasestorage.googleapis.com/v0/b/app/o/in.mp4"),
            UrlValidationResult::Valid(_)
        ));
    }

    #[test]
    fn test_blocked_internal_addresses() {
        assert!(matches!(
            validate_media_url("http://127.0.0.1/video.mp4"),
            UrlValidationResult::Blocked(_)
        ));
        assert!(matches!(
            validate_media_url("http://localhost:6379/video.mp4"),
            UrlValidationResult::Blocked(_)
        ));
        assert!(matches!(
            validate_media_url("http://192.168.1.10/video.mp4"),
            UrlValidationResult::Blocked(_)
        ));
        assert!(matches!(
            validate_media_url("http://169.254.169.254/latest/meta-data/"),
            UrlValidationResult::Blocked(_)
        ));
    }

    #[test]
    fn test_unknown_domains_rejected() {
        assert!(matches!(
            validate_media_url("https://attacker.example.com/video.mp4"),
            UrlValidationResult::DomainNotAllowed(_)
        ));
    }

    #[test]
    fn test_invalid_protocols() {
        assert!(matches!(
            validate_media_url("ftp://res.cloudinary.com/video.mp4"),
            UrlValidationResult::Invalid(_)
        ));
        assert!(matches!(
            validate_media_url("javascript:alert(1)"),
            UrlValidationResult::Invalid(_)
        ));
    }

    #[test]
    fn test_overlong_url_rejected() {
        let url = format!("https://res.cloudinary.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(matches!(
            validate_media_url(&url),
            UrlValidationResult::TooLong
        ));
    }

    #[test]
    fn test_job_id_validation() {
        assert!(is_valid_job_id("rrr4gcvdcnbzfhka3dwnwnpbre"));
        assert!(is_valid_job_id("abc-1234-def"));
        assert!(!is_valid_job_id("short"));
        assert!(!is_valid_job_id("has space"));
        assert!(!is_valid_job_id("has/slash"));
        assert!(!is_valid_job_id(&"a".repeat(65)));
    }
}
