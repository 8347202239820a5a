//! Cloudinary upload relay for the restoration pipeline.
//!
//! Videos are relayed by URL: the source stays wherever it already is and
//! Cloudinary fetches it directly, so this crate only moves small signed
//! requests. Originals are normalized to an h264 mp4 before inference,
//! enhanced outputs are archived as delivered.

pub mod client;
pub mod error;

pub use client::{CloudinaryClient, CloudinaryConfig};
pub use error::{StorageError, StorageResult};
