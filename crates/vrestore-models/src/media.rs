//! Media descriptors shared between the upload relay and the session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Pixel dimensions of a video frame or mask image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaDimensions {
    pub width: u32,
    pub height: u32,
}

impl MediaDimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Exact match check used by the mask-resolution precondition.
    pub fn matches(&self, other: &MediaDimensions) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl fmt::Display for MediaDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Role of an asset in durable storage. Selects the target folder and
/// the transcode profile applied on upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadRole {
    /// User-supplied source video, normalized for inference
    Original,
    /// Restored output coming back from the provider
    Enhanced,
}

impl UploadRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadRole::Original => "original",
            UploadRole::Enhanced => "enhanced",
        }
    }
}

impl fmt::Display for UploadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UploadRole {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "original" => Ok(UploadRole::Original),
            "enhanced" => Ok(UploadRole::Enhanced),
            _ => Err(RoleParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown upload role: {0}")]
pub struct RoleParseError(String);

/// A durably stored asset returned by the upload relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedMedia {
    /// Durable public URL served by the storage service
    pub url: String,
    /// Storage-service asset identifier
    pub public_id: String,
}
