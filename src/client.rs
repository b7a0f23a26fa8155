//! Client seams for the remote inference and data APIs.
//!
//! No network transport ships in this crate; binaries use `OfflineClient`
//! and rely on cached detections. Integrations implement these traits.

use std::path::Path;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::detect::DetectionResult;
use crate::pop::PopDefinition;

/// Worker endpoint that runs a pop over media files.
pub trait InferenceClient: Send {
    /// Client identifier.
    fn name(&self) -> &'static str;

    /// Replace the pop the endpoint runs.
    fn change_pop(&mut self, pop: &PopDefinition) -> Result<()>;

    /// Run the current pop over a file and collect every streamed result.
    fn process_file(&mut self, path: &Path, mime_type: &str) -> Result<Vec<DetectionResult>>;
}

/// Dataset storage endpoint.
pub trait DataClient: Send {
    fn name(&self) -> &'static str;

    fn upload_asset(&mut self, dataset: &str, path: &Path, mime_type: &str) -> Result<Asset>;

    fn get_asset(&mut self, dataset: &str, asset_uuid: &str) -> Result<Asset>;

    /// Attach an approved annotation to an uploaded asset.
    fn update_ground_truth(
        &mut self,
        dataset: &str,
        asset_uuid: &str,
        ground_truth: &DetectionResult,
    ) -> Result<()>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub uuid: String,
    #[serde(default)]
    pub status: AssetStatus,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Accepted,
    #[default]
    Pending,
    Rejected,
    UploadFailed,
    /// Any status this crate does not act on (transcoding etc).
    #[serde(other)]
    Other,
}

impl AssetStatus {
    /// Terminal states that will never become `Accepted`.
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Rejected | Self::UploadFailed)
    }
}

/// MIME type derived from the file extension, `application/octet-stream`
/// when unknown.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// Inference client for cache-only runs. Every request fails, so a missing
/// cache entry surfaces as a per-item error.
#[derive(Debug, Default)]
pub struct OfflineClient;

impl InferenceClient for OfflineClient {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn change_pop(&mut self, _pop: &PopDefinition) -> Result<()> {
        Ok(())
    }

    fn process_file(&mut self, path: &Path, _mime_type: &str) -> Result<Vec<DetectionResult>> {
        bail!(
            "no inference endpoint configured and no cached detections for {}",
            path.display()
        )
    }
}
