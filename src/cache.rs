//! On-disk detection cache stored next to the media file as `<file>.json`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::detect::DetectionResult;

pub fn cache_path_for(input: &Path) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(".json");
    PathBuf::from(name)
}

/// Reads a cached buffer. `Ok(None)` when no cache file exists; a cache that
/// exists but does not parse is an error.
pub fn load(path: &Path) -> Result<Option<Vec<DetectionResult>>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read cache {}", path.display()))?;
    let buffer: Vec<DetectionResult> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid detection cache {}", path.display()))?;
    log_error_events(path, &buffer);
    Ok(Some(buffer))
}

pub fn save(path: &Path, buffer: &[DetectionResult]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let raw = serde_json::to_string_pretty(buffer)?;
    fs::write(path, raw).with_context(|| format!("failed to write cache {}", path.display()))?;
    log::debug!("cached {} results at {}", buffer.len(), path.display());
    Ok(())
}

/// Worker-side error events ride along in the buffer; surface them.
pub fn log_error_events(source: &Path, buffer: &[DetectionResult]) {
    for event in buffer.iter().filter_map(|r| r.event.as_ref()) {
        if event.is_error() {
            log::warn!(
                "{}: error event: {}",
                source.display(),
                event.message.as_deref().unwrap_or("(no message)")
            );
        }
    }
}
