use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Appends `[<rfc3339 timestamp>] <error chain>` to `path`, creating it if needed.
pub fn append_error_log(path: &Path, err: &anyhow::Error) -> Result<()> {
    let line = format_entry(&chrono::Utc::now().to_rfc3339(), err);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open error log {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to write error log {}", path.display()))?;
    Ok(())
}

fn format_entry(timestamp: &str, err: &anyhow::Error) -> String {
    format!("[{timestamp}] {err:?}\n")
}
