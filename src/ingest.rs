//! Dataset ingestion: upload, wait for acceptance, attach ground truth.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::client::{mime_for, Asset, AssetStatus, DataClient};
use crate::detect::DetectionResult;
use crate::retry::RetryPolicy;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Unbounded when `None`.
    pub max_polls: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_polls: None,
        }
    }
}

/// Polls until the asset is accepted. `Rejected`/`UploadFailed` end the wait
/// with an error, as does running past `max_polls`.
pub fn wait_for_acceptance<D: DataClient + ?Sized>(
    client: &mut D,
    dataset: &str,
    asset_uuid: &str,
    policy: &PollPolicy,
) -> Result<Asset> {
    let mut polls: u32 = 0;
    loop {
        let asset = client.get_asset(dataset, asset_uuid)?;
        polls += 1;
        match asset.status {
            AssetStatus::Accepted => {
                log::info!("asset {} accepted after {} polls", asset_uuid, polls);
                return Ok(asset);
            }
            status if status.is_failed() => {
                bail!("asset {} ended in status {:?}", asset_uuid, status);
            }
            status => log::info!("asset {} still {:?}", asset_uuid, status),
        }
        if policy.max_polls.is_some_and(|max| polls >= max) {
            bail!("asset {} not accepted after {} polls", asset_uuid, polls);
        }
        if !policy.interval.is_zero() {
            std::thread::sleep(policy.interval);
        }
    }
}

/// Uploads `path`, waits for acceptance and attaches `ground_truth`.
///
/// `Ok(None)` when the upload itself never succeeded; the caller skips the
/// asset. Failures after a successful upload are errors.
pub fn upload_with_ground_truth<D: DataClient + ?Sized>(
    client: &mut D,
    dataset: &str,
    path: &Path,
    ground_truth: &DetectionResult,
    retry: &RetryPolicy,
    poll: &PollPolicy,
) -> Result<Option<Asset>> {
    let mime = mime_for(path);
    let what = format!("upload {}", path.display());
    let uploaded = match retry.run(&what, |_| client.upload_asset(dataset, path, mime)) {
        Ok(asset) => asset,
        Err(err) => {
            log::error!("skipping asset {}: {:#}", path.display(), err);
            return Ok(None);
        }
    };
    log::info!("uploaded {} as {}", path.display(), uploaded.uuid);

    let accepted = wait_for_acceptance(&mut *client, dataset, &uploaded.uuid, poll)?;
    client.update_ground_truth(dataset, &accepted.uuid, ground_truth)?;
    log::info!("ground truth attached to {}", accepted.uuid);
    Ok(Some(accepted))
}
