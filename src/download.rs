//! External fetcher wrapper. Retry policy lives with the caller: a failed
//! checksum requires a fresh download, which the transaction driver decides
//! on, not this layer.

use anyhow::{bail, Result};
use log::{info, warn};
use std::path::Path;

use crate::runner;

pub fn download(url: &str, dest: &Path, display_name: &str) -> Result<()> {
    info!("downloading {}", display_name);

    if !url.starts_with("https://") {
        warn!("'{}' is not fetched over https", url);
    }

    // A stale partial file must never be mistaken for a fresh download.
    std::fs::remove_file(dest).ok();

    let dest_str = dest.to_string_lossy();
    let r = runner::system(&["wget", "-q", "-O", &dest_str, url])?;
    if r != 0 {
        std::fs::remove_file(dest).ok();
        bail!("failed to download '{}'", url);
    }

    Ok(())
}
