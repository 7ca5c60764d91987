//! Index signature verification through the external `usign` binary.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;
use crate::runner;

pub fn verify_signature(cfg: &Config, file: &Path, sigfile: &Path) -> Result<()> {
    let keydir = cfg.usign_keydir.to_string_lossy();
    let file_str = file.to_string_lossy();
    let sig_str = sigfile.to_string_lossy();

    let r = runner::system(&[
        &cfg.usign_bin,
        "-q",
        "-V",
        "-P",
        &keydir,
        "-m",
        &file_str,
        "-x",
        &sig_str,
    ])?;

    if r != 0 {
        bail!("signature verification failed for '{}'", file.display());
    }

    Ok(())
}
