//! `update`: fetch each source's `Packages` index (and signature) into
//! `lists_dir`.

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use std::path::PathBuf;

use crate::archive;
use crate::config::Config;
use crate::download;
use crate::verify;

fn gz_path(list_path: &PathBuf) -> PathBuf {
    let mut s = list_path.as_os_str().to_owned();
    s.push(".gz");
    PathBuf::from(s)
}

fn sig_path(list_path: &PathBuf) -> PathBuf {
    let mut s = list_path.as_os_str().to_owned();
    s.push(".sig");
    PathBuf::from(s)
}

fn update_source(cfg: &Config, index: usize) -> Result<()> {
    let source = &cfg.sources[index];
    let list_path = cfg.lists_dir.join(&source.name);

    if source.gzip {
        let url = format!("{}/Packages.gz", source.url);
        let gz = gz_path(&list_path);
        download::download(&url, &gz, &source.name)?;
        let r = archive::decompress_gz(&gz, &list_path);
        std::fs::remove_file(&gz).ok();
        r.with_context(|| format!("failed to decompress Packages.gz for '{}'", source.name))?;
    } else {
        let url = format!("{}/Packages", source.url);
        download::download(&url, &list_path, &source.name)?;
    }

    if cfg.check_signature {
        let sig_url = format!("{}/Packages.sig", source.url);
        let sig = sig_path(&list_path);

        if let Err(e) = download::download(&sig_url, &sig, &source.name) {
            std::fs::remove_file(&list_path).ok();
            return Err(e).context(format!("failed to download signature for '{}'", source.name));
        }

        if let Err(e) = verify::verify_signature(cfg, &list_path, &sig) {
            std::fs::remove_file(&list_path).ok();
            std::fs::remove_file(&sig).ok();
            return Err(e);
        }
    }

    info!("updated source '{}'", source.name);
    Ok(())
}

pub fn update(cfg: &Config) -> Result<()> {
    std::fs::create_dir_all(&cfg.lists_dir)
        .with_context(|| format!("cannot create '{}'", cfg.lists_dir.display()))?;

    for source in &cfg.sources {
        if !source.url.starts_with("https://") {
            warn!("source '{}' uses insecure transport", source.name);
        }
    }

    let mut errors = 0;
    for index in 0..cfg.sources.len() {
        if let Err(e) = update_source(cfg, index) {
            error!("{:#}", e);
            errors += 1;
        }
    }

    if errors > 0 {
        bail!("failed to update {} source(s)", errors);
    }
    Ok(())
}
