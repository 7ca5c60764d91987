//! The remove step: prerm gate, list-driven unlink, postrm, state cleanup.

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};

use crate::checksum;
use crate::config::Config;
use crate::conffile;
use crate::fileset::Fileset;
use crate::info;
use crate::pathsafe;
use crate::pin;
use crate::script;
use crate::status;

/// Unlink every file in `<name>.list`, skipping protected paths and (when
/// not purging) conffiles the user has modified since installation.
fn remove_files(cfg: &Config, name: &str, protected: Option<&Fileset>) -> Result<()> {
    let conffiles = if cfg.purge {
        conffile::ConffileSet::default()
    } else {
        conffile::load(cfg, name)?
    };

    for path in info::read_list_paths(cfg, name)? {
        let rel = pathsafe::strip_leading(&path);
        if rel.is_empty() {
            continue;
        }
        // Unsafe paths should never have been recorded; skip in self-defense.
        if !pathsafe::archive_path_is_safe(rel) {
            continue;
        }

        if let Some(protected) = protected {
            if protected.contains(rel) {
                continue;
            }
        }

        let abs = format!("/{}", rel);
        let full = cfg.root_path(&abs);

        if let Some(saved_md5) = conffiles.lookup(&abs) {
            let disk_md5 = checksum::md5sum(&full)?;
            if let Some(disk_md5) = disk_md5 {
                if disk_md5 != saved_md5 {
                    info!("not removing modified conffile '{}'", abs);
                    continue;
                }
            }
        }

        match std::fs::remove_file(&full) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!("cannot remove '{}': {}", full.display(), e),
        }
    }

    Ok(())
}

/// Remove one package. With `new_version` set this is the erase side of a
/// replacement and the maintainer scripts see `upgrade <new_version>`
/// instead of `remove`.
pub fn remove_pkg(
    cfg: &Config,
    name: &str,
    new_version: Option<&str>,
    protected: Option<&Fileset>,
) -> Result<()> {
    if !pathsafe::pkg_name_is_safe(name) {
        bail!("refusing to remove package with unsafe name '{}'", name);
    }

    info!("removing {}", name);

    let script_args: Vec<&str> = match new_version {
        Some(v) => vec!["upgrade", v],
        None => vec!["remove"],
    };

    script::run_script(cfg, &cfg.info_dir, Some(name), "prerm", &script_args)
        .with_context(|| format!("prerm failed for '{}', aborting removal", name))?;

    remove_files(cfg, name, protected)?;

    if let Err(e) = script::run_script(cfg, &cfg.info_dir, Some(name), "postrm", &script_args) {
        warn!("postrm failed for '{}', continuing: {:#}", name, e);
    }

    info::remove_info(cfg, name);

    status::remove(cfg, name)?;
    status::unmark_auto(cfg, name)?;
    pin::remove(cfg, name)?;

    debug!("removed {}", name);
    Ok(())
}
