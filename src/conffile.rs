//! Conffile tracking and conflict resolution.
//!
//! Each installed package records the MD5 of every conffile *as shipped*
//! (not as found on disk), so the next upgrade can tell user edits from
//! package changes with a three-way comparison: last shipped hash, on-disk
//! hash, newly shipped hash.

use anyhow::{Context, Result};
use log::{info, warn};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::checksum;
use crate::config::Config;
use crate::fsutil;
use crate::info;
use crate::pathsafe;
use crate::runner;

/// Suffix used to divert newly shipped conffiles next to the live file.
pub const CF_SUFFIX: &str = ".aept-new";

#[derive(Debug, Default, Clone)]
pub struct ConffileSet {
    entries: Vec<(String, Option<String>)>,
}

impl ConffileSet {
    pub fn add(&mut self, path: &str, md5: Option<String>) {
        self.entries.push((path.to_string(), md5));
    }

    pub fn lookup(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .and_then(|(_, md5)| md5.as_deref())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }
}

/// Parse the shipped `conffiles` list from an extracted control dir.
/// Unsafe paths are warned about and skipped.
pub fn parse_list(control_dir: &Path) -> Result<ConffileSet> {
    let mut set = ConffileSet::default();
    let path = control_dir.join("conffiles");

    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(set),
        Err(e) => return Err(e).context(format!("cannot read '{}'", path.display())),
    };

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !pathsafe::archive_path_is_safe(line) {
            warn!("ignoring unsafe conffile path '{}'", line);
            continue;
        }
        set.add(line, None);
    }

    Ok(set)
}

/// Load the saved `<name>.conffiles` (`<md5hex>  <absolute-path>` lines).
pub fn load(cfg: &Config, name: &str) -> Result<ConffileSet> {
    let mut set = ConffileSet::default();
    let path = info::info_path(cfg, name, "conffiles");

    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(set),
        Err(e) => return Err(e).context(format!("cannot read '{}'", path.display())),
    };

    for line in content.lines() {
        if let Some((md5, file_path)) = line.split_once(' ') {
            let file_path = file_path.trim_start();
            if !md5.is_empty() && !file_path.is_empty() {
                set.add(file_path, Some(md5.to_string()));
            }
        }
    }

    Ok(set)
}

pub fn save(cfg: &Config, name: &str, set: &ConffileSet) -> Result<()> {
    std::fs::create_dir_all(&cfg.info_dir)?;
    let mut out = String::new();
    for (path, md5) in &set.entries {
        if let Some(md5) = md5 {
            out.push_str(md5);
            out.push_str("  ");
            out.push_str(path);
            out.push('\n');
        }
    }
    fsutil::write_atomic(&info::info_path(cfg, name, "conffiles"), out.as_bytes())
}

/// Hash every declared conffile as found on disk right after a fresh
/// install (where on-disk is exactly the shipped file) and record the set.
pub fn record_fresh(cfg: &Config, name: &str, shipped: &ConffileSet) -> Result<()> {
    let mut result = ConffileSet::default();
    for path in shipped.paths() {
        let md5 = checksum::md5sum(&cfg.root_path(path))?;
        result.add(path, md5);
    }
    save(cfg, name, &result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    InstallNew,
    KeepOld,
    /// Keep the old file but leave the shipped version next to it for
    /// admin review.
    Defer,
}

enum Resolution {
    Decided(Decision),
    NeedsPrompt,
}

/// The three-way decision table over (last shipped, on-disk, newly
/// shipped) hashes.
fn three_way(old: Option<&str>, disk: Option<&str>, new: Option<&str>) -> Resolution {
    use Resolution::*;

    match (disk, new) {
        // Nothing on disk: take the shipped version.
        (None, _) => Decided(Decision::InstallNew),
        // New version was not extracted: nothing to decide.
        (Some(_), None) => Decided(Decision::KeepOld),
        (Some(disk), Some(new)) => {
            if disk == new {
                Decided(Decision::KeepOld)
            } else if old == Some(disk) {
                // User never touched it: follow the package.
                Decided(Decision::InstallNew)
            } else if old == Some(new) {
                // Package did not change it: keep the user's edit.
                Decided(Decision::KeepOld)
            } else {
                NeedsPrompt
            }
        }
    }
}

fn prompt(cfg: &Config, cf_path: &str, disk_path: &Path, new_path: &Path) -> Result<Decision> {
    if cfg.force_confnew {
        return Ok(Decision::InstallNew);
    }
    if cfg.force_confold {
        return Ok(Decision::KeepOld);
    }

    if !std::io::stdin().is_terminal() {
        warn!(
            "'{}' has been modified; keeping old version, review '{}{}'",
            cf_path, cf_path, CF_SUFFIX
        );
        return Ok(Decision::Defer);
    }

    loop {
        println!();
        println!("Configuration file '{}'", cf_path);
        println!(" ==> Modified (by you or by a script) since installation.");
        println!(" ==> Package distributor has shipped an updated version.");
        println!("   What would you like to do about it?");
        println!("    Y or I  : install the package maintainer's version");
        println!("    N or O  : keep your currently-installed version");
        println!("      D     : show the differences between the versions");
        println!("      Z     : start a shell to examine the situation");
        println!(" The default action is to keep your current version.");

        let answer: String = dialoguer::Input::new()
            .with_prompt(format!("*** {} (Y/I/N/O/D/Z) [default=N]", cf_path))
            .allow_empty(true)
            .interact_text()?;

        match answer.trim().chars().next() {
            None | Some('n') | Some('N') | Some('o') | Some('O') => {
                return Ok(Decision::KeepOld)
            }
            Some('y') | Some('Y') | Some('i') | Some('I') => {
                return Ok(Decision::InstallNew)
            }
            Some('d') | Some('D') => {
                let disk = disk_path.to_string_lossy();
                let new = new_path.to_string_lossy();
                runner::system(&["diff", "-u", &disk, &new]).ok();
            }
            Some('z') | Some('Z') => {
                let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into());
                println!("Type 'exit' to return to the conffile prompt.");
                runner::system(&[&shell]).ok();
            }
            _ => {}
        }
    }
}

fn new_path_for(disk_path: &Path) -> PathBuf {
    let mut s = disk_path.as_os_str().to_owned();
    s.push(CF_SUFFIX);
    PathBuf::from(s)
}

/// Resolve every conffile of an upgraded package, consuming the diverted
/// `.aept-new` files, and record the newly shipped hashes so the *next*
/// upgrade compares against the right baseline.
pub fn resolve_upgrade(
    cfg: &Config,
    name: &str,
    old_conffiles: &ConffileSet,
    new_conffiles: &ConffileSet,
) -> Result<()> {
    let mut result = ConffileSet::default();

    for cf_path in new_conffiles.paths() {
        let disk_path = cfg.root_path(cf_path);
        let new_path = new_path_for(&disk_path);

        let old_md5 = old_conffiles.lookup(cf_path);
        let disk_md5 = checksum::md5sum(&disk_path)?;
        let new_md5 = checksum::md5sum(&new_path)?;

        let decision = match three_way(old_md5, disk_md5.as_deref(), new_md5.as_deref()) {
            Resolution::Decided(d) => d,
            Resolution::NeedsPrompt => prompt(cfg, cf_path, &disk_path, &new_path)?,
        };

        match decision {
            Decision::InstallNew => {
                if new_md5.is_some() {
                    if let Err(e) = std::fs::rename(&new_path, &disk_path) {
                        warn!("failed to install new conffile '{}': {}", cf_path, e);
                    }
                }
            }
            Decision::KeepOld => {
                std::fs::remove_file(&new_path).ok();
                if old_md5.is_some() && disk_md5.is_some() && old_md5 != disk_md5.as_deref()
                {
                    info!("keeping user-modified '{}'", cf_path);
                }
            }
            Decision::Defer => {}
        }

        result.add(cf_path, new_md5);
    }

    save(cfg, name, &result)
}
