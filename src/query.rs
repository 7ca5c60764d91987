//! Read-only queries: `list`, `show`, `files`, `owns`,
//! `print-architecture`. None of these take the state lock; a torn read
//! between status-file renames is acceptable for display purposes.

use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::info;
use crate::parser::Paragraph;
use crate::pathsafe;
use crate::solver::{Pool, RepoKind, SolvableId};
use crate::status;
use crate::transaction;

fn query_pool(cfg: &Config) -> Result<Pool> {
    let mut pool = Pool::new(&cfg.archs);
    pool.load_installed(&status::load(cfg)?)?;
    transaction::load_sources(cfg, &mut pool, false)?;
    pool.rebuild_index();
    Ok(pool)
}

#[derive(Debug)]
pub struct ListEntry {
    pub name: String,
    pub version: String,
    pub summary: Option<String>,
    pub installed: bool,
    pub upgradable: bool,
}

pub fn list(
    cfg: &Config,
    pattern: Option<&str>,
    installed_only: bool,
    upgradable_only: bool,
) -> Result<Vec<ListEntry>> {
    let pool = query_pool(cfg)?;

    let matcher = match pattern {
        Some(p) => Some(
            glob::Pattern::new(p).map_err(|e| anyhow!("bad pattern '{}': {}", p, e))?,
        ),
        None => None,
    };

    // name -> (best available, installed)
    let mut by_name: BTreeMap<&str, (Option<SolvableId>, Option<SolvableId>)> =
        BTreeMap::new();
    for (id, s) in pool.solvables.iter().enumerate() {
        let entry = by_name.entry(&s.name).or_default();
        if s.repo == RepoKind::Installed {
            entry.1 = Some(id);
        } else {
            match entry.0 {
                Some(best) if pool.get(best).version >= s.version => {}
                _ => entry.0 = Some(id),
            }
        }
    }

    let mut out = Vec::new();
    for (name, (available, installed)) in by_name {
        if let Some(m) = &matcher {
            if !m.matches(name) {
                continue;
            }
        }
        if installed_only && installed.is_none() {
            continue;
        }

        let upgradable = match (available, installed) {
            (Some(a), Some(i)) => pool.get(a).version > pool.get(i).version,
            _ => false,
        };
        if upgradable_only && !upgradable {
            continue;
        }

        let show = if installed_only {
            installed.unwrap()
        } else {
            available.or(installed).unwrap()
        };
        let s = pool.get(show);

        out.push(ListEntry {
            name: name.to_string(),
            version: s.version_str().to_string(),
            summary: s.summary().map(str::to_string),
            installed: installed.is_some(),
            upgradable,
        });
    }

    Ok(out)
}

pub struct PkgInfo {
    pub paragraph: Paragraph,
    pub installed: bool,
}

/// Best available candidate preferred over the installed record for
/// display, matching what an install would pick.
pub fn show(cfg: &Config, name: &str) -> Result<Option<PkgInfo>> {
    let pool = query_pool(cfg)?;

    let mut best: Option<SolvableId> = None;
    let mut installed = false;
    for (id, s) in pool.solvables.iter().enumerate() {
        if s.name != name {
            continue;
        }
        if s.repo == RepoKind::Installed {
            installed = true;
            if best.is_none() {
                best = Some(id);
            }
        } else {
            match best {
                Some(b)
                    if pool.get(b).repo != RepoKind::Installed
                        && pool.get(b).version >= s.version => {}
                _ => best = Some(id),
            }
        }
    }

    Ok(best.map(|id| PkgInfo {
        paragraph: pool.get(id).paragraph.clone(),
        installed,
    }))
}

/// Paths of an installed package's `.list`.
pub fn files(cfg: &Config, name: &str) -> Result<Vec<String>> {
    if !pathsafe::pkg_name_is_safe(name) {
        bail!("invalid package name '{}'", name);
    }
    if !info::has_list(cfg, name) {
        bail!("package '{}' is not installed", name);
    }
    info::read_list_paths(cfg, name)
}

fn trimmed(path: &str) -> &str {
    let path = pathsafe::strip_leading(path);
    path.trim_end_matches('/')
}

/// Which installed packages record `path` in their `.list`.
pub fn owns(cfg: &Config, path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        bail!("empty path");
    }
    let needle = trimmed(path);

    let mut owners = Vec::new();
    let dir = match std::fs::read_dir(&cfg.info_dir) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(owners),
        Err(e) => return Err(e.into()),
    };

    for entry in dir {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(pkg) = file_name.to_string_lossy().strip_suffix(".list").map(str::to_string)
        else {
            continue;
        };

        for recorded in info::read_list_paths(cfg, &pkg)? {
            if trimmed(&recorded) == needle {
                owners.push(pkg);
                break;
            }
        }
    }

    owners.sort();
    Ok(owners)
}

pub fn architectures(cfg: &Config) -> &[String] {
    &cfg.archs
}
