//! The installed-package database: a stream of Debian control records in
//! `status_file`, plus the newline-delimited auto-installed set.

use anyhow::{Context, Result};
use log::error;
use std::path::Path;

use crate::config::Config;
use crate::fileset::Fileset;
use crate::fsutil;
use crate::parser;

const UNPACKED: &str = "Status: install ok unpacked";
const INSTALLED: &str = "Status: install ok installed";

/// Read the status stream, rewriting `unpacked` to `installed` so the
/// solver treats such packages as present. The on-disk state keeps
/// `unpacked` to flag "postinst did not complete".
pub fn load(cfg: &Config) -> Result<String> {
    if !cfg.status_file.exists() {
        return Ok(String::new());
    }

    let content = std::fs::read_to_string(&cfg.status_file).with_context(|| {
        format!("cannot open status file '{}'", cfg.status_file.display())
    })?;

    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        if line.trim_end() == UNPACKED {
            out.push_str(INSTALLED);
            out.push('\n');
        } else {
            out.push_str(line);
        }
    }

    Ok(out)
}

/// Append a record built from the package's control file. Any previous
/// record for the same name must have been removed first.
pub fn add(cfg: &Config, control_path: &Path, state: &str) -> Result<()> {
    let control = std::fs::read_to_string(control_path).with_context(|| {
        format!("cannot open control file '{}'", control_path.display())
    })?;

    let mut out = String::new();
    if cfg.status_file.exists() {
        let existing = std::fs::read_to_string(&cfg.status_file)?;
        let existing = existing.trim_end();
        if !existing.is_empty() {
            out.push_str(existing);
            out.push_str("\n\n");
        }
    }

    out.push_str(control.trim_end());
    out.push('\n');
    out.push_str(&format!("Status: install ok {}\n\n", state));

    if let Some(parent) = cfg.status_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    fsutil::write_atomic(&cfg.status_file, out.as_bytes())
}

/// Drop every record whose `Package:` field matches `name`. Records are
/// matched as parsed blocks, not by line prefix, so field order does not
/// matter.
pub fn remove(cfg: &Config, name: &str) -> Result<()> {
    let content = match std::fs::read_to_string(&cfg.status_file) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).context(format!(
                "cannot open status file '{}'",
                cfg.status_file.display()
            ))
        }
    };

    let mut out = String::with_capacity(content.len());
    for block in parser::split_blocks(&content) {
        let keep = parser::parse_paragraphs(block)
            .first()
            .and_then(|p| p.get_first_line("Package"))
            .map_or(true, |pkg| pkg != name);
        if keep {
            out.push_str(block);
            out.push_str("\n\n");
        }
    }

    fsutil::write_atomic(&cfg.status_file, out.as_bytes())
}

/* ── auto-installed set ──────────────────────────────────────────── */

fn read_names(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}

pub fn is_auto(cfg: &Config, name: &str) -> bool {
    read_names(&cfg.auto_file).iter().any(|n| n == name)
}

pub fn mark_auto(cfg: &Config, name: &str) -> Result<()> {
    let mut names = read_names(&cfg.auto_file);
    if names.iter().any(|n| n == name) {
        return Ok(());
    }
    names.push(name.to_string());
    if let Some(parent) = cfg.auto_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    fsutil::write_atomic(&cfg.auto_file, (names.join("\n") + "\n").as_bytes())
}

pub fn unmark_auto(cfg: &Config, name: &str) -> Result<()> {
    let names = read_names(&cfg.auto_file);
    let kept: Vec<&String> = names.iter().filter(|n| *n != name).collect();
    if kept.len() == names.len() {
        return Ok(());
    }
    let mut out = kept.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    fsutil::write_atomic(&cfg.auto_file, out.as_bytes())
}

pub fn clear_auto(cfg: &Config) -> Result<()> {
    if let Err(e) = std::fs::write(&cfg.auto_file, b"") {
        error!("cannot truncate '{}': {}", cfg.auto_file.display(), e);
        return Err(e.into());
    }
    Ok(())
}

pub fn load_auto_set(cfg: &Config) -> Fileset {
    read_names(&cfg.auto_file).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg(dir: &Path) -> Config {
        let mut cfg = Config::default();
        cfg.status_file = dir.join("status");
        cfg.auto_file = dir.join("auto-installed");
        cfg
    }

    fn write_control(dir: &Path, name: &str, version: &str) -> std::path::PathBuf {
        let path = dir.join(format!("{}.control", name));
        std::fs::write(
            &path,
            format!("Package: {}\nVersion: {}\nArchitecture: noarch\n", name, version),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_add_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_cfg(dir.path());

        let a = write_control(dir.path(), "aaa", "1.0");
        let b = write_control(dir.path(), "bbb", "2.0");
        add(&cfg, &a, "installed").unwrap();
        add(&cfg, &b, "installed").unwrap();

        let content = std::fs::read_to_string(&cfg.status_file).unwrap();
        assert_eq!(content.matches("Package:").count(), 2);
        assert!(content.contains("Status: install ok installed"));

        remove(&cfg, "aaa").unwrap();
        let content = std::fs::read_to_string(&cfg.status_file).unwrap();
        assert!(!content.contains("Package: aaa"));
        assert!(content.contains("Package: bbb"));

        remove(&cfg, "bbb").unwrap();
        let content = std::fs::read_to_string(&cfg.status_file).unwrap();
        assert!(!content.contains("Package:"));
    }

    #[test]
    fn test_remove_matches_any_field_order() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        std::fs::write(
            &cfg.status_file,
            "Status: install ok installed\nPackage: odd\nVersion: 1\n\n",
        )
        .unwrap();
        remove(&cfg, "odd").unwrap();
        assert_eq!(std::fs::read_to_string(&cfg.status_file).unwrap(), "");
    }

    #[test]
    fn test_load_normalizes_unpacked() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        std::fs::write(
            &cfg.status_file,
            "Package: a\nVersion: 1\nStatus: install ok unpacked\n\n",
        )
        .unwrap();

        let loaded = load(&cfg).unwrap();
        assert!(loaded.contains("Status: install ok installed"));
        // on-disk stays unpacked
        assert!(std::fs::read_to_string(&cfg.status_file)
            .unwrap()
            .contains("unpacked"));
    }

    #[test]
    fn test_load_round_trip_stable() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        let a = write_control(dir.path(), "aaa", "1.0");
        add(&cfg, &a, "installed").unwrap();

        let first = load(&cfg).unwrap();
        let paras = crate::parser::parse_paragraphs(&first);
        assert_eq!(paras.len(), 1);
        assert_eq!(paras[0].get("Package"), Some("aaa"));
    }

    #[test]
    fn test_auto_set() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_cfg(dir.path());

        assert!(!is_auto(&cfg, "dep"));
        mark_auto(&cfg, "dep").unwrap();
        mark_auto(&cfg, "dep").unwrap();
        mark_auto(&cfg, "other").unwrap();
        assert!(is_auto(&cfg, "dep"));

        let set = load_auto_set(&cfg);
        assert_eq!(set.len(), 2);

        unmark_auto(&cfg, "dep").unwrap();
        assert!(!is_auto(&cfg, "dep"));
        assert!(is_auto(&cfg, "other"));

        clear_auto(&cfg).unwrap();
        assert!(!is_auto(&cfg, "other"));
    }
}
