//! Version pins: `<name> <version>` per line. Pinned packages are held
//! during upgrade-all and forced to the pinned version on install. Counts
//! are expected to stay small, so lookups scan linearly.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::fsutil;

fn read_pins(path: &Path) -> Vec<(String, String)> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    content
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            match (words.next(), words.next()) {
                (Some(name), Some(version)) => {
                    Some((name.to_string(), version.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

fn write_pins(cfg: &Config, pins: &[(String, String)]) -> Result<()> {
    if let Some(parent) = cfg.pin_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = String::new();
    for (name, version) in pins {
        out.push_str(name);
        out.push(' ');
        out.push_str(version);
        out.push('\n');
    }
    fsutil::write_atomic(&cfg.pin_file, out.as_bytes())
}

/// Add or replace the pin for `name`.
pub fn add(cfg: &Config, name: &str, version: &str) -> Result<()> {
    let mut pins = read_pins(&cfg.pin_file);
    match pins.iter_mut().find(|(n, _)| n == name) {
        Some((_, v)) => *v = version.to_string(),
        None => pins.push((name.to_string(), version.to_string())),
    }
    write_pins(cfg, &pins)
}

pub fn remove(cfg: &Config, name: &str) -> Result<()> {
    let pins = read_pins(&cfg.pin_file);
    let kept: Vec<(String, String)> =
        pins.iter().filter(|(n, _)| n != name).cloned().collect();
    if kept.len() == pins.len() {
        return Ok(());
    }
    write_pins(cfg, &kept)
}

pub fn lookup(cfg: &Config, name: &str) -> Option<String> {
    read_pins(&cfg.pin_file)
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v)
}

pub fn load(cfg: &Config) -> Vec<(String, String)> {
    read_pins(&cfg.pin_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg(dir: &Path) -> Config {
        let mut cfg = Config::default();
        cfg.pin_file = dir.join("pinned-packages");
        cfg
    }

    #[test]
    fn test_upsert_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_cfg(dir.path());

        add(&cfg, "hello", "1.0").unwrap();
        add(&cfg, "world", "2.0").unwrap();
        assert_eq!(lookup(&cfg, "hello").as_deref(), Some("1.0"));

        add(&cfg, "hello", "1.5").unwrap();
        assert_eq!(lookup(&cfg, "hello").as_deref(), Some("1.5"));
        assert_eq!(load(&cfg).len(), 2);

        remove(&cfg, "hello").unwrap();
        assert_eq!(lookup(&cfg, "hello"), None);
        assert_eq!(lookup(&cfg, "world").as_deref(), Some("2.0"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        assert_eq!(lookup(&cfg, "ghost"), None);
        remove(&cfg, "ghost").unwrap();
        assert!(load(&cfg).is_empty());
    }

    #[test]
    fn test_long_names_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_cfg(dir.path());
        let long = "x".repeat(300);
        add(&cfg, &long, "1.0").unwrap();
        assert_eq!(lookup(&cfg, &long).as_deref(), Some("1.0"));
    }
}
