//! Public operation entry points.
//!
//! Every mutating operation runs on an explicit [`Ctx`] and follows the
//! same shape: validate the configuration, take the exclusive state lock,
//! run, release on drop. Because nothing is process-global, a single
//! program can drive several independent contexts in sequence.

use anyhow::{Context as _, Result};
use log::{info, warn};
use std::path::PathBuf;

use crate::autoremove;
use crate::config::Config;
use crate::info;
use crate::pathsafe;
use crate::pin;
use crate::solver::Pool;
use crate::status;
use crate::transaction::{self, TxnSummary};
use crate::update;

pub type ConfirmFn = Box<dyn Fn(&TxnSummary) -> bool>;

pub struct Ctx {
    pub config: Config,
    /// Optional transaction confirmation hook; the default prompts on a
    /// TTY and proceeds otherwise.
    pub confirm: Option<ConfirmFn>,
}

impl Ctx {
    pub fn new(config: Config) -> Ctx {
        Ctx { config, confirm: None }
    }

    fn locked<T>(&self, op: impl FnOnce(&Ctx) -> Result<T>) -> Result<T> {
        self.config.validate()?;
        let _lock = self.config.lock()?;
        op(self)
    }

    pub fn update(&self) -> Result<()> {
        self.locked(|ctx| update::update(&ctx.config))
    }

    pub fn install(&self, names: &[String], local_paths: &[PathBuf]) -> Result<()> {
        self.locked(|ctx| transaction::run_install(ctx, names, local_paths))
    }

    pub fn upgrade(&self) -> Result<()> {
        self.locked(|ctx| transaction::run_install(ctx, &[], &[]))
    }

    pub fn remove(&self, names: &[String]) -> Result<()> {
        self.locked(|ctx| transaction::run_remove(ctx, names))
    }

    pub fn autoremove(&self) -> Result<()> {
        self.locked(autoremove::autoremove)
    }

    /// Delete every cached package archive.
    pub fn clean(&self) -> Result<()> {
        self.locked(|ctx| {
            let cfg = &ctx.config;
            let dir = match std::fs::read_dir(&cfg.cache_dir) {
                Ok(d) => d,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    return Err(e).context(format!(
                        "cannot open cache directory '{}'",
                        cfg.cache_dir.display()
                    ))
                }
            };

            let mut errors = 0;
            for entry in dir {
                let entry = entry?;
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    warn!("cannot remove '{}': {}", entry.path().display(), e);
                    errors += 1;
                }
            }
            if errors > 0 {
                anyhow::bail!("failed to remove {} cached file(s)", errors);
            }
            Ok(())
        })
    }

    /// Pin packages: `name=version` pins that version, a bare name pins
    /// whatever is currently installed (skipped when not installed).
    pub fn pin(&self, specs: &[String]) -> Result<()> {
        let cfg = &self.config;
        let mut pool: Option<Pool> = None;

        for spec in specs {
            let (name, version) = match spec.split_once('=') {
                Some((name, version)) => (name, Some(version.to_string())),
                None => (spec.as_str(), None),
            };

            if !pathsafe::pkg_name_is_safe(name) {
                warn!("ignoring unsafe package name '{}'", name);
                continue;
            }

            let version = match version {
                Some(v) => v,
                None => {
                    if pool.is_none() {
                        let mut p = Pool::new(&cfg.archs);
                        p.load_installed(&status::load(cfg)?)?;
                        p.rebuild_index();
                        pool = Some(p);
                    }
                    match pool.as_ref().unwrap().installed_version(name) {
                        Some(v) => v.to_string(),
                        None => {
                            info!("{} is not installed, not pinning", name);
                            continue;
                        }
                    }
                }
            };

            pin::add(cfg, name, &version)?;
        }

        Ok(())
    }

    pub fn unpin(&self, names: &[String]) -> Result<()> {
        for name in names {
            pin::remove(&self.config, name)?;
        }
        Ok(())
    }

    /// Mark installed packages auto-installed. Only packages with a
    /// `.list` file are markable.
    pub fn mark_auto(&self, names: &[String]) -> Result<()> {
        for name in names {
            if info::has_list(&self.config, name) {
                status::mark_auto(&self.config, name)?;
            } else {
                info!("{} is not installed, skipping", name);
            }
        }
        Ok(())
    }

    pub fn mark_manual(&self, names: &[String]) -> Result<()> {
        for name in names {
            if info::has_list(&self.config, name) {
                status::unmark_auto(&self.config, name)?;
            } else {
                info!("{} is not installed, skipping", name);
            }
        }
        Ok(())
    }

    pub fn mark_manual_all(&self) -> Result<()> {
        status::clear_auto(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ctx(dir: &std::path::Path) -> Ctx {
        let mut cfg = Config::default();
        cfg.status_file = dir.join("status");
        cfg.auto_file = dir.join("auto-installed");
        cfg.pin_file = dir.join("pinned-packages");
        cfg.info_dir = dir.join("info");
        cfg.cache_dir = dir.join("cache");
        cfg.lock_file = dir.join("lock");
        Ctx::new(cfg)
    }

    #[test]
    fn test_pin_with_explicit_version() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        ctx.pin(&["hello=1.0".to_string()]).unwrap();
        assert_eq!(pin::lookup(&ctx.config, "hello").as_deref(), Some("1.0"));

        ctx.unpin(&["hello".to_string()]).unwrap();
        assert_eq!(pin::lookup(&ctx.config, "hello"), None);
    }

    #[test]
    fn test_pin_bare_name_uses_installed_version() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        std::fs::write(
            &ctx.config.status_file,
            "Package: hello\nVersion: 1.2\nArchitecture: noarch\nStatus: install ok installed\n\n",
        )
        .unwrap();

        ctx.pin(&["hello".to_string(), "ghost".to_string()]).unwrap();
        assert_eq!(pin::lookup(&ctx.config, "hello").as_deref(), Some("1.2"));
        assert_eq!(pin::lookup(&ctx.config, "ghost"), None);
    }

    #[test]
    fn test_mark_requires_installed() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());

        ctx.mark_auto(&["ghost".to_string()]).unwrap();
        assert!(!status::is_auto(&ctx.config, "ghost"));

        crate::info::write_list(&ctx.config, "hello", &[]).unwrap();
        ctx.mark_auto(&["hello".to_string()]).unwrap();
        assert!(status::is_auto(&ctx.config, "hello"));

        ctx.mark_manual(&["hello".to_string()]).unwrap();
        assert!(!status::is_auto(&ctx.config, "hello"));
    }

    #[test]
    fn test_clean_empties_cache() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        std::fs::create_dir_all(&ctx.config.cache_dir).unwrap();
        std::fs::write(ctx.config.cache_dir.join("a.ipk"), b"x").unwrap();

        ctx.clean().unwrap();
        assert_eq!(
            std::fs::read_dir(&ctx.config.cache_dir).unwrap().count(),
            0
        );
    }
}
