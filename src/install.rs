//! Install and upgrade steps.
//!
//! Both steps share the same skeleton: extract the control archive into a
//! scratch dir, run the pre-script gate, unpack the payload, record state,
//! run the post-script. Files already unpacked when a later part of the
//! step fails are deliberately left on disk, whatever the failure point:
//! unlinking a half-extracted payload could tear out paths another package
//! owns, and the administrator can remove or reinstall to recover.

use anyhow::{bail, Context, Result};
use log::{debug, error, info, warn};
use std::path::Path;
use tempfile::TempDir;

use crate::archive;
use crate::checksum;
use crate::conffile::{self, ConffileSet};
use crate::config::Config;
use crate::fileset::Fileset;
use crate::info;
use crate::pathsafe;
use crate::script;
use crate::status;

fn make_tmpdir(cfg: &Config) -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("aept-")
        .tempdir_in(&cfg.tmp_dir)
        .with_context(|| format!("cannot create temp directory in '{}'", cfg.tmp_dir.display()))
}

/// Run the package's postinst and commit the status record: a postinst
/// failure records `unpacked` instead of `installed` so the package is
/// flagged for reconfiguration, but the step still succeeds.
fn configure_and_commit(cfg: &Config, name: &str, old_version: Option<&str>) -> Result<()> {
    let configure_args: Vec<&str> = match old_version {
        Some(v) => vec!["configure", v],
        None => vec!["configure"],
    };

    let state = match script::run_script(cfg, &cfg.info_dir, Some(name), "postinst", &configure_args)
    {
        Ok(()) => "installed",
        Err(e) => {
            error!("postinst failed for '{}': {:#}", name, e);
            "unpacked"
        }
    };

    status::remove(cfg, name)?;
    status::add(cfg, &info::info_path(cfg, name, "control"), state)?;
    Ok(())
}

/// Fresh install: preinst, unpack, record, postinst. `old_version` is set
/// when reinstalling the same version, which only changes the script
/// arguments.
pub fn install_pkg(
    cfg: &Config,
    ipk_path: &Path,
    name: &str,
    old_version: Option<&str>,
) -> Result<()> {
    if !pathsafe::pkg_name_is_safe(name) {
        bail!("refusing to install package with unsafe name '{}'", name);
    }

    info!("installing {}", name);

    let tmpdir = make_tmpdir(cfg)?;

    archive::extract_control(ipk_path, tmpdir.path())
        .with_context(|| format!("failed to extract control archive of '{}'", name))?;

    let preinst_args: Vec<&str> = match old_version {
        Some(v) => vec!["upgrade", v],
        None => vec!["install"],
    };
    script::run_script(cfg, tmpdir.path(), None, "preinst", &preinst_args)
        .with_context(|| format!("preinst failed for '{}'", name))?;

    let root = cfg.root_dir();
    let size = archive::extract_data(cfg, ipk_path, &root, None, None)
        .with_context(|| format!("failed to extract data archive of '{}'", name))?;
    debug!("unpacked {} bytes for {}", size, name);

    let entries = archive::list_data_paths(ipk_path)?;
    info::write_list(cfg, name, &entries)?;

    let shipped_cf = conffile::parse_list(tmpdir.path())?;
    conffile::record_fresh(cfg, name, &shipped_cf)?;

    info::adopt_control_dir(cfg, tmpdir.path(), name)?;

    configure_and_commit(cfg, name, old_version)?;

    info!("installed {}", name);
    Ok(())
}

/// In-place upgrade (or downgrade, or reinstall when the versions match):
/// runs both sides' maintainer scripts, diverts conffiles through the
/// three-way resolver, and unlinks files the new version no longer ships.
/// Every file of the new version ends up in `protected` so a later remove
/// in the same transaction cannot delete it.
pub fn upgrade_pkg(
    cfg: &Config,
    ipk_path: &Path,
    name: &str,
    old_version: &str,
    new_version: &str,
    protected: &mut Fileset,
) -> Result<()> {
    if !pathsafe::pkg_name_is_safe(name) {
        bail!("refusing to upgrade package with unsafe name '{}'", name);
    }

    info!("upgrading {} ({} -> {})", name, old_version, new_version);

    let tmpdir = make_tmpdir(cfg)?;

    archive::extract_control(ipk_path, tmpdir.path())
        .with_context(|| format!("failed to extract control archive of '{}'", name))?;

    script::run_script(cfg, &cfg.info_dir, Some(name), "prerm", &["upgrade", new_version])
        .with_context(|| format!("prerm failed for '{}', aborting upgrade", name))?;

    script::run_script(cfg, tmpdir.path(), None, "preinst", &["upgrade", old_version])
        .with_context(|| format!("preinst failed for '{}', aborting upgrade", name))?;

    let old_files = info::read_list_paths(cfg, name)?;
    let new_cf = conffile::parse_list(tmpdir.path())?;
    let old_cf = conffile::load(cfg, name)?;

    let cf_paths: Fileset = new_cf.paths().collect();
    let root = cfg.root_dir();
    archive::extract_data(
        cfg,
        ipk_path,
        &root,
        if cf_paths.is_empty() { None } else { Some(&cf_paths) },
        Some(conffile::CF_SUFFIX),
    )
    .with_context(|| format!("failed to extract data archive of '{}'", name))?;

    let entries = archive::list_data_paths(ipk_path)?;
    info::write_list(cfg, name, &entries)?;
    let new_files: Fileset = entries.iter().map(|e| e.path.as_str()).collect();

    conffile::resolve_upgrade(cfg, name, &old_cf, &new_cf)?;

    remove_vanished_files(cfg, &old_files, &new_files, &old_cf, protected)?;

    for entry in &entries {
        protected.insert(&entry.path);
    }

    if let Err(e) =
        script::run_script(cfg, &cfg.info_dir, Some(name), "postrm", &["upgrade", new_version])
    {
        warn!("postrm failed for '{}', continuing: {:#}", name, e);
    }

    info::remove_control_and_scripts(cfg, name);
    info::adopt_control_dir(cfg, tmpdir.path(), name)?;

    configure_and_commit(cfg, name, Some(old_version))?;

    info!("upgraded {} to {}", name, new_version);
    Ok(())
}

/// Unlink every file the old version shipped and the new one does not,
/// preserving protected paths and user-modified conffiles.
fn remove_vanished_files(
    cfg: &Config,
    old_files: &[String],
    new_files: &Fileset,
    old_cf: &ConffileSet,
    protected: &Fileset,
) -> Result<()> {
    for path in old_files {
        if new_files.contains(path) {
            continue;
        }

        let rel = pathsafe::strip_leading(path);
        if rel.is_empty() || !pathsafe::archive_path_is_safe(rel) {
            continue;
        }
        if protected.contains(rel) {
            continue;
        }

        let abs = format!("/{}", rel);
        if let Some(saved_md5) = old_cf.lookup(&abs) {
            let disk_md5 = checksum::md5sum(&cfg.root_path(&abs))?;
            if disk_md5.as_deref() != Some(saved_md5) {
                info!("not removing modified conffile '{}'", abs);
                continue;
            }
        }

        let full = cfg.root_path(&abs);
        match std::fs::remove_file(&full) {
            Ok(()) => debug!("removed obsolete '{}'", full.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!("cannot remove '{}': {}", full.display(), e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_ipk;

    fn test_cfg(root: &Path) -> Config {
        let mut cfg = Config::default();
        cfg.offline_root = Some(root.to_path_buf());
        cfg.info_dir = root.join("var/lib/aept/info");
        cfg.status_file = root.join("var/lib/aept/status");
        cfg.tmp_dir = root.join("tmp");
        std::fs::create_dir_all(&cfg.tmp_dir).unwrap();
        cfg
    }

    #[test]
    fn test_fresh_install() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let cfg = test_cfg(&root);

        let ipk = write_ipk(
            dir.path(),
            "hello_1.0.ipk",
            &[("./control", "Package: hello\nVersion: 1.0\nArchitecture: noarch\n", 0o644)],
            &[
                ("./usr", None, 0o755),
                ("./usr/bin", None, 0o755),
                ("./usr/bin/hello", Some("#!/bin/sh\necho hi\n"), 0o755),
            ],
        );

        install_pkg(&cfg, &ipk, "hello", None).unwrap();

        assert!(root.join("usr/bin/hello").is_file());
        let list =
            std::fs::read_to_string(info::info_path(&cfg, "hello", "list")).unwrap();
        assert_eq!(list, "./usr/bin/hello\t0755\n");
        let status = std::fs::read_to_string(&cfg.status_file).unwrap();
        assert!(status.contains("Package: hello"));
        assert!(status.contains("Status: install ok installed"));
        assert!(info::info_path(&cfg, "hello", "control").exists());
    }

    #[test]
    fn test_install_refuses_unsafe_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let cfg = test_cfg(&root);
        let err = install_pkg(&cfg, Path::new("/nonexistent.ipk"), "../evil", None);
        assert!(err.is_err());
        assert!(!cfg.info_dir.exists());
    }

    #[test]
    fn test_install_records_conffile_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let cfg = test_cfg(&root);

        let ipk = write_ipk(
            dir.path(),
            "srv_1.0.ipk",
            &[
                ("./control", "Package: srv\nVersion: 1.0\nArchitecture: noarch\n", 0o644),
                ("./conffiles", "/etc/srv.conf\n", 0o644),
            ],
            &[
                ("./etc", None, 0o755),
                ("./etc/srv.conf", Some("A\n"), 0o644),
            ],
        );

        install_pkg(&cfg, &ipk, "srv", None).unwrap();

        let saved = conffile::load(&cfg, "srv").unwrap();
        let shipped_md5 = checksum::md5sum(&root.join("etc/srv.conf")).unwrap().unwrap();
        assert_eq!(saved.lookup("/etc/srv.conf"), Some(shipped_md5.as_str()));
    }

    #[test]
    fn test_failing_postinst_records_unpacked() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        // No offline root so the script runs through the host /bin/sh; the
        // package ships no payload, only state files are written.
        let mut cfg = test_cfg(&root);
        cfg.offline_root = None;

        let ipk = write_ipk(
            dir.path(),
            "bad_1.0.ipk",
            &[
                ("./control", "Package: bad\nVersion: 1.0\nArchitecture: noarch\n", 0o644),
                ("./postinst", "#!/bin/sh\nexit 1\n", 0o755),
            ],
            &[],
        );

        install_pkg(&cfg, &ipk, "bad", None).unwrap();
        let status = std::fs::read_to_string(&cfg.status_file).unwrap();
        assert!(status.contains("Status: install ok unpacked"));
    }

    #[test]
    fn test_upgrade_removes_vanished_keeps_protected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let cfg = test_cfg(&root);

        let v1 = write_ipk(
            dir.path(),
            "app_1.0.ipk",
            &[("./control", "Package: app\nVersion: 1.0\nArchitecture: noarch\n", 0o644)],
            &[
                ("./usr/share/app/old-only", Some("old\n"), 0o644),
                ("./usr/share/app/shared", Some("v1\n"), 0o644),
                ("./usr/share/app/claimed", Some("v1\n"), 0o644),
            ],
        );
        let v2 = write_ipk(
            dir.path(),
            "app_2.0.ipk",
            &[("./control", "Package: app\nVersion: 2.0\nArchitecture: noarch\n", 0o644)],
            &[("./usr/share/app/shared", Some("v2\n"), 0o644)],
        );

        install_pkg(&cfg, &v1, "app", None).unwrap();
        assert!(root.join("usr/share/app/old-only").exists());

        let mut protected = Fileset::new();
        protected.insert("usr/share/app/claimed");
        protected.sort();

        upgrade_pkg(&cfg, &v2, "app", "1.0", "2.0", &mut protected).unwrap();

        assert!(!root.join("usr/share/app/old-only").exists());
        assert!(root.join("usr/share/app/claimed").exists());
        assert_eq!(
            std::fs::read_to_string(root.join("usr/share/app/shared")).unwrap(),
            "v2\n"
        );
        // new files are now protected
        protected.sort();
        assert!(protected.contains("usr/share/app/shared"));

        let status = std::fs::read_to_string(&cfg.status_file).unwrap();
        assert!(status.contains("Version: 2.0"));
        assert_eq!(status.matches("Package: app").count(), 1);

        // the new version's list survives the metadata swap
        let list = std::fs::read_to_string(info::info_path(&cfg, "app", "list")).unwrap();
        assert_eq!(list, "./usr/share/app/shared\t0644\n");
    }

    #[test]
    fn test_upgrade_conffile_flow() {
        // Upgrade with a user-modified conffile and no tty: old file
        // stays, .aept-new left for review, new hash recorded.
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let cfg = test_cfg(&root);

        let v1 = write_ipk(
            dir.path(),
            "srv_1.0.ipk",
            &[
                ("./control", "Package: srv\nVersion: 1.0\nArchitecture: noarch\n", 0o644),
                ("./conffiles", "/etc/srv.conf\n", 0o644),
            ],
            &[("./etc/srv.conf", Some("A\n"), 0o644)],
        );
        let v2 = write_ipk(
            dir.path(),
            "srv_2.0.ipk",
            &[
                ("./control", "Package: srv\nVersion: 2.0\nArchitecture: noarch\n", 0o644),
                ("./conffiles", "/etc/srv.conf\n", 0o644),
            ],
            &[("./etc/srv.conf", Some("C\n"), 0o644)],
        );

        install_pkg(&cfg, &v1, "srv", None).unwrap();
        std::fs::write(root.join("etc/srv.conf"), "B\n").unwrap();

        let mut protected = Fileset::new();
        upgrade_pkg(&cfg, &v2, "srv", "1.0", "2.0", &mut protected).unwrap();

        assert_eq!(std::fs::read_to_string(root.join("etc/srv.conf")).unwrap(), "B\n");
        assert!(root.join("etc/srv.conf.aept-new").exists());

        let saved = conffile::load(&cfg, "srv").unwrap();
        let tmp = dir.path().join("c");
        std::fs::write(&tmp, "C\n").unwrap();
        let c_md5 = checksum::md5sum(&tmp).unwrap().unwrap();
        assert_eq!(saved.lookup("/etc/srv.conf"), Some(c_md5.as_str()));
    }
}
