//! Per-package files under `info_dir`: the `.list` file listing, the
//! adopted control file and maintainer scripts.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::archive::FileEntry;
use crate::config::Config;
use crate::fsutil;
use crate::pathsafe;

pub const SCRIPTS: [&str; 4] = ["preinst", "postinst", "prerm", "postrm"];
const ALL_EXTS: [&str; 7] =
    ["list", "control", "conffiles", "preinst", "postinst", "prerm", "postrm"];

pub fn info_path(cfg: &Config, name: &str, ext: &str) -> PathBuf {
    cfg.info_dir.join(format!("{}.{}", name, ext))
}

pub fn has_list(cfg: &Config, name: &str) -> bool {
    pathsafe::pkg_name_is_safe(name) && info_path(cfg, name, "list").exists()
}

/// Write `<name>.list`: `<archive-path>\t<octal-mode>[\t<symlink-target>]`
/// per entry, atomically.
pub fn write_list(cfg: &Config, name: &str, entries: &[FileEntry]) -> Result<()> {
    std::fs::create_dir_all(&cfg.info_dir)
        .with_context(|| format!("cannot create '{}'", cfg.info_dir.display()))?;

    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.path);
        out.push('\t');
        out.push_str(&format!("{:04o}", entry.mode));
        if let Some(target) = &entry.link_target {
            out.push('\t');
            if pathsafe::symlink_target_is_safe(target) {
                out.push_str(target);
            } else {
                out.push_str("<redacted>");
            }
        }
        out.push('\n');
    }

    fsutil::write_atomic(&info_path(cfg, name, "list"), out.as_bytes())
}

/// Archive paths recorded in `<name>.list`; empty when the file is absent.
pub fn read_list_paths(cfg: &Config, name: &str) -> Result<Vec<String>> {
    let path = info_path(cfg, name, "list");
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).context(format!("cannot read '{}'", path.display())),
    };

    Ok(content
        .lines()
        .filter_map(|line| {
            let path = line.split('\t').next().unwrap_or("");
            if path.is_empty() {
                None
            } else {
                Some(path.to_string())
            }
        })
        .collect())
}

/// Move the control file and any maintainer scripts from a freshly
/// extracted control dir into `info_dir` as `<name>.<ext>`, modes
/// preserved.
pub fn adopt_control_dir(cfg: &Config, control_dir: &Path, name: &str) -> Result<()> {
    std::fs::create_dir_all(&cfg.info_dir)
        .with_context(|| format!("cannot create '{}'", cfg.info_dir.display()))?;

    let control = control_dir.join("control");
    if control.exists() {
        fsutil::move_file(&control, &info_path(cfg, name, "control"))?;
    }

    for script in SCRIPTS {
        let src = control_dir.join(script);
        if src.exists() {
            fsutil::move_file(&src, &info_path(cfg, name, script))?;
        }
    }

    Ok(())
}

/// Delete every `info_dir` entry of the package.
pub fn remove_info(cfg: &Config, name: &str) {
    for ext in ALL_EXTS {
        std::fs::remove_file(info_path(cfg, name, ext)).ok();
    }
}

/// Delete only the control file and maintainer scripts, leaving the
/// freshly rewritten `.list` and `.conffiles` alone. Used when an upgrade
/// swaps in the new version's metadata.
pub fn remove_control_and_scripts(cfg: &Config, name: &str) {
    std::fs::remove_file(info_path(cfg, name, "control")).ok();
    for script in SCRIPTS {
        std::fs::remove_file(info_path(cfg, name, script)).ok();
    }
}
