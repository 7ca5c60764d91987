//! Maintainer script execution.
//!
//! Scripts run through `/bin/sh -c` inside the offline root (when set), so
//! the path handed to the shell must be the in-root path with the offline
//! root prefix stripped. A script that does not exist is a success.

use anyhow::{bail, Result};
use log::info;
use std::path::Path;

use crate::config::Config;
use crate::runner;

fn strip_offline_root<'a>(cfg: &Config, path: &'a str) -> &'a str {
    match &cfg.offline_root {
        Some(root) => path.strip_prefix(&*root.to_string_lossy()).unwrap_or(path),
        None => path,
    }
}

/// Run `<script_dir>/<name>.<script>` (or `<script_dir>/<script>` for a
/// freshly extracted control dir) with the given action arguments.
pub fn run_script(
    cfg: &Config,
    script_dir: &Path,
    pkg_name: Option<&str>,
    script: &str,
    args: &[&str],
) -> Result<()> {
    let path = match pkg_name {
        Some(name) => script_dir.join(format!("{}.{}", name, script)),
        None => script_dir.join(script),
    };

    if !path.exists() {
        return Ok(());
    }

    info!("running {} {}", script, args.join(" "));

    let path_str = path.to_string_lossy();
    let run_path = strip_offline_root(cfg, &path_str);

    let mut cmd = run_path.to_string();
    for arg in args {
        cmd.push(' ');
        cmd.push_str(arg);
    }

    let r = runner::system_offline_root(cfg, &["/bin/sh", "-c", &cmd])?;
    if r != 0 {
        bail!("{} script failed with exit code {}", script, r);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_missing_script_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        run_script(&cfg, dir.path(), Some("hello"), "preinst", &["install"]).unwrap();
    }

    #[test]
    fn test_script_runs_with_args() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("hello.postinst");
        let marker = dir.path().join("marker");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$1\" > {}\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cfg = Config::default();
        run_script(&cfg, dir.path(), Some("hello"), "postinst", &["configure"]).unwrap();
        assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "configure");
    }

    #[test]
    fn test_failing_script_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("hello.prerm");
        std::fs::write(&script, "#!/bin/sh\nexit 7\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cfg = Config::default();
        let err = run_script(&cfg, dir.path(), Some("hello"), "prerm", &["remove"]);
        assert!(err.unwrap_err().to_string().contains("exit code 7"));
    }
}
