//! Child process execution.
//!
//! Two entry points: `system` runs a command in the current root and
//! `system_offline_root` runs it inside the configured offline root. When
//! the caller is not root, entering the offline root goes through an
//! unprivileged user namespace that maps the real uid/gid to 0 before the
//! `chroot`, so maintainer scripts observe the filesystem they were
//! installed against.

use anyhow::{anyhow, bail, Context, Result};
use nix::sched::{unshare, CloneFlags};
use nix::unistd::{chdir, chroot, getegid, geteuid};
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Command, ExitStatus};

use crate::config::Config;

/// Child could not exec the requested binary.
pub const EXIT_EXEC_FAILED: i32 = 255;
/// Child failed user-namespace or chroot setup.
pub const EXIT_SETUP_FAILED: i32 = 254;

fn exit_code(name: &str, status: ExitStatus) -> Result<i32> {
    if let Some(sig) = status.signal() {
        bail!("'{}' killed by signal {}", name, sig);
    }
    status
        .code()
        .ok_or_else(|| anyhow!("'{}' returned no exit status", name))
}

/// Fork and exec, returning the child's exit code.
pub fn system(argv: &[&str]) -> Result<i32> {
    let status = Command::new(argv[0])
        .args(&argv[1..])
        .status()
        .with_context(|| format!("failed to execute '{}'", argv[0]))?;

    exit_code(argv[0], status)
}

fn map_err_io(e: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

/// Unshare a user namespace and map the real uid/gid to 0, the standard
/// unprivileged-chroot sequence: uid_map, then setgroups=deny, then gid_map.
fn unshare_and_map_user() -> io::Result<()> {
    let uid = geteuid();
    let gid = getegid();

    unshare(CloneFlags::CLONE_NEWUSER).map_err(map_err_io)?;

    std::fs::write("/proc/self/uid_map", format!("0 {} 1", uid))?;
    std::fs::write("/proc/self/setgroups", "deny")?;
    std::fs::write("/proc/self/gid_map", format!("0 {} 1\n", gid))?;

    Ok(())
}

fn enter_root(root: &Path) -> io::Result<()> {
    if !geteuid().is_root() {
        unshare_and_map_user()?;
    }
    chroot(root).map_err(map_err_io)?;
    chdir("/").map_err(map_err_io)?;
    Ok(())
}

/// As `system`, but the child enters the offline root first (when one is
/// configured).
pub fn system_offline_root(cfg: &Config, argv: &[&str]) -> Result<i32> {
    let mut cmd = Command::new(argv[0]);
    cmd.args(&argv[1..]);

    if let Some(root) = cfg.offline_root.clone() {
        unsafe {
            cmd.pre_exec(move || enter_root(&root));
        }
    }

    let status = cmd
        .status()
        .with_context(|| format!("failed to execute '{}' in package root", argv[0]))?;

    exit_code(argv[0], status)
}
