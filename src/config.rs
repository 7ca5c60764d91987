use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::pathsafe;

pub const DEFAULT_CONF: &str = "/etc/aept/aept.conf";

const MAX_LINE: usize = 4096;

#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub url: String,
    pub gzip: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sources: Vec<Source>,
    pub archs: Vec<String>,

    pub offline_root: Option<PathBuf>,
    pub info_dir: PathBuf,
    pub lists_dir: PathBuf,
    pub status_file: PathBuf,
    pub cache_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub lock_file: PathBuf,
    pub auto_file: PathBuf,
    pub pin_file: PathBuf,
    pub usign_bin: String,
    pub usign_keydir: PathBuf,

    pub check_signature: bool,
    pub ignore_uid: bool,
    pub allow_downgrade: bool,

    pub force_depends: bool,
    pub download_only: bool,
    pub noaction: bool,
    pub reinstall: bool,
    pub no_cache: bool,
    pub force_confnew: bool,
    pub force_confold: bool,
    pub purge: bool,
    pub non_interactive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sources: Vec::new(),
            archs: Vec::new(),
            offline_root: None,
            info_dir: "/var/lib/aept/info".into(),
            lists_dir: "/var/lib/aept/lists".into(),
            status_file: "/var/lib/aept/status".into(),
            cache_dir: "/var/cache/aept".into(),
            tmp_dir: "/tmp".into(),
            lock_file: "/var/lib/aept/lock".into(),
            auto_file: "/var/lib/aept/auto-installed".into(),
            pin_file: "/var/lib/aept/pinned-packages".into(),
            usign_bin: "usign".to_string(),
            usign_keydir: "/etc/aept/usign/trustdb".into(),
            check_signature: true,
            ignore_uid: false,
            allow_downgrade: false,
            force_depends: false,
            download_only: false,
            noaction: false,
            reinstall: false,
            no_cache: false,
            force_confnew: false,
            force_confold: false,
            purge: false,
            non_interactive: false,
        }
    }
}

impl Config {
    pub fn parse_config<P: AsRef<Path>>(path: P) -> Result<Config> {
        let f = File::open(path.as_ref()).with_context(|| {
            format!("cannot open config file '{}'", path.as_ref().display())
        })?;

        let mut config = Config::default();
        for line in BufReader::new(f).lines() {
            let line = line?;
            if line.len() > MAX_LINE {
                warn!("skipping over-long config line");
                continue;
            }
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut words = line.split_whitespace();
            let directive = words.next().unwrap_or_default();
            match directive {
                "src/gz" | "src" => {
                    let (name, url) = (words.next(), words.next());
                    if let (Some(name), Some(url)) = (name, url) {
                        config.add_source(name, url, directive == "src/gz");
                    } else {
                        warn!("incomplete source line: {:?}", line);
                    }
                }
                "option" => {
                    let (key, value) = (words.next(), words.next());
                    if let (Some(key), Some(value)) = (key, value) {
                        config.set_option(key, value);
                    } else {
                        warn!("incomplete option line: {:?}", line);
                    }
                }
                "arch" => match words.next() {
                    Some(arch) => config.archs.push(arch.to_string()),
                    None => warn!("incomplete arch line: {:?}", line),
                },
                other => warn!("unknown config directive '{}'", other),
            }
        }

        Ok(config)
    }

    fn add_source(&mut self, name: &str, url: &str, gzip: bool) {
        // Source names become filenames under lists_dir.
        if !pathsafe::pkg_name_is_safe(name) {
            warn!("ignoring source with unsafe name '{}'", name);
            return;
        }
        self.sources.push(Source {
            name: name.to_string(),
            url: url.trim_end_matches('/').to_string(),
            gzip,
        });
    }

    fn set_option(&mut self, key: &str, value: &str) {
        match key {
            "offline_root" => self.offline_root = Some(value.into()),
            "info_dir" => self.info_dir = value.into(),
            "lists_dir" => self.lists_dir = value.into(),
            "status_file" => self.status_file = value.into(),
            "cache_dir" => self.cache_dir = value.into(),
            "tmp_dir" => self.tmp_dir = value.into(),
            "lock_file" => self.lock_file = value.into(),
            "auto_file" => self.auto_file = value.into(),
            "pin_file" => self.pin_file = value.into(),
            "usign_bin" => self.usign_bin = value.to_string(),
            "usign_keydir" => self.usign_keydir = value.into(),
            "check_signature" => self.check_signature = value != "0",
            "ignore_uid" => self.ignore_uid = value != "0",
            "allow_downgrade" => self.allow_downgrade = value != "0",
            other => warn!("unknown option '{}'", other),
        }
    }

    /// Rebase all state paths under the offline root. Called exactly once
    /// after config load; the `OFFLINE_ROOT` environment variable is a
    /// historical fallback for the `-o` flag.
    pub fn apply_offline_root(&mut self) {
        if self.offline_root.is_none() {
            if let Ok(root) = std::env::var("OFFLINE_ROOT") {
                if !root.is_empty() {
                    self.offline_root = Some(root.into());
                }
            }
        }

        let Some(root) = self.offline_root.clone() else {
            return;
        };

        for path in [
            &mut self.lists_dir,
            &mut self.cache_dir,
            &mut self.info_dir,
            &mut self.status_file,
            &mut self.lock_file,
            &mut self.auto_file,
            &mut self.pin_file,
        ] {
            *path = prefix_path(&root, path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(root) = &self.offline_root {
            if !root.is_dir() {
                bail!("offline root '{}' is not a directory", root.display());
            }
        }

        for dir in [
            &self.info_dir,
            &self.lists_dir,
            &self.cache_dir,
            &self.tmp_dir,
            &self.usign_keydir,
        ] {
            if dir.exists() && !dir.is_dir() {
                bail!("'{}' exists but is not a directory", dir.display());
            }
        }

        Ok(())
    }

    /// Absolute on-disk path for an absolute in-root path.
    pub fn root_path(&self, path: &str) -> PathBuf {
        match &self.offline_root {
            Some(root) => prefix_path(root, Path::new(path)),
            None => PathBuf::from(path),
        }
    }

    /// The directory all data archives extract into.
    pub fn root_dir(&self) -> PathBuf {
        self.offline_root.clone().unwrap_or_else(|| "/".into())
    }

    pub fn lock(&self) -> Result<LockGuard> {
        if let Some(parent) = self.lock_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create '{}'", parent.display()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o644)
            .open(&self.lock_file)
            .with_context(|| {
                format!("cannot open lock file '{}'", self.lock_file.display())
            })?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(LockGuard { _flock: flock }),
            Err((_, errno)) if errno == nix::errno::Errno::EWOULDBLOCK => {
                Err(anyhow!("another instance is running"))
            }
            Err((_, errno)) => Err(anyhow!(
                "cannot lock '{}': {}",
                self.lock_file.display(),
                errno
            )),
        }
    }
}

/// Exclusive advisory lock on the state directory; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    _flock: Flock<File>,
}

fn prefix_path(root: &Path, path: &Path) -> PathBuf {
    let mut out = root.as_os_str().to_owned();
    out.push(path.as_os_str());
    PathBuf::from(out)
}
