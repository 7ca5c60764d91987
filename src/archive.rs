//! IPK archive access.
//!
//! An `.ipk` is an `ar` container holding `debian-binary`, `control.tar.*`
//! and `data.tar.*`, where the tar members are compressed with any of zst,
//! gz, xz, bz2 or lz4. The outer member is located by name prefix and piped
//! straight into the matching streaming decompressor, then into a tar
//! reader: nothing is staged on disk.
//!
//! Every pathname (and hardlink target) that reaches the filesystem goes
//! through [`pathsafe::safe_join`]; entries whose destination would cross a
//! symlink below the extraction prefix are refused.

use anyhow::{anyhow, bail, Context, Result};
use ar::Archive as ArArchive;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use log::{debug, error};
use lz4_flex::frame::FrameDecoder as Lz4Decoder;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tar::{Archive as TarArchive, EntryType};
use xz2::read::XzDecoder;
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::config::Config;
use crate::fileset::Fileset;
use crate::pathsafe;

pub const CONTROL_MEMBER: &str = "control.tar";
pub const DATA_MEMBER: &str = "data.tar";

enum TarFormat {
    Plain,
    Gzip,
    Xzip,
    Zstd,
    Bzip2,
    Lz4,
}

/// Determine the compression format based on the member name suffix.
fn determine_format(name: &[u8]) -> Result<TarFormat> {
    if name.ends_with(b".tar") {
        Ok(TarFormat::Plain)
    } else if name.ends_with(b".gz") {
        Ok(TarFormat::Gzip)
    } else if name.ends_with(b".xz") {
        Ok(TarFormat::Xzip)
    } else if name.ends_with(b".zst") {
        Ok(TarFormat::Zstd)
    } else if name.ends_with(b".bz2") {
        Ok(TarFormat::Bzip2)
    } else if name.ends_with(b".lz4") {
        Ok(TarFormat::Lz4)
    } else {
        Err(anyhow!("unknown member format: {:?}", String::from_utf8_lossy(name)))
    }
}

fn decompress<'a, R: Read + 'a>(reader: R, format: TarFormat) -> Result<Box<dyn Read + 'a>> {
    Ok(match format {
        TarFormat::Plain => Box::new(reader),
        TarFormat::Gzip => Box::new(GzDecoder::new(reader)),
        TarFormat::Xzip => Box::new(XzDecoder::new(reader)),
        TarFormat::Zstd => Box::new(ZstdDecoder::new(reader)?),
        TarFormat::Bzip2 => Box::new(BzDecoder::new(reader)),
        TarFormat::Lz4 => Box::new(Lz4Decoder::new(reader)),
    })
}

/// Walk the outer AR container to the member whose name starts with
/// `member`, wire it through its decompressor and hand the resulting raw
/// tar stream to `f`.
fn with_member<T, F>(ipk: &Path, member: &str, f: F) -> Result<T>
where
    F: FnOnce(&mut dyn Read) -> Result<T>,
{
    let file =
        File::open(ipk).with_context(|| format!("cannot open '{}'", ipk.display()))?;
    let mut outer = ArArchive::new(file);

    while let Some(entry) = outer.next_entry() {
        let entry = entry.with_context(|| format!("bad ar member in '{}'", ipk.display()))?;
        let ident = entry.header().identifier().to_vec();
        // Some AR writers prepend "./" to member names.
        let name = ident.strip_prefix(b"./").unwrap_or(&ident);

        if name.starts_with(member.as_bytes()) {
            let format = determine_format(name)?;
            let mut reader = decompress(entry, format)?;
            return f(&mut *reader);
        }
    }

    bail!("no {} member in '{}'", member, ipk.display());
}

#[derive(Clone, Copy)]
pub struct ExtractOpts {
    preserve_owner: bool,
    preserve_mtime: bool,
    unlink: bool,
    overwrite: bool,
}

/// Flags for control archive extraction into a private tmpdir.
fn control_opts() -> ExtractOpts {
    ExtractOpts {
        preserve_owner: false,
        preserve_mtime: false,
        unlink: false,
        overwrite: true,
    }
}

/// Flags for data archive extraction into the package root.
fn data_opts(cfg: &Config) -> ExtractOpts {
    ExtractOpts {
        preserve_owner: !cfg.ignore_uid,
        preserve_mtime: true,
        unlink: true,
        overwrite: false,
    }
}

/// Refuse destinations whose already-existing intermediate components are
/// symlinks; a hostile package must not route writes through a link it (or
/// an earlier package) planted.
fn crosses_symlink(prefix: &Path, dest: &Path) -> bool {
    let mut cur = dest.parent();
    while let Some(dir) = cur {
        if dir == prefix {
            break;
        }
        if let Ok(meta) = dir.symlink_metadata() {
            if meta.file_type().is_symlink() {
                return true;
            }
        }
        cur = dir.parent();
    }
    false
}

fn apply_metadata(
    dest: &Path,
    file: &File,
    mode: u32,
    uid: u64,
    gid: u64,
    mtime: u64,
    opts: ExtractOpts,
) -> Result<()> {
    file.set_permissions(std::fs::Permissions::from_mode(mode & 0o7777))?;

    if opts.preserve_mtime {
        let when = std::time::SystemTime::UNIX_EPOCH
            + std::time::Duration::from_secs(mtime);
        file.set_modified(when).ok();
    }

    if opts.preserve_owner {
        if let Err(e) = std::os::unix::fs::chown(dest, Some(uid as u32), Some(gid as u32)) {
            debug!("cannot chown '{}': {}", dest.display(), e);
        }
    }

    Ok(())
}

fn remove_existing(dest: &Path, opts: ExtractOpts) -> Result<()> {
    if dest.symlink_metadata().is_err() {
        return Ok(());
    }
    if !opts.unlink && !opts.overwrite {
        bail!("refusing to overwrite existing '{}'", dest.display());
    }
    std::fs::remove_file(dest).ok();
    Ok(())
}

fn extract_entries<R: Read>(
    tar: &mut TarArchive<R>,
    prefix: &Path,
    opts: ExtractOpts,
    conffiles: Option<&Fileset>,
    cf_suffix: Option<&str>,
    selected: Option<&Fileset>,
) -> Result<u64> {
    let mut total: u64 = 0;

    for entry in tar.entries()? {
        let mut entry = entry.context("failed to read archive entry")?;
        let raw_path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        if let Some(selected) = selected {
            if !selected.contains(&raw_path) {
                continue;
            }
        }

        let is_cf = conffiles.map_or(false, |cf| cf.contains(&raw_path));

        let Some(mut dest) = pathsafe::safe_join(prefix, &raw_path) else {
            continue;
        };
        if is_cf {
            if let Some(suffix) = cf_suffix {
                let mut s = dest.into_os_string();
                s.push(suffix);
                dest = s.into();
            }
        }

        if crosses_symlink(prefix, &dest) {
            bail!("not extracting '{}': path crosses a symlink", raw_path);
        }

        debug!("extracting '{}'", dest.display());

        let header = entry.header();
        let mode = header.mode().unwrap_or(0o644);
        let uid = header.uid().unwrap_or(0);
        let gid = header.gid().unwrap_or(0);
        let mtime = header.mtime().unwrap_or(0);
        let size = header.size().unwrap_or(0);
        let entry_type = header.entry_type();

        // The conffile writer always replaces a stale `.aept-new`.
        let entry_opts = if is_cf {
            ExtractOpts { overwrite: true, ..opts }
        } else {
            opts
        };

        match entry_type {
            EntryType::Directory => {
                let existed = dest.is_dir();
                std::fs::create_dir_all(&dest)
                    .with_context(|| format!("cannot create '{}'", dest.display()))?;
                if !existed {
                    std::fs::set_permissions(
                        &dest,
                        std::fs::Permissions::from_mode(mode & 0o7777),
                    )?;
                }
            }
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                remove_existing(&dest, entry_opts)?;
                let mut f = File::create(&dest)
                    .with_context(|| format!("cannot create '{}'", dest.display()))?;
                io::copy(&mut entry, &mut f)
                    .with_context(|| format!("cannot write '{}'", dest.display()))?;
                apply_metadata(&dest, &f, mode, uid, gid, mtime, entry_opts)?;
            }
            EntryType::Symlink => {
                let target = entry
                    .link_name_bytes()
                    .ok_or_else(|| anyhow!("symlink entry '{}' has no target", raw_path))?;
                let target = String::from_utf8_lossy(&target).into_owned();
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                remove_existing(&dest, entry_opts)?;
                // Targets are recorded verbatim; containment is enforced at
                // traversal time by the symlink-crossing check above.
                std::os::unix::fs::symlink(&target, &dest)
                    .with_context(|| format!("cannot symlink '{}'", dest.display()))?;
            }
            EntryType::Link => {
                let target = entry
                    .link_name_bytes()
                    .ok_or_else(|| anyhow!("hardlink entry '{}' has no target", raw_path))?;
                let target = String::from_utf8_lossy(&target).into_owned();
                let Some(link_src) = pathsafe::safe_join(prefix, &target) else {
                    error!("not extracting '{}': hardlink to nowhere", raw_path);
                    continue;
                };
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                remove_existing(&dest, entry_opts)?;
                std::fs::hard_link(&link_src, &dest)
                    .with_context(|| format!("cannot hardlink '{}'", dest.display()))?;
            }
            other => {
                debug!("skipping entry type {:?} for '{}'", other, raw_path);
            }
        }

        total += size;
    }

    Ok(total)
}

/// Extract the control archive into `dest` (a private tmpdir).
pub fn extract_control(ipk: &Path, dest: &Path) -> Result<()> {
    with_member(ipk, CONTROL_MEMBER, |reader| {
        let mut tar = TarArchive::new(reader);
        extract_entries(&mut tar, dest, control_opts(), None, None, None)?;
        Ok(())
    })
}

/// Extract the data archive into `prefix`, returning the extracted byte
/// sum. When `conffiles` is given, matching entries land at
/// `<dest><cf_suffix>` instead so the conffile engine can compare them
/// against the on-disk versions.
pub fn extract_data(
    cfg: &Config,
    ipk: &Path,
    prefix: &Path,
    conffiles: Option<&Fileset>,
    cf_suffix: Option<&str>,
) -> Result<u64> {
    with_member(ipk, DATA_MEMBER, |reader| {
        let mut tar = TarArchive::new(reader);
        extract_entries(&mut tar, prefix, data_opts(cfg), conffiles, cf_suffix, None)
    })
}

/// Second pass over the data archive extracting only the selected entries,
/// with overwrite allowed.
pub fn extract_data_selected(
    cfg: &Config,
    ipk: &Path,
    selected: &Fileset,
    prefix: &Path,
) -> Result<()> {
    let opts = ExtractOpts { overwrite: true, ..data_opts(cfg) };
    with_member(ipk, DATA_MEMBER, |reader| {
        let mut tar = TarArchive::new(reader);
        extract_entries(&mut tar, prefix, opts, None, None, Some(selected))?;
        Ok(())
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Archive pathname as recorded in the tar (typically with leading `./`).
    pub path: String,
    /// Permission bits.
    pub mode: u32,
    pub link_target: Option<String>,
}

/// List every non-directory entry of the data archive. Any unsafe pathname
/// fails the whole listing; a package that ships such an entry is refused.
pub fn list_data_paths(ipk: &Path) -> Result<Vec<FileEntry>> {
    with_member(ipk, DATA_MEMBER, |reader| {
        let mut tar = TarArchive::new(reader);
        let mut entries = Vec::new();

        for entry in tar.entries()? {
            let entry = entry.context("failed to read archive entry")?;
            let header = entry.header();
            if header.entry_type() == EntryType::Directory {
                continue;
            }

            let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            if !pathsafe::archive_path_is_safe(&path) {
                bail!("refusing unsafe archive path '{}'", path);
            }

            let link_target = if header.entry_type() == EntryType::Symlink {
                entry
                    .link_name_bytes()
                    .map(|t| String::from_utf8_lossy(&t).into_owned())
            } else {
                None
            };

            entries.push(FileEntry {
                path,
                mode: header.mode().unwrap_or(0o644) & 0o7777,
                link_target,
            });
        }

        Ok(entries)
    })
}

/// Read one member of the control archive (e.g. `control` or `conffiles`)
/// into a string. Returns `None` when the member is absent.
pub fn read_control_file(ipk: &Path, name: &str) -> Result<Option<String>> {
    with_member(ipk, CONTROL_MEMBER, |reader| {
        let mut tar = TarArchive::new(reader);
        for entry in tar.entries()? {
            let mut entry = entry?;
            let path = entry.path_bytes().into_owned();
            let path = String::from_utf8_lossy(&path).into_owned();
            if pathsafe::strip_leading(&path) == name {
                let mut buf = String::new();
                entry.read_to_string(&mut buf)?;
                return Ok(Some(buf));
            }
        }
        Ok(None)
    })
}

/// Decompress a downloaded `Packages.gz` to its plain-text form.
pub fn decompress_gz(gz_path: &Path, out_path: &Path) -> Result<()> {
    let f = File::open(gz_path)
        .with_context(|| format!("cannot open '{}'", gz_path.display()))?;
    let mut decoder = GzDecoder::new(f);
    let mut out = File::create(out_path)
        .with_context(|| format!("cannot create '{}'", out_path.display()))?;
    io::copy(&mut decoder, &mut out)
        .with_context(|| format!("cannot decompress '{}'", gz_path.display()))?;
    Ok(())
}
