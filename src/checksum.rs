//! Streaming checksums: MD5 for conffile tracking, repository-declared
//! digests (SHA-256 or MD5) for downloaded packages.

use anyhow::{anyhow, bail, Result};
use faster_hex::hex_string;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Sha256,
    Md5,
}

fn hash_file<D: Digest + io::Write>(path: &Path) -> Result<Option<String>> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(anyhow!("cannot open '{}': {}", path.display(), e)),
    };
    let mut hasher = D::new();
    io::copy(&mut f, &mut hasher)?;
    Ok(Some(hex_string(&hasher.finalize())))
}

/// MD5 of a file, `None` when the file does not exist.
pub fn md5sum(path: &Path) -> Result<Option<String>> {
    hash_file::<Md5>(path)
}

pub fn sha256sum(path: &Path) -> Result<Option<String>> {
    hash_file::<Sha256>(path)
}

fn eq_constant_time(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verify a downloaded package against the digest its index entry declared.
/// A mismatching file is deleted: the cache must never retain a package
/// that failed verification.
pub fn verify(path: &Path, expected: &str, kind: ChecksumKind) -> Result<()> {
    let actual = match kind {
        ChecksumKind::Sha256 => sha256sum(path)?,
        ChecksumKind::Md5 => md5sum(path)?,
    }
    .ok_or_else(|| anyhow!("'{}' does not exist", path.display()))?;

    if !eq_constant_time(&actual, &expected.to_ascii_lowercase()) {
        std::fs::remove_file(path).ok();
        bail!("checksum mismatch for '{}'", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_md5_known_vector() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"abc").unwrap();
        assert_eq!(
            md5sum(f.path()).unwrap().as_deref(),
            Some("900150983cd24fb0d6963f7d28e17f72")
        );
    }

    #[test]
    fn test_missing_file_is_none() {
        assert_eq!(md5sum(Path::new("/nonexistent/x")).unwrap(), None);
    }

    #[test]
    fn test_verify_mismatch_unlinks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.ipk");
        std::fs::write(&path, b"payload").unwrap();

        let r = verify(&path, &"0".repeat(64), ChecksumKind::Sha256);
        assert!(r.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_verify_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.ipk");
        std::fs::write(&path, b"abc").unwrap();
        let digest = sha256sum(&path).unwrap().unwrap();
        verify(&path, &digest, ChecksumKind::Sha256).unwrap();
        assert!(path.exists());
    }
}
