//! Name and path validation for everything that touches the filesystem.
//!
//! All predicates refuse by default: a name or path that does not match the
//! expected shape is rejected before any filesystem operation happens.

use std::path::{Path, PathBuf};

/// A package name may only be used as a filename component under `info_dir`
/// if it matches `[a-z0-9][a-z0-9.+-]*`.
pub fn pkg_name_is_safe(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '+' | '-'))
}

/// Archive member paths must not smuggle control characters into the
/// `.list` format (tab-separated, newline-terminated) and must not contain
/// two consecutive dots anywhere, which blocks `..` traversal without
/// parsing components.
pub fn archive_path_is_safe(path: &str) -> bool {
    !path.is_empty() && !path.contains(['\n', '\t']) && !path.contains("..")
}

/// Symlink targets are recorded verbatim in `.list`; only the record format
/// itself needs protecting.
pub fn symlink_target_is_safe(target: &str) -> bool {
    !target.is_empty() && !target.contains(['\n', '\t'])
}

/// Lexically resolve `.` and `..` components without touching the
/// filesystem. Absoluteness is preserved.
pub fn normalize(raw: &str) -> String {
    let absolute = raw.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for tok in raw.split('/') {
        match tok {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(tok),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Strip the leading `./` and `/` runs an archive entry typically carries.
pub fn strip_leading(mut entry: &str) -> &str {
    loop {
        if let Some(rest) = entry.strip_prefix("./") {
            entry = rest;
        } else if let Some(rest) = entry.strip_prefix('/') {
            entry = rest;
        } else {
            return entry;
        }
    }
}

/// Join an archive-relative entry onto an extraction prefix, refusing any
/// result that escapes the prefix. Returns `None` for entries that must be
/// skipped (the bare `.` root entry) or refused (escapes).
pub fn safe_join(prefix: &Path, entry: &str) -> Option<PathBuf> {
    let entry = strip_leading(entry);
    if entry.is_empty() || entry == "." {
        return None;
    }

    let prefix_str = prefix.to_string_lossy();
    let prefix_str = prefix_str.trim_end_matches('/');
    let prefix_str = if prefix_str.is_empty() { "/" } else { prefix_str };

    let resolved = normalize(&format!("{}/{}", prefix_str, entry));
    let norm_prefix = normalize(prefix_str);

    let contained = match resolved.strip_prefix(&norm_prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/') || norm_prefix.ends_with('/'),
        None => false,
    };
    if !contained {
        log::error!("path '{}' escapes extraction directory", entry);
        return None;
    }

    Some(PathBuf::from(resolved))
}
