//! Debian EVR version ordering (`deb-version(5)`): `[epoch:]upstream[-revision]`,
//! compared by alternating non-digit and digit runs with `~` sorting before
//! everything including the empty string.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    upstream: String,
    revision: String,
    raw: String,
}

impl Version {
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Version {
    type Err = std::convert::Infallible;

    /// Every string parses: a malformed epoch is folded into the upstream
    /// part, matching dpkg's lenient comparisons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.to_string();

        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) if !e.is_empty() && e.bytes().all(|b| b.is_ascii_digit()) => {
                (e.parse().unwrap_or(0), rest)
            }
            _ => (0, s),
        };

        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((u, r)) => (u.to_string(), r.to_string()),
            None => (rest.to_string(), String::new()),
        };

        Ok(Version { epoch, upstream, revision, raw })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// dpkg's character weight: `~` before end-of-string, letters before
/// punctuation, digits handled separately.
fn weight(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

fn is_digit(c: Option<u8>) -> bool {
    matches!(c, Some(c) if c.is_ascii_digit())
}

fn verrevcmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);
    let at = |s: &[u8], k: usize| s.get(k).copied();

    while i < a.len() || j < b.len() {
        // Non-digit run.
        while (at(a, i).is_some() && !is_digit(at(a, i)))
            || (at(b, j).is_some() && !is_digit(at(b, j)))
        {
            let wa = weight(at(a, i).filter(|c| !c.is_ascii_digit()));
            let wb = weight(at(b, j).filter(|c| !c.is_ascii_digit()));
            if wa != wb {
                return wa.cmp(&wb);
            }
            if i < a.len() {
                i += 1;
            }
            if j < b.len() {
                j += 1;
            }
        }

        // Digit run: skip leading zeros, then the longer run wins, then the
        // first differing digit.
        while at(a, i) == Some(b'0') {
            i += 1;
        }
        while at(b, j) == Some(b'0') {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;
        while is_digit(at(a, i)) && is_digit(at(b, j)) {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if is_digit(at(a, i)) {
            return Ordering::Greater;
        }
        if is_digit(at(b, j)) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| verrevcmp(&self.upstream, &other.upstream))
            .then_with(|| verrevcmp(&self.revision, &other.revision))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality must agree with the EVR ordering ("1.0" and "1.0-0" are the
// same version), so it cannot be derived structurally.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_basic_ordering() {
        assert!(v("1.0") == v("1.0"));
        assert!(v("1.0") < v("1.2"));
        assert!(v("1.10") > v("1.9"));
        assert!(v("1.0-1") < v("1.0-2"));
        assert!(v("1.0") < v("1.0-1"));
    }

    #[test]
    fn test_epoch_dominates() {
        assert!(v("1:0.1") > v("2.0"));
        assert!(v("2:1.0") > v("1:9.9"));
        assert!(v("0:1.0") == v("1.0"));
    }

    #[test]
    fn test_tilde_sorts_first() {
        assert!(v("1.0~rc1") < v("1.0"));
        assert!(v("1.0~rc1") < v("1.0~rc2"));
        assert!(v("1.0~~") < v("1.0~"));
        assert!(v("1.0~beta1-1") < v("1.0-1"));
    }

    #[test]
    fn test_letters_before_punctuation() {
        assert!(v("1.0a") < v("1.0+"));
        assert!(v("1.0a") > v("1.0"));
    }

    #[test]
    fn test_leading_zeros() {
        assert!(v("1.007") == v("1.7"));
        assert!(v("1.01") < v("1.2"));
    }

    #[test]
    fn test_revision_split_on_last_dash() {
        assert!(v("1.0-2-1") > v("1.0-2-0"));
        // upstream "1.0-2" differs from "1.0"
        assert!(v("1.0-2-1") > v("1.0-3"));
    }

    #[test]
    fn test_missing_revision_equals_zero() {
        assert!(v("1.0") == v("1.0-0"));
    }
}
