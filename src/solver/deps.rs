//! Dependency field grammar: comma-separated clauses, `|`-separated
//! alternatives, optional version constraint in parentheses and an optional
//! architecture qualifier (ignored on binary indices).
//!
//! ```text
//! Depends: libc (>= 1.2), hello | greeting (= 2.0)
//! ```

use super::version::Version;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Earlier,   // <<
    EarlierEq, // <=
    Exact,     // =
    LaterEq,   // >=
    Later,     // >>
}

impl Relation {
    fn parse(s: &str) -> Option<Relation> {
        match s {
            "<<" | "<" => Some(Relation::Earlier),
            "<=" => Some(Relation::EarlierEq),
            "=" => Some(Relation::Exact),
            ">=" => Some(Relation::LaterEq),
            ">>" | ">" => Some(Relation::Later),
            _ => None,
        }
    }

    fn allows(self, ord: Ordering) -> bool {
        match self {
            Relation::Earlier => ord == Ordering::Less,
            Relation::EarlierEq => ord != Ordering::Greater,
            Relation::Exact => ord == Ordering::Equal,
            Relation::LaterEq => ord != Ordering::Less,
            Relation::Later => ord == Ordering::Greater,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relation::Earlier => "<<",
            Relation::EarlierEq => "<=",
            Relation::Exact => "=",
            Relation::LaterEq => ">=",
            Relation::Later => ">>",
        })
    }
}

/// One name with an optional version restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub name: String,
    pub restriction: Option<(Relation, Version)>,
}

impl Constraint {
    pub fn name_only(name: &str) -> Constraint {
        Constraint { name: name.to_string(), restriction: None }
    }

    /// Does a provider of `(name, version)` satisfy this constraint?
    /// An unversioned provide satisfies only unversioned constraints, as
    /// with Debian virtual packages.
    pub fn satisfied_by(&self, name: &str, version: Option<&Version>) -> bool {
        if self.name != name {
            return false;
        }
        match (&self.restriction, version) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some((rel, wanted)), Some(have)) => rel.allows(have.cmp(wanted)),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.restriction {
            Some((rel, v)) => write!(f, "{} ({} {})", self.name, rel, v),
            None => f.write_str(&self.name),
        }
    }
}

/// One dependency clause: a non-empty list of alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub alternatives: Vec<Constraint>,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alts: Vec<String> = self.alternatives.iter().map(|a| a.to_string()).collect();
        f.write_str(&alts.join(" | "))
    }
}

/// Parse one alternative: `name`, `name (>= 1.0)`, `name (>=1.0) [arch]`.
pub fn parse_constraint(s: &str) -> Option<Constraint> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (name, rest) = match s.find(['(', '[', ' ', '\t']) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    };
    if name.is_empty() {
        return None;
    }

    let restriction = rest.strip_prefix('(').and_then(|r| {
        let inner = r.split(')').next()?.trim();
        let rel_end = inner
            .find(|c: char| !matches!(c, '<' | '>' | '='))
            .unwrap_or(inner.len());
        let rel = Relation::parse(&inner[..rel_end])?;
        let version: Version = inner[rel_end..].trim().parse().ok()?;
        Some((rel, version))
    });

    Some(Constraint { name: name.to_string(), restriction })
}

/// Parse a full dependency field value.
pub fn parse_dep_list(s: &str) -> Vec<Dependency> {
    s.split(',')
        .filter_map(|clause| {
            let alternatives: Vec<Constraint> =
                clause.split('|').filter_map(parse_constraint).collect();
            if alternatives.is_empty() {
                None
            } else {
                Some(Dependency { alternatives })
            }
        })
        .collect()
}

/// Parse a `Provides:` field: plain names or `name (= version)`.
pub fn parse_provides(s: &str) -> Vec<Constraint> {
    s.split(',').filter_map(parse_constraint).collect()
}
