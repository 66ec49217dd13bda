// src/version/mod.rs

//! Version and name normalization
//!
//! Two version vocabularies meet in this crate:
//! - [`DistVersion`]: PEP 440 versions of upstream distributions
//! - [`NativeVersion`]: pacman-style `[epoch:]pkgver[-pkgrel]` versions of
//!   native packages, used for catalog answers and conflict constraints
//!
//! Distribution names are compared in PEP 503 normalized form everywhere.

mod pep440;

pub use pep440::{DistVersion, PreRelease};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing versions and constraints
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version '{0}'")]
    Invalid(String),

    #[error("invalid epoch in version '{0}'")]
    InvalidEpoch(String),

    #[error("empty version component in '{0}'")]
    Empty(String),
}

/// Normalize a distribution name (PEP 503)
///
/// Runs of `-`, `_` and `.` collapse into a single `-` and the result is
/// lowercased, so `Foo.Bar__baz` and `foo-bar-baz` name the same thing.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = true;
            continue;
        }
        if pending_sep && !normalized.is_empty() {
            normalized.push('-');
        }
        pending_sep = false;
        normalized.push(c.to_ascii_lowercase());
    }
    normalized
}

/// Name as it appears in wheel files and `*.dist-info` directories
pub fn to_wheel_name(normalized: &str) -> String {
    normalized.replace('-', "_")
}

/// A parsed native package version with epoch, pkgver and pkgrel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeVersion {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl NativeVersion {
    /// Parse a native version string
    ///
    /// Format: [epoch:]pkgver[-pkgrel]
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, version="1.2.3", release=None
    /// - "1.26.4-1" → epoch=0, version="1.26.4", release=Some("1")
    /// - "1:2.3.4-5" → epoch=1, version="2.3.4", release=Some("5")
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let (epoch_str, rest) = match s.split_once(':') {
            Some((e, r)) => (e, r),
            None => ("0", s),
        };

        let epoch = if epoch_str.is_empty() {
            0
        } else {
            epoch_str
                .parse::<u64>()
                .map_err(|_| VersionError::InvalidEpoch(s.to_string()))?
        };

        // pkgver never contains '-', so the last dash separates pkgrel
        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v.to_string(), Some(r.to_string())),
            None => (rest.to_string(), None),
        };

        if version.is_empty() {
            return Err(VersionError::Empty(s.to_string()));
        }

        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// Build a native version from a distribution version and a release number
    pub fn from_dist(version: &DistVersion, release: u32) -> Self {
        Self {
            epoch: 0,
            version: version.to_string().replace('-', "_"),
            release: Some(release.to_string()),
        }
    }

    /// Compare two native versions
    pub fn compare(&self, other: &NativeVersion) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match vercmp(&self.version, &other.version) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // A missing pkgrel matches any pkgrel, the way pacman treats `foo=1.0`
        match (&self.release, &other.release) {
            (Some(a), Some(b)) => vercmp(a, b),
            _ => Ordering::Equal,
        }
    }
}

/// Segment-wise version comparison in the spirit of `vercmp`
///
/// Versions are split into alternating numeric and alphabetic runs;
/// numeric runs compare numerically, a numeric run is newer than an
/// alphabetic one, and a trailing alphabetic run marks a pre-release
/// (`1.0a < 1.0`).
fn vercmp(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);

    for (x, y) in left.iter().zip(right.iter()) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    match left.len().cmp(&right.len()) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Greater => {
            if left[right.len()].parse::<u64>().is_ok() {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        Ordering::Less => {
            if right[left.len()].parse::<u64>().is_ok() {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
    }
}

fn segments(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = None;
    let mut numeric = false;

    for (i, c) in s.char_indices() {
        if !c.is_ascii_alphanumeric() {
            if let Some(st) = start.take() {
                out.push(&s[st..i]);
            }
            continue;
        }
        match start {
            Some(st) if c.is_ascii_digit() != numeric => {
                out.push(&s[st..i]);
                start = Some(i);
                numeric = c.is_ascii_digit();
            }
            Some(_) => {}
            None => {
                start = Some(i);
                numeric = c.is_ascii_digit();
            }
        }
    }
    if let Some(st) = start {
        out.push(&s[st..]);
    }
    out
}

impl fmt::Display for NativeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for NativeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for NativeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for NativeVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NativeVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Version constraint operators on native versions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionConstraint {
    /// Any version is acceptable
    Any,
    /// Exact version match
    Exact(NativeVersion),
    /// Greater than
    GreaterThan(NativeVersion),
    /// Greater than or equal
    GreaterOrEqual(NativeVersion),
    /// Less than
    LessThan(NativeVersion),
    /// Less than or equal
    LessOrEqual(NativeVersion),
}

impl VersionConstraint {
    /// Parse a pacman-style constraint suffix
    ///
    /// Examples:
    /// - ">=1.2.3" → GreaterOrEqual(1.2.3)
    /// - "<2.0-1" → LessThan(2.0-1)
    /// - "=1.5.0" → Exact(1.5.0)
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionConstraint::Any);
        }

        if let Some(rest) = s.strip_prefix(">=") {
            Ok(VersionConstraint::GreaterOrEqual(NativeVersion::parse(rest.trim())?))
        } else if let Some(rest) = s.strip_prefix("<=") {
            Ok(VersionConstraint::LessOrEqual(NativeVersion::parse(rest.trim())?))
        } else if let Some(rest) = s.strip_prefix('>') {
            Ok(VersionConstraint::GreaterThan(NativeVersion::parse(rest.trim())?))
        } else if let Some(rest) = s.strip_prefix('<') {
            Ok(VersionConstraint::LessThan(NativeVersion::parse(rest.trim())?))
        } else if let Some(rest) = s.strip_prefix('=') {
            Ok(VersionConstraint::Exact(NativeVersion::parse(rest.trim())?))
        } else {
            Ok(VersionConstraint::Exact(NativeVersion::parse(s)?))
        }
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &NativeVersion) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(v) => version.compare(v) == Ordering::Equal,
            VersionConstraint::GreaterThan(v) => version > v,
            VersionConstraint::GreaterOrEqual(v) => version >= v,
            VersionConstraint::LessThan(v) => version < v,
            VersionConstraint::LessOrEqual(v) => version <= v,
        }
    }

    /// Constraints matching every version except `version`
    pub fn all_except(version: &NativeVersion) -> [VersionConstraint; 2] {
        [
            VersionConstraint::LessThan(version.clone()),
            VersionConstraint::GreaterThan(version.clone()),
        ]
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => Ok(()),
            VersionConstraint::Exact(v) => write!(f, "={}", v),
            VersionConstraint::GreaterThan(v) => write!(f, ">{}", v),
            VersionConstraint::GreaterOrEqual(v) => write!(f, ">={}", v),
            VersionConstraint::LessThan(v) => write!(f, "<{}", v),
            VersionConstraint::LessOrEqual(v) => write!(f, "<={}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Foo.Bar__baz"), "foo-bar-baz");
        assert_eq!(normalize_name("  PyYAML "), "pyyaml");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("a-_-b"), "a-b");
    }

    #[test]
    fn test_to_wheel_name() {
        assert_eq!(to_wheel_name("zope-interface"), "zope_interface");
    }

    #[test]
    fn test_native_version_parse_simple() {
        let v = NativeVersion::parse("1.2.3").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.version, "1.2.3");
        assert_eq!(v.release, None);
    }

    #[test]
    fn test_native_version_parse_full() {
        let v = NativeVersion::parse("1:2.3.4-5").unwrap();
        assert_eq!(v.epoch, 1);
        assert_eq!(v.version, "2.3.4");
        assert_eq!(v.release, Some("5".to_string()));
    }

    #[test]
    fn test_native_version_parse_empty_epoch() {
        let v = NativeVersion::parse(":1.02.208-2").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.version, "1.02.208");
    }

    #[test]
    fn test_native_version_parse_errors() {
        assert!(NativeVersion::parse("x:1.0").is_err());
        assert!(NativeVersion::parse("-1").is_err());
    }

    #[test]
    fn test_native_version_compare_epochs() {
        let v1 = NativeVersion::parse("1:1.0.0").unwrap();
        let v2 = NativeVersion::parse("0:2.0.0").unwrap();
        assert!(v1 > v2);
    }

    #[test]
    fn test_native_version_compare_segments() {
        let older = NativeVersion::parse("1.9.1-1").unwrap();
        let newer = NativeVersion::parse("1.10.0-1").unwrap();
        assert!(older < newer);

        let pre = NativeVersion::parse("1.0a-1").unwrap();
        let fin = NativeVersion::parse("1.0-1").unwrap();
        assert!(pre < fin);
    }

    #[test]
    fn test_native_version_compare_releases() {
        let v1 = NativeVersion::parse("1.2.3-1").unwrap();
        let v2 = NativeVersion::parse("1.2.3-2").unwrap();
        assert!(v1 < v2);

        let no_rel = NativeVersion::parse("1.2.3").unwrap();
        assert_eq!(no_rel.compare(&v2), Ordering::Equal);
    }

    #[test]
    fn test_from_dist() {
        let dist = DistVersion::parse("2.0rc1").unwrap();
        let native = NativeVersion::from_dist(&dist, 3);
        assert_eq!(native.to_string(), "2.0rc1-3");
    }

    #[test]
    fn test_constraint_parse_and_satisfy() {
        let c = VersionConstraint::parse(">=1.2.0").unwrap();
        assert!(c.satisfies(&NativeVersion::parse("1.2.0-1").unwrap()));
        assert!(c.satisfies(&NativeVersion::parse("1.3").unwrap()));
        assert!(!c.satisfies(&NativeVersion::parse("1.1.9").unwrap()));

        let any = VersionConstraint::parse("*").unwrap();
        assert!(any.satisfies(&NativeVersion::parse("99").unwrap()));
    }

    #[test]
    fn test_all_except() {
        let own = NativeVersion::parse("1.0-2").unwrap();
        let constraints = VersionConstraint::all_except(&own);

        assert!(!constraints.iter().any(|c| c.satisfies(&own)));
        let older = NativeVersion::parse("1.0-1").unwrap();
        let newer = NativeVersion::parse("2.0-1").unwrap();
        assert!(constraints.iter().any(|c| c.satisfies(&older)));
        assert!(constraints.iter().any(|c| c.satisfies(&newer)));
    }

    #[test]
    fn test_constraint_display() {
        let v = NativeVersion::parse("1.0-2").unwrap();
        assert_eq!(VersionConstraint::LessThan(v.clone()).to_string(), "<1.0-2");
        assert_eq!(VersionConstraint::GreaterThan(v).to_string(), ">1.0-2");
    }
}
