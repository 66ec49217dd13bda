// src/version/pep440.rs

//! PEP 440 versions for upstream distributions

use super::VersionError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static VERSION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?x)^
        v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?:[-_.]?(?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)[-_.]?(?P<pre_n>[0-9]+)?)?
        (?:-(?P<post_n1>[0-9]+)|[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?)?
        (?P<dev>[-_.]?dev[-_.]?(?P<dev_n>[0-9]+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        $",
    )
    .unwrap()
});

/// Pre-release phase, ordered alpha < beta < release candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Rc => "rc",
        }
    }
}

/// A distribution version in PEP 440 normal form
///
/// Equality and ordering follow PEP 440: trailing zero release segments
/// are insignificant (`1.0 == 1.0.0`), dev releases sort before
/// pre-releases, post releases after the final release.
#[derive(Debug, Clone)]
pub struct DistVersion {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<(PreRelease, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Option<String>,
}

impl DistVersion {
    /// Parse a version string, accepting the usual non-normalized spellings
    /// (`1.0-rc.1`, `v2`, `1.0.post`, `1.0-1`)
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let lowered = s.trim().to_ascii_lowercase();
        let caps = VERSION_RE
            .captures(&lowered)
            .ok_or_else(|| VersionError::Invalid(s.to_string()))?;

        let number = |name: &str| -> Result<Option<u64>, VersionError> {
            caps.name(name)
                .map(|m| {
                    m.as_str()
                        .parse::<u64>()
                        .map_err(|_| VersionError::Invalid(s.to_string()))
                })
                .transpose()
        };

        let epoch = number("epoch")?.unwrap_or(0);
        let release = caps["release"]
            .split('.')
            .map(|seg| seg.parse::<u64>().map_err(|_| VersionError::Invalid(s.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match caps.name("pre_l").map(|m| m.as_str()) {
            Some("a" | "alpha") => Some((PreRelease::Alpha, number("pre_n")?.unwrap_or(0))),
            Some("b" | "beta") => Some((PreRelease::Beta, number("pre_n")?.unwrap_or(0))),
            Some(_) => Some((PreRelease::Rc, number("pre_n")?.unwrap_or(0))),
            None => None,
        };

        let post = if caps.name("post_n1").is_some() {
            number("post_n1")?
        } else if caps.name("post_l").is_some() {
            Some(number("post_n2")?.unwrap_or(0))
        } else {
            None
        };

        let dev = if caps.name("dev").is_some() {
            Some(number("dev_n")?.unwrap_or(0))
        } else {
            None
        };

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local: caps.name("local").map(|m| m.as_str().replace(['-', '_'], ".")),
        })
    }

    /// Whether this is a pre-release or a development release
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// Release segments with trailing zeros removed
    fn significant_release(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|&seg| seg != 0)
            .map_or(0, |pos| pos + 1);
        &self.release[..end]
    }

    /// Sort key for the pre-release slot.
    ///
    /// A bare dev release (`1.0.dev1`) sorts before every pre-release of the
    /// same release; a final release sorts after all of them.
    fn pre_key(&self) -> (i8, Option<(PreRelease, u64)>) {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => (-1, None),
            (None, _, _) => (1, None),
            (Some(pre), _, _) => (0, Some(pre)),
        }
    }

    fn post_key(&self) -> (i8, u64) {
        self.post.map_or((-1, 0), |n| (0, n))
    }

    fn dev_key(&self) -> (i8, u64) {
        self.dev.map_or((1, 0), |n| (0, n))
    }
}

impl Ord for DistVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.significant_release().cmp(other.significant_release()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post_key().cmp(&other.post_key()))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| compare_local(self.local.as_deref(), other.local.as_deref()))
    }
}

impl PartialOrd for DistVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DistVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DistVersion {}

impl std::hash::Hash for DistVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.significant_release().hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

/// Local version labels: absent sorts first, numeric segments beat alphanumeric ones
fn compare_local(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            let mut left = a.split('.');
            let mut right = b.split('.');
            loop {
                match (left.next(), right.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(x), Some(y)) => {
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
                }
            }
        }
    }
}

impl fmt::Display for DistVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
        write!(f, "{}", release.join("."))?;
        if let Some((phase, n)) = self.pre {
            write!(f, "{}{}", phase.as_str(), n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        if let Some(ref local) = self.local {
            write!(f, "+{}", local)?;
        }
        Ok(())
    }
}

impl FromStr for DistVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DistVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DistVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> DistVersion {
        DistVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_simple() {
        let version = v("1.2.3");
        assert_eq!(version.epoch, 0);
        assert_eq!(version.release, vec![1, 2, 3]);
        assert!(!version.is_prerelease());
    }

    #[test]
    fn test_parse_non_normalized_spellings() {
        assert_eq!(v("1.0-RC.1").to_string(), "1.0rc1");
        assert_eq!(v("v2.0").to_string(), "2.0");
        assert_eq!(v("1.0.post").to_string(), "1.0.post0");
        assert_eq!(v("1.0-1").to_string(), "1.0.post1");
        assert_eq!(v("1.0alpha2").to_string(), "1.0a2");
        assert_eq!(v("2!1.0.dev3").to_string(), "2!1.0.dev3");
    }

    #[test]
    fn test_trailing_zeros_are_insignificant() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert!(v("1.0.1") > v("1.0"));
    }

    #[test]
    fn test_pre_post_dev_ordering() {
        let ordered = [
            "1.0.dev0", "1.0a1", "1.0b2", "1.0rc1", "1.0", "1.0.post1", "1.1.dev1", "1.1",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_epoch_wins() {
        assert!(v("1!0.1") > v("99.0"));
    }

    #[test]
    fn test_local_versions() {
        assert!(v("1.0+local") > v("1.0"));
        assert!(v("1.0+2") > v("1.0+abc"));
    }

    #[test]
    fn test_prerelease_detection() {
        assert!(v("2.0b1").is_prerelease());
        assert!(v("2.0.dev1").is_prerelease());
        assert!(!v("2.0.post1").is_prerelease());
    }

    #[test]
    fn test_invalid() {
        assert!(DistVersion::parse("not-a-version").is_err());
        assert!(DistVersion::parse("").is_err());
    }
}
