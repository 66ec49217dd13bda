// src/distribution.rs

//! Distribution references and requirement specs
//!
//! A [`DistributionRef`] identifies one concrete upstream distribution by
//! normalized name and version. Root requests coming from the command line
//! are looser ([`RootRequest`]): the version may be missing, and VCS or
//! local sources carry the location they are installed from.

use crate::error::{Error, Result};
use crate::version::{DistVersion, normalize_name};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// How a distribution is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Source distribution (needs a build)
    #[default]
    Sdist,
    /// Prebuilt wheel
    Wheel,
    /// Version control checkout (`git+...`)
    Vcs,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sdist => "sdist",
            Self::Wheel => "wheel",
            Self::Vcs => "vcs",
        }
    }
}

/// Kind of published file a descriptor is built from
///
/// Preference between them is configurable; the order of variants here
/// is the default preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    /// Pure-Python wheel (`py3-none-any`)
    AnyWheel,
    /// Source distribution
    Sdist,
    /// Binary wheel for manylinux platforms
    ManylinuxWheel,
}

/// Default preference order of package types
pub const DEFAULT_PACKAGE_TYPES: [PackageType; 3] = [
    PackageType::AnyWheel,
    PackageType::Sdist,
    PackageType::ManylinuxWheel,
];

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnyWheel => "anywheel",
            Self::Sdist => "sdist",
            Self::ManylinuxWheel => "manylinuxwheel",
        }
    }

    /// How a distribution of this type is obtained
    pub fn source_kind(&self) -> SourceKind {
        match self {
            Self::Sdist => SourceKind::Sdist,
            Self::AnyWheel | Self::ManylinuxWheel => SourceKind::Wheel,
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PackageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anywheel" => Ok(Self::AnyWheel),
            "sdist" => Ok(Self::Sdist),
            "manylinuxwheel" => Ok(Self::ManylinuxWheel),
            other => Err(Error::ParseError(format!(
                "Unknown package type '{}' (expected anywheel, sdist or manylinuxwheel)",
                other
            ))),
        }
    }
}

/// A concrete, versioned distribution
///
/// Identity is `(name, version)`: two refs that differ only in
/// `source_kind` or `origin` are the same node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionRef {
    pub name: String,
    pub version: DistVersion,
    pub source_kind: SourceKind,
    /// Install location for VCS and local sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl DistributionRef {
    pub fn new(name: &str, version: DistVersion) -> Self {
        Self {
            name: normalize_name(name),
            version,
            source_kind: SourceKind::Sdist,
            origin: None,
        }
    }

    pub fn with_source_kind(mut self, kind: SourceKind) -> Self {
        self.source_kind = kind;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// The argument handed to pip to install exactly this distribution
    pub fn install_target(&self) -> String {
        match &self.origin {
            Some(origin) => origin.clone(),
            None => format!("{}=={}", self.name, self.version),
        }
    }
}

impl PartialEq for DistributionRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for DistributionRef {}

impl Hash for DistributionRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl PartialOrd for DistributionRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistributionRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl fmt::Display for DistributionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

/// A requirement as declared in a distribution's own metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Requirement {
    pub name: String,
    /// Specifier text (`>=1.0,<2`), kept verbatim for reporting only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifier: Option<String>,
}

impl Requirement {
    /// Parse a PEP 508 requirement, keeping only name and specifier
    ///
    /// Extras and environment markers are dropped: trial installation
    /// decides what is actually needed.
    pub fn parse(s: &str) -> Result<Self> {
        let without_marker = s.split(';').next().unwrap_or_default().trim();
        let end = without_marker
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(without_marker.len());
        let name = &without_marker[..end];
        if name.is_empty() {
            return Err(Error::ParseError(format!("Invalid requirement: '{}'", s)));
        }

        let mut rest = without_marker[end..].trim();
        if rest.starts_with('[') {
            rest = rest.split_once(']').map_or("", |(_, tail)| tail.trim());
        }
        let rest = rest.trim_start_matches('(').trim_end_matches(')').trim();

        Ok(Self {
            name: normalize_name(name),
            specifier: (!rest.is_empty()).then(|| rest.to_string()),
        })
    }
}

/// A distribution requested by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRequest {
    pub name: String,
    pub version: Option<DistVersion>,
    pub source_kind: SourceKind,
    pub origin: Option<String>,
}

impl RootRequest {
    /// Parse a command-line package spec
    ///
    /// Accepted forms:
    /// - `name` (latest suitable release)
    /// - `name==version`
    /// - `git+<url>` (VCS checkout, named after the repository)
    /// - `file:///path/to/dist.whl` or an sdist archive
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();

        if spec.starts_with("git+") {
            let name = origin_basename(spec, &[".git"])?;
            return Ok(Self {
                name,
                version: None,
                source_kind: SourceKind::Vcs,
                origin: Some(spec.to_string()),
            });
        }

        if let Some(path) = spec.strip_prefix("file://") {
            if path.ends_with(".whl") {
                let file = path.rsplit('/').next().unwrap_or(path);
                let mut parts = file.trim_end_matches(".whl").split('-');
                let name = parts.next().unwrap_or_default();
                let version = parts
                    .next()
                    .map(DistVersion::parse)
                    .transpose()?;
                return Ok(Self {
                    name: normalize_name(name),
                    version,
                    source_kind: SourceKind::Wheel,
                    origin: Some(spec.to_string()),
                });
            }
            let name = origin_basename(spec, SDIST_SUFFIXES)?;
            return Ok(Self {
                name,
                version: None,
                source_kind: SourceKind::Sdist,
                origin: Some(spec.to_string()),
            });
        }

        match spec.split_once("==") {
            Some((name, version)) => Ok(Self {
                name: normalize_name(name),
                version: Some(DistVersion::parse(version)?),
                source_kind: SourceKind::Sdist,
                origin: None,
            }),
            None => {
                if spec.is_empty() || spec.contains(['<', '>', '=', '~', '!']) {
                    return Err(Error::ParseError(format!(
                        "Unsupported package spec '{}': use NAME or NAME==VERSION",
                        spec
                    )));
                }
                Ok(Self {
                    name: normalize_name(spec),
                    version: None,
                    source_kind: SourceKind::Sdist,
                    origin: None,
                })
            }
        }
    }

    /// Pin this request to a concrete version
    pub fn to_ref(&self, version: DistVersion) -> DistributionRef {
        let dist = DistributionRef::new(&self.name, version).with_source_kind(self.source_kind);
        match &self.origin {
            Some(origin) => dist.with_origin(origin.clone()),
            None => dist,
        }
    }
}

/// Archive suffixes recognized as sdists
pub const SDIST_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar.bz2", ".tar.xz", ".zip"];

/// Derive a distribution name from the last path segment of a location
fn origin_basename(origin: &str, suffixes: &[&str]) -> Result<String> {
    let trimmed = origin.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let mut base = last.split('#').next().unwrap_or(last);
    for suffix in suffixes {
        if let Some(stripped) = base.strip_suffix(suffix) {
            base = stripped;
            break;
        }
    }
    // sdists are named `<name>-<version>`; names never contain '-' followed by a digit
    let name = match base.rfind('-') {
        Some(pos) if base[pos + 1..].starts_with(|c: char| c.is_ascii_digit()) => &base[..pos],
        _ => base,
    };
    if name.is_empty() {
        return Err(Error::ParseError(format!(
            "Cannot derive a package name from '{}'",
            origin
        )));
    }
    Ok(normalize_name(name))
}
