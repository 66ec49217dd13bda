// src/descriptor.rs

//! Synthesized package descriptors
//!
//! A [`PackageDescriptor`] is everything needed to write a native build
//! manifest for one package: its name and version, runtime and build-time
//! dependencies in native vocabulary, and the conflicts/provides relations.
//! Rendering it into a PKGBUILD happens outside this crate.

use crate::distribution::{DistributionRef, SourceKind};
use crate::error::{Error, Result};
use crate::version::{DistVersion, NativeVersion, VersionConstraint, normalize_name};
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Suffix of descriptors built from version control checkouts
pub const VCS_SUFFIX: &str = "-git";

/// Separator between an aggregate's name and a component's name
pub const COMPONENT_SEPARATOR: &str = "--";

/// Role of a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DescriptorKind {
    /// An ordinary package built from one distribution
    Standard,
    /// One piece of a split conglomerate
    Component { aggregate: String },
    /// Meta package depending on every component of a conglomerate
    Aggregate { components: Vec<String> },
}

/// A conflict declaration: `name` at versions matching `constraint`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConflictEntry {
    pub name: String,
    pub constraint: VersionConstraint,
}

impl ConflictEntry {
    /// Conflict with every version of `name`
    pub fn any(name: &str) -> Self {
        Self {
            name: name.to_string(),
            constraint: VersionConstraint::Any,
        }
    }

    /// Conflicts with every version of `name` other than `version`
    pub fn all_except(name: &str, version: &NativeVersion) -> [Self; 2] {
        VersionConstraint::all_except(version).map(|constraint| Self {
            name: name.to_string(),
            constraint,
        })
    }
}

impl fmt::Display for ConflictEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.constraint)
    }
}

impl Ord for ConflictEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.constraint.to_string().cmp(&other.constraint.to_string()))
    }
}

impl PartialOrd for ConflictEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for ConflictEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One synthesized native package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageDescriptor {
    pub name: String,
    /// Upstream version the package is built from
    pub version: DistVersion,
    /// Native release number (pkgrel)
    pub release_ordinal: u32,
    pub runtime_depends: BTreeSet<String>,
    pub build_time_depends: BTreeSet<String>,
    pub conflicts: BTreeSet<ConflictEntry>,
    pub provides: BTreeSet<String>,
    pub kind: DescriptorKind,
    /// Distribution this descriptor was synthesized from
    pub source: DistributionRef,
}

impl PackageDescriptor {
    pub fn new(name: String, source: &DistributionRef, release_ordinal: u32) -> Self {
        Self {
            name,
            version: source.version.clone(),
            release_ordinal,
            runtime_depends: BTreeSet::new(),
            build_time_depends: BTreeSet::new(),
            conflicts: BTreeSet::new(),
            provides: BTreeSet::new(),
            kind: DescriptorKind::Standard,
            source: source.clone(),
        }
    }

    /// Full native version (`pkgver-pkgrel`)
    pub fn native_version(&self) -> NativeVersion {
        NativeVersion::from_dist(&self.version, self.release_ordinal)
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, DescriptorKind::Aggregate { .. })
    }
}

/// Maps distribution names to native package names
#[derive(Debug, Clone)]
pub struct Naming {
    prefix: String,
}

impl Naming {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Native name of a normalized distribution name (`python-foo`)
    pub fn base_name(&self, dist_name: &str) -> String {
        format!("{}{}", self.prefix, normalize_name(dist_name))
    }

    /// Native name of a distribution, `-git` suffixed for VCS sources
    pub fn package_name(&self, dist: &DistributionRef) -> String {
        let base = self.base_name(&dist.name);
        match dist.source_kind {
            SourceKind::Vcs => format!("{}{}", base, VCS_SUFFIX),
            _ => base,
        }
    }

    /// Name of a split component (`python-foo--bar`)
    ///
    /// Always two-part, so a component can never take the aggregate's name.
    pub fn component_name(&self, aggregate: &str, component: &str) -> String {
        format!("{}{}{}", aggregate, COMPONENT_SEPARATOR, normalize_name(component))
    }
}

/// Reject descriptor sets in which two descriptors claim the same name
pub fn check_unique_names(descriptors: &[PackageDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        if !seen.insert(descriptor.name.as_str()) {
            return Err(Error::ResolutionError(format!(
                "Two descriptors would be named {}",
                descriptor.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(name: &str, version: &str) -> DistributionRef {
        DistributionRef::new(name, DistVersion::parse(version).unwrap())
    }

    #[test]
    fn test_naming() {
        let naming = Naming::new("python-");
        assert_eq!(naming.base_name("PyYAML"), "python-pyyaml");
        assert_eq!(naming.package_name(&dist("foo", "1.0")), "python-foo");

        let vcs = dist("foo", "1.0").with_source_kind(SourceKind::Vcs);
        assert_eq!(naming.package_name(&vcs), "python-foo-git");
        assert_eq!(naming.component_name("python-foo", "Bar_Baz"), "python-foo--bar-baz");
    }

    #[test]
    fn test_conflict_entry_display_and_order() {
        let version = NativeVersion::parse("2.0").unwrap();
        let [low, high] = ConflictEntry::all_except("python-foo", &version);
        assert_eq!(low.to_string(), "python-foo<2.0");
        assert_eq!(high.to_string(), "python-foo>2.0");
        assert_eq!(ConflictEntry::any("python-foo").to_string(), "python-foo");

        let set: BTreeSet<ConflictEntry> = [high.clone(), low.clone()].into_iter().collect();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![low, high]);
    }

    #[test]
    fn test_descriptor_versions() {
        let descriptor = PackageDescriptor::new("python-foo".into(), &dist("foo", "1.2.0"), 3);
        assert_eq!(descriptor.native_version().to_string(), "1.2.0-3");
        assert!(!descriptor.is_aggregate());
    }

    #[test]
    fn test_check_unique_names() {
        let a = PackageDescriptor::new("python-a".into(), &dist("a", "1.0"), 1);
        let b = PackageDescriptor::new("python-b".into(), &dist("b", "1.0"), 1);
        assert!(check_unique_names(&[a.clone(), b]).is_ok());
        assert!(check_unique_names(&[a.clone(), a]).is_err());
    }

    #[test]
    fn test_descriptor_serializes() {
        let mut descriptor = PackageDescriptor::new("python-foo".into(), &dist("foo", "1.0"), 1);
        descriptor.conflicts.insert(ConflictEntry::any("python-foo-git"));
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["name"], "python-foo");
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["conflicts"][0], "python-foo-git");
        assert_eq!(json["kind"]["type"], "standard");
    }
}
