// src/packages/traits.rs

//! The native catalog capability

use crate::config::CatalogConfig;
use crate::error::Result;
use crate::version::{NativeVersion, normalize_name};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a catalog answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogOrigin {
    /// Installed on this system
    Installed,
    /// Available from a configured repository
    Repository,
}

/// A native package that already provides a distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Native package name to depend on
    pub provider_name: String,
    pub installed_version: NativeVersion,
    pub origin: CatalogOrigin,
}

/// Read-only view of the host package manager
///
/// Implementations answer one question: is this normalized distribution
/// name already covered by a native package, and by which one.
pub trait NativeCatalog: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Option<CatalogEntry>>;
}

/// In-memory catalog
///
/// Used when no native package manager should be consulted, and as a
/// deterministic catalog in tests.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` as provided by `provider` at `version`
    pub fn with(mut self, name: &str, provider: &str, version: NativeVersion) -> Self {
        self.insert(name, provider, version);
        self
    }

    /// Catalog of the packages declared in `[catalog]`
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let mut catalog = Self::new();
        for provided in &config.provided {
            catalog.insert(
                &provided.name,
                &provided.provider,
                NativeVersion::parse(&provided.version)?,
            );
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, name: &str, provider: &str, version: NativeVersion) {
        self.entries.insert(
            normalize_name(name),
            CatalogEntry {
                provider_name: provider.to_string(),
                installed_version: version,
                origin: CatalogOrigin::Installed,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NativeCatalog for StaticCatalog {
    fn lookup(&self, name: &str) -> Result<Option<CatalogEntry>> {
        Ok(self.entries.get(&normalize_name(name)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_catalog_lookup_normalizes() {
        let catalog = StaticCatalog::new().with(
            "PyYAML",
            "python-yaml",
            NativeVersion::parse("6.0.1-2").unwrap(),
        );

        let entry = catalog.lookup("pyyaml").unwrap().unwrap();
        assert_eq!(entry.provider_name, "python-yaml");
        assert_eq!(entry.installed_version.to_string(), "6.0.1-2");
        assert!(catalog.lookup("requests").unwrap().is_none());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_static_catalog_from_config() {
        let config = CatalogConfig {
            use_pacman: false,
            provided: vec![crate::config::ProvidedPackage {
                name: "NumPy".into(),
                provider: "python-numpy".into(),
                version: "1.26.4-1".into(),
            }],
        };
        let catalog = StaticCatalog::from_config(&config).unwrap();
        assert!(catalog.lookup("numpy").unwrap().is_some());
    }
}
