// src/config.rs

//! Configuration file handling
//!
//! Configuration lives in a TOML file (by default
//! `$XDG_CONFIG_HOME/pypi2pkg/config.toml`); every field is optional and
//! command-line flags override what the file says.
//!
//! # Example
//!
//! ```toml
//! [package]
//! prefix = "python-"
//! pkgrel = 1
//! pre = false
//! pkgtypes = ["anywheel", "sdist", "manylinuxwheel"]
//! dependencies = true
//!
//! [conglomerates]
//! names = ["matplotlib-stack"]
//!
//! [install]
//! python = "python3"
//! fallback_flags = ["numpy"]
//! setup_requires = ["setuptools-scm"]
//! timeout_secs = 1800
//!
//! [[probe.candidates]]
//! name = "cython"
//! native = "cython"
//! globs = ["**/*.pyx"]
//!
//! [catalog]
//! use_pacman = true
//!
//! [[catalog.provided]]
//! name = "numpy"
//! provider = "python-numpy"
//! version = "1.26.4-1"
//! ```

use crate::distribution::{DEFAULT_PACKAGE_TYPES, PackageType};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// File name looked up inside the user's configuration directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub package: PackageConfig,

    #[serde(default)]
    pub conglomerates: ConglomerateConfig,

    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Naming and release numbering of generated descriptors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Prefix of native package names (`python-numpy`)
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Release number given to synthesized descriptors
    #[serde(default = "default_pkgrel")]
    pub pkgrel: u32,

    /// Allow pre-releases when picking the version of an unpinned root
    #[serde(default)]
    pub pre: bool,

    /// Preference order of the published files a package is built from
    #[serde(default = "default_pkgtypes")]
    pub pkgtypes: Vec<PackageType>,

    /// Emit descriptors for dependencies too, not only for the roots
    #[serde(default = "default_true")]
    pub dependencies: bool,
}

fn default_prefix() -> String {
    "python-".to_string()
}

fn default_pkgrel() -> u32 {
    1
}

fn default_pkgtypes() -> Vec<PackageType> {
    DEFAULT_PACKAGE_TYPES.to_vec()
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            pkgrel: default_pkgrel(),
            pre: false,
            pkgtypes: default_pkgtypes(),
            dependencies: true,
        }
    }
}

/// Distributions known to vendor several independent components
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConglomerateConfig {
    #[serde(default)]
    pub names: Vec<String>,
}

/// Trial installation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Interpreter used to create disposable environments
    #[serde(default = "default_python")]
    pub python: String,

    /// Distributions pre-installed on a retry when a plain install fails
    #[serde(default = "default_fallback_flags")]
    pub fallback_flags: Vec<String>,

    /// Distributions forced into every environment and every descriptor's build deps
    #[serde(default)]
    pub setup_requires: Vec<String>,

    /// Timeout for a single install or build command
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_fallback_flags() -> Vec<String> {
    vec!["numpy".to_string()]
}

fn default_timeout_secs() -> u64 {
    1800
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            fallback_flags: default_fallback_flags(),
            setup_requires: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl InstallConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// An optional build dependency whose necessity is probed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeCandidate {
    /// Name handed to the builder (a distribution or tool name)
    pub name: String,

    /// Native package providing it (`cython`, `swig`)
    pub native: String,

    /// Source files whose presence makes the dependency uncertain
    #[serde(default)]
    pub globs: Vec<String>,
}

/// Build-time dependency probing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_candidates")]
    pub candidates: Vec<ProbeCandidate>,

    /// Regexes marking a build failure as "missing build tool"
    #[serde(default = "default_missing_tool_patterns")]
    pub missing_tool_patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_candidates() -> Vec<ProbeCandidate> {
    vec![
        ProbeCandidate {
            name: "cython".to_string(),
            native: "cython".to_string(),
            globs: vec!["**/*.pyx".to_string()],
        },
        ProbeCandidate {
            name: "swig".to_string(),
            native: "swig".to_string(),
            globs: vec!["**/*.i".to_string()],
        },
    ]
}

fn default_missing_tool_patterns() -> Vec<String> {
    vec![
        r"No module named '?(?i:cython)'?".to_string(),
        r"(?m)^.*command '?swig'? (?:failed|not found)".to_string(),
        r"(?:swig|cython|cythonize): (?:command )?not found".to_string(),
        r"unable to execute '?swig'?".to_string(),
    ]
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            candidates: default_candidates(),
            missing_tool_patterns: default_missing_tool_patterns(),
        }
    }
}

/// A native package declared as providing a distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidedPackage {
    /// Distribution name
    pub name: String,
    /// Native package providing it
    pub provider: String,
    /// Native version (`pkgver-pkgrel`)
    pub version: String,
}

/// Where native providers are looked up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Query pacman; when false only `provided` is consulted
    #[serde(default = "default_true")]
    pub use_pacman: bool,

    #[serde(default)]
    pub provided: Vec<ProvidedPackage>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            use_pacman: true,
            provided: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load the configuration at `path`, or the user's default file if it exists
    ///
    /// A missing default file is not an error; an explicitly named one is.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<()> {
        if self.package.pkgrel == 0 {
            return Err(Error::ConfigError("package.pkgrel must be at least 1".to_string()));
        }
        if self.package.pkgtypes.is_empty() {
            return Err(Error::ConfigError("package.pkgtypes must not be empty".to_string()));
        }
        if self.install.timeout_secs == 0 {
            return Err(Error::ConfigError("install.timeout_secs must be positive".to_string()));
        }
        for pattern in &self.probe.missing_tool_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                Error::ConfigError(format!("invalid missing-tool pattern '{}': {}", pattern, e))
            })?;
        }
        for provided in &self.catalog.provided {
            crate::version::NativeVersion::parse(&provided.version).map_err(|e| {
                Error::ConfigError(format!("catalog entry {}: {}", provided.name, e))
            })?;
        }
        for candidate in &self.probe.candidates {
            if candidate.name.is_empty() || candidate.native.is_empty() {
                return Err(Error::ConfigError(
                    "probe candidates need both `name` and `native`".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Default location of the configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pypi2pkg").join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.package.prefix, "python-");
        assert_eq!(config.package.pkgrel, 1);
        assert!(!config.package.pre);
        assert_eq!(config.package.pkgtypes, DEFAULT_PACKAGE_TYPES.to_vec());
        assert!(config.package.dependencies);
        assert_eq!(config.install.fallback_flags, vec!["numpy".to_string()]);
        assert!(config.probe.enabled);
        assert_eq!(config.probe.candidates.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_partial_file() {
        let config = Config::from_toml(
            r#"
            [package]
            pkgrel = 3
            pkgtypes = ["sdist", "anywheel"]
            dependencies = false

            [conglomerates]
            names = ["bigpkg"]
            "#,
        )
        .unwrap();
        assert_eq!(config.package.pkgrel, 3);
        assert_eq!(config.package.pkgtypes, vec![PackageType::Sdist, PackageType::AnyWheel]);
        assert!(!config.package.dependencies);
        assert_eq!(config.package.prefix, "python-");
        assert_eq!(config.conglomerates.names, vec!["bigpkg".to_string()]);
        assert_eq!(config.install.python, "python3");
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(Config::from_toml("[package]\npkgrel = 0\n").is_err());
        assert!(Config::from_toml("[probe]\nmissing_tool_patterns = [\"(\"]\n").is_err());
        assert!(Config::from_toml("[package]\npkgrel = \"x\"\n").is_err());
        assert!(Config::from_toml("[package]\npkgtypes = []\n").is_err());
        assert!(Config::from_toml("[package]\npkgtypes = [\"egg\"]\n").is_err());
    }

    #[test]
    fn test_config_catalog_section() {
        let config = Config::from_toml(
            r#"
            [catalog]
            use_pacman = false

            [[catalog.provided]]
            name = "numpy"
            provider = "python-numpy"
            version = "1.26.4-1"
            "#,
        )
        .unwrap();
        assert!(!config.catalog.use_pacman);
        assert_eq!(config.catalog.provided[0].provider, "python-numpy");
        assert!(Config::default().catalog.use_pacman);

        let bad = "[[catalog.provided]]\nname = \"x\"\nprovider = \"y\"\nversion = \"\"\n";
        assert!(Config::from_toml(bad).is_err());
    }

    #[test]
    fn test_config_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[install]\nfallback_flags = []\ntimeout_secs = 60").unwrap();

        let config = Config::load_or_default(Some(file.path())).unwrap();
        assert!(config.install.fallback_flags.is_empty());
        assert_eq!(config.install.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_config_missing_explicit_file() {
        let result = Config::load_or_default(Some(Path::new("/nonexistent/pypi2pkg.toml")));
        assert!(result.is_err());
    }
}
