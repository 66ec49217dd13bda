// src/environment/mod.rs

//! Isolated installation environments and the trial installer
//!
//! Declared metadata is not trusted: the dependency footprint of a
//! distribution is observed by installing it into a disposable
//! environment. The [`Environment`] trait abstracts that environment;
//! [`TrialInstaller`] adds the fallback-retry policy on top.

mod pip;
mod venv;

pub use pip::{
    OutdatedListing, classify_download, parse_pip_outdated, parse_pip_show, scan_imports,
    top_level_names, top_level_of,
};
pub use venv::VenvEnvironment;

use crate::distribution::{DistributionRef, PackageType, Requirement};
use crate::error::Error;
use crate::exec::Interrupt;
use crate::version::DistVersion;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from a trial installation
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Installation interrupted")]
    Interrupted,

    #[error("Failed to install {target}: {stderr}")]
    CommandFailed { target: String, stderr: String },

    #[error("Installing {target} timed out after {seconds} seconds")]
    Timeout { target: String, seconds: u64 },

    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    #[error("Unexpected installer output: {0}")]
    Metadata(String),

    #[error("No versions found for {0}")]
    NoVersions(String),

    #[error("I/O error during installation: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl InstallError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Attach the install target to a generic runner error
    pub(crate) fn from_runner(target: &str, err: Error) -> Self {
        match err {
            Error::Interrupted => Self::Interrupted,
            Error::CommandFailed { stderr, .. } => Self::CommandFailed {
                target: target.to_string(),
                stderr,
            },
            Error::CommandTimeout { seconds, .. } => Self::Timeout {
                target: target.to_string(),
                seconds,
            },
            Error::ToolNotFound(tool) => Self::ToolNotFound(tool),
            Error::IoError(e) => Self::Io(e),
            other => Self::Other(other.to_string()),
        }
    }
}

/// One installed file of the distribution under trial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to site-packages
    pub path: PathBuf,
    /// Top-level modules this file imports
    #[serde(default)]
    pub imports: BTreeSet<String>,
}

impl ManifestEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            imports: BTreeSet::new(),
        }
    }

    pub fn with_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports = imports.into_iter().map(Into::into).collect();
        self
    }

    /// Top-level import name this file belongs to, if importable
    pub fn top_level(&self) -> Option<String> {
        top_level_of(&self.path)
    }
}

/// What a trial installation observed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialInstallReport {
    /// Normalized name the requested distribution was installed under
    pub target_name: String,
    /// Every distribution the install added, the target included
    pub installed_distributions: Vec<DistributionRef>,
    /// Requirements the target declares in its own metadata
    pub declared_requirements: Vec<Requirement>,
    /// Files installed by the target
    pub manifest: Vec<ManifestEntry>,
    /// Top-level import names per installed distribution
    pub top_level: BTreeMap<String, BTreeSet<String>>,
}

impl TrialInstallReport {
    /// Installed distributions other than the one under trial
    pub fn observed(&self, dist: &DistributionRef) -> Vec<DistributionRef> {
        let mut observed: Vec<DistributionRef> = self
            .installed_distributions
            .iter()
            .filter(|d| d.name != dist.name && d.name != self.target_name)
            .cloned()
            .collect();
        observed.sort();
        observed.dedup();
        observed
    }
}

/// A disposable installation environment
pub trait Environment: Send + Sync {
    /// Install `dist` with its dependencies into a fresh environment
    ///
    /// `extra_flags` are distributions installed beforehand; they are not
    /// part of the reported installed set.
    fn trial_install(
        &self,
        dist: &DistributionRef,
        extra_flags: &[String],
    ) -> Result<TrialInstallReport, InstallError>;

    /// Versions published for a name, or the version a VCS/local origin builds
    fn available_versions(&self, name_or_origin: &str) -> Result<Vec<DistVersion>, InstallError>;

    /// Kinds of files published for `dist`
    ///
    /// Environments that cannot tell report an sdist only.
    fn package_types(&self, _dist: &DistributionRef) -> Result<BTreeSet<PackageType>, InstallError> {
        Ok(BTreeSet::from([PackageType::Sdist]))
    }
}

/// Result of [`TrialInstaller::install`]
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub report: TrialInstallReport,
    /// Fallback distributions the install needed
    pub install_flags: Vec<String>,
}

/// Runs trial installs, retrying once with fallback flags on failure
pub struct TrialInstaller<'a> {
    env: &'a dyn Environment,
    fallback_flags: Vec<String>,
    interrupt: Interrupt,
}

impl<'a> TrialInstaller<'a> {
    pub fn new(env: &'a dyn Environment, fallback_flags: Vec<String>, interrupt: Interrupt) -> Self {
        Self {
            env,
            fallback_flags,
            interrupt,
        }
    }

    pub fn install(&self, dist: &DistributionRef) -> Result<TrialOutcome, InstallError> {
        if self.interrupt.is_raised() {
            return Err(InstallError::Interrupted);
        }

        info!("Trial-installing {}", dist);
        let first = match self.env.trial_install(dist, &[]) {
            Ok(report) => {
                return Ok(TrialOutcome {
                    report,
                    install_flags: Vec::new(),
                });
            }
            Err(e) => e,
        };

        if first.is_interrupted() || self.fallback_flags.is_empty() || self.interrupt.is_raised() {
            return Err(first);
        }

        warn!(
            "Installing {} failed ({}), retrying with {} pre-installed",
            dist,
            first,
            self.fallback_flags.join(", ")
        );
        let report = self.env.trial_install(dist, &self.fallback_flags)?;
        Ok(TrialOutcome {
            report,
            install_flags: self.fallback_flags.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails until it sees the expected flags
    struct FlakyEnvironment {
        needs: Vec<String>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Environment for FlakyEnvironment {
        fn trial_install(
            &self,
            dist: &DistributionRef,
            extra_flags: &[String],
        ) -> Result<TrialInstallReport, InstallError> {
            self.calls.lock().unwrap().push(extra_flags.to_vec());
            if extra_flags == self.needs.as_slice() {
                Ok(TrialInstallReport {
                    target_name: dist.name.clone(),
                    installed_distributions: vec![dist.clone()],
                    ..Default::default()
                })
            } else {
                Err(InstallError::CommandFailed {
                    target: dist.to_string(),
                    stderr: "ModuleNotFoundError: No module named 'numpy'".to_string(),
                })
            }
        }

        fn available_versions(&self, _: &str) -> Result<Vec<DistVersion>, InstallError> {
            Ok(Vec::new())
        }
    }

    fn dist(name: &str, version: &str) -> DistributionRef {
        DistributionRef::new(name, DistVersion::parse(version).unwrap())
    }

    #[test]
    fn test_trial_installer_no_retry_on_success() {
        let env = FlakyEnvironment {
            needs: Vec::new(),
            calls: Mutex::new(Vec::new()),
        };
        let installer = TrialInstaller::new(&env, vec!["numpy".into()], Interrupt::new());
        let outcome = installer.install(&dist("foo", "1.0")).unwrap();
        assert!(outcome.install_flags.is_empty());
        assert_eq!(env.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_trial_installer_records_fallback_flags() {
        let env = FlakyEnvironment {
            needs: vec!["numpy".into()],
            calls: Mutex::new(Vec::new()),
        };
        let installer = TrialInstaller::new(&env, vec!["numpy".into()], Interrupt::new());
        let outcome = installer.install(&dist("foo", "1.0")).unwrap();
        assert_eq!(outcome.install_flags, vec!["numpy".to_string()]);
        assert_eq!(env.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_trial_installer_without_fallback_fails() {
        let env = FlakyEnvironment {
            needs: vec!["numpy".into()],
            calls: Mutex::new(Vec::new()),
        };
        let installer = TrialInstaller::new(&env, Vec::new(), Interrupt::new());
        assert!(installer.install(&dist("foo", "1.0")).is_err());
        assert_eq!(env.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_trial_installer_interrupted() {
        let env = FlakyEnvironment {
            needs: Vec::new(),
            calls: Mutex::new(Vec::new()),
        };
        let interrupt = Interrupt::new();
        interrupt.raise();
        let installer = TrialInstaller::new(&env, Vec::new(), interrupt);
        let err = installer.install(&dist("foo", "1.0")).unwrap_err();
        assert!(err.is_interrupted());
        assert!(env.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_report_observed_excludes_target() {
        let report = TrialInstallReport {
            target_name: "foo-lib".to_string(),
            installed_distributions: vec![
                dist("foo-lib", "1.0"),
                dist("bar", "2.0"),
                dist("baz", "0.1"),
            ],
            ..Default::default()
        };
        let observed = report.observed(&dist("foo", "1.0"));
        let names: Vec<&str> = observed.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["bar", "baz"]);
    }

    #[test]
    fn test_manifest_entry_top_level() {
        assert_eq!(ManifestEntry::new("e1/core.py").top_level().as_deref(), Some("e1"));
        assert_eq!(ManifestEntry::new("pkg-1.0.dist-info/RECORD").top_level(), None);
    }
}
