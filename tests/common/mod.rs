// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! The resolver is driven entirely through in-memory fakes of its
//! capabilities: nothing here spawns pip, pacman or a compiler.

#![allow(dead_code)]

use pypi2pkg::builder::{BuildArtifact, BuildError, Builder};
use pypi2pkg::distribution::DistributionRef;
use pypi2pkg::environment::{Environment, InstallError, ManifestEntry, TrialInstallReport};
use pypi2pkg::packages::StaticCatalog;
use pypi2pkg::probe::UncertainBuildDeps;
use pypi2pkg::{DistVersion, NativeVersion, PackageType, Resolver, ResolverOptions};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

pub fn version(v: &str) -> DistVersion {
    DistVersion::parse(v).unwrap()
}

pub fn dist(name: &str, v: &str) -> DistributionRef {
    DistributionRef::new(name, version(v))
}

/// Catalog providing `name` through `provider` at version `1.0-1`
pub fn catalog(provided: &[(&str, &str)]) -> StaticCatalog {
    provided.iter().fold(StaticCatalog::new(), |catalog, (name, provider)| {
        catalog.with(name, provider, NativeVersion::parse("1.0-1").unwrap())
    })
}

/// What a scripted trial install does
#[derive(Debug, Clone)]
enum Script {
    Install {
        report: TrialInstallReport,
        /// Flags without which the install fails
        needs_flags: Vec<String>,
    },
    Fail(String),
}

/// Environment answering trial installs from a script
///
/// Keys are `name==version`. Every call is recorded so tests can assert
/// how often a distribution was installed.
#[derive(Default)]
pub struct ScriptedEnvironment {
    scripts: HashMap<String, Script>,
    versions: HashMap<String, Vec<DistVersion>>,
    types: HashMap<String, BTreeSet<PackageType>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name==version` installs itself plus `deps`
    pub fn package(self, name: &str, v: &str, deps: &[(&str, &str)]) -> Self {
        let target = dist(name, v);
        let mut installed = vec![target.clone()];
        installed.extend(deps.iter().map(|(n, v)| dist(n, v)));
        let report = TrialInstallReport {
            target_name: target.name.clone(),
            installed_distributions: installed,
            ..Default::default()
        };
        self.report(name, v, report)
    }

    /// `name==version` installs exactly what `report` says
    pub fn report(mut self, name: &str, v: &str, report: TrialInstallReport) -> Self {
        self.scripts.insert(
            dist(name, v).to_string(),
            Script::Install {
                report,
                needs_flags: Vec::new(),
            },
        );
        self
    }

    /// The install of `name==version` only succeeds with `flags` pre-installed
    pub fn needs_flags(mut self, name: &str, v: &str, flags: &[&str]) -> Self {
        if let Some(Script::Install { needs_flags, .. }) =
            self.scripts.get_mut(&dist(name, v).to_string())
        {
            *needs_flags = flags.iter().map(|f| f.to_string()).collect();
        }
        self
    }

    pub fn failing(mut self, name: &str, v: &str, stderr: &str) -> Self {
        self.scripts
            .insert(dist(name, v).to_string(), Script::Fail(stderr.to_string()));
        self
    }

    /// Versions returned by `available_versions(query)`
    pub fn versions(mut self, query: &str, versions: &[&str]) -> Self {
        self.versions
            .insert(query.to_string(), versions.iter().map(|v| version(v)).collect());
        self
    }

    /// Package types published for `name==version` (sdist only otherwise)
    pub fn types(mut self, name: &str, v: &str, types: &[PackageType]) -> Self {
        self.types
            .insert(dist(name, v).to_string(), types.iter().copied().collect());
        self
    }

    /// Number of trial installs of `name==version`
    pub fn install_count(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(k, _)| k == key).count()
    }

    pub fn total_installs(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Environment for ScriptedEnvironment {
    fn trial_install(
        &self,
        dist: &DistributionRef,
        extra_flags: &[String],
    ) -> Result<TrialInstallReport, InstallError> {
        let key = dist.to_string();
        self.calls
            .lock()
            .unwrap()
            .push((key.clone(), extra_flags.to_vec()));

        match self.scripts.get(&key) {
            Some(Script::Install {
                report,
                needs_flags,
            }) => {
                if needs_flags.iter().all(|f| extra_flags.contains(f)) {
                    Ok(report.clone())
                } else {
                    Err(InstallError::CommandFailed {
                        target: key,
                        stderr: format!("ModuleNotFoundError: No module named '{}'", needs_flags.join(",")),
                    })
                }
            }
            Some(Script::Fail(stderr)) => Err(InstallError::CommandFailed {
                target: key,
                stderr: stderr.clone(),
            }),
            None => Err(InstallError::CommandFailed {
                target: key.clone(),
                stderr: format!("ERROR: No matching distribution found for {}", key),
            }),
        }
    }

    fn available_versions(&self, name_or_origin: &str) -> Result<Vec<DistVersion>, InstallError> {
        self.versions
            .get(name_or_origin)
            .cloned()
            .ok_or_else(|| InstallError::NoVersions(name_or_origin.to_string()))
    }

    fn package_types(&self, dist: &DistributionRef) -> Result<BTreeSet<PackageType>, InstallError> {
        Ok(self
            .types
            .get(&dist.to_string())
            .cloned()
            .unwrap_or_else(|| BTreeSet::from([PackageType::Sdist])))
    }
}

/// Builder that fails with a missing-cython signature unless `needs` are present
pub struct MockBuilder {
    needs: Vec<String>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockBuilder {
    pub fn new(needs: &[&str]) -> Self {
        Self {
            needs: needs.iter().map(|n| n.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn builds_of(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(k, _)| k == key).count()
    }

    pub fn total_builds(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Builder for MockBuilder {
    fn attempt_build(
        &self,
        dist: &DistributionRef,
        build_time_deps: &[String],
    ) -> Result<BuildArtifact, BuildError> {
        self.calls
            .lock()
            .unwrap()
            .push((dist.to_string(), build_time_deps.to_vec()));

        if self.needs.iter().all(|n| build_time_deps.contains(n)) {
            Ok(BuildArtifact {
                dist: dist.clone(),
                file_name: format!("{}-{}-py3-none-any.whl", dist.name, dist.version),
            })
        } else {
            Err(BuildError::Failed {
                target: dist.to_string(),
                signature: "ModuleNotFoundError: No module named 'Cython'".to_string(),
            })
        }
    }
}

/// Heuristic reporting the same uncertain build dependencies for every distribution
pub struct FixedUncertain(pub Vec<String>);

impl UncertainBuildDeps for FixedUncertain {
    fn uncertain(&self, _dist: &DistributionRef) -> pypi2pkg::Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Resolver over the given fakes with default options and no fallback flags
pub fn resolver(
    catalog: StaticCatalog,
    env: Arc<ScriptedEnvironment>,
    builder: Arc<MockBuilder>,
) -> Resolver {
    let options = ResolverOptions {
        fallback_flags: Vec::new(),
        ..ResolverOptions::default()
    };
    Resolver::new(Arc::new(catalog), env, builder).with_options(options)
}

/// Trial install report of a conglomerate shipping `components`
///
/// `components` maps each top-level package to the modules its files import.
pub fn conglomerate_report(
    name: &str,
    v: &str,
    deps: &[(&str, &str)],
    components: &[(&str, &[&str])],
    top_level: &[(&str, &str)],
) -> TrialInstallReport {
    let target = dist(name, v);
    let mut installed = vec![target.clone()];
    installed.extend(deps.iter().map(|(n, v)| dist(n, v)));

    let mut manifest = vec![ManifestEntry::new(format!("{}-{}.dist-info/RECORD", name, v))];
    for (component, imports) in components {
        manifest.push(
            ManifestEntry::new(format!("{}/__init__.py", component)).with_imports(imports.iter().copied()),
        );
    }

    let mut tops: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (dist_name, module) in top_level {
        tops.entry(dist_name.to_string()).or_default().insert(module.to_string());
    }

    TrialInstallReport {
        target_name: target.name.clone(),
        installed_distributions: installed,
        manifest,
        top_level: tops,
        ..Default::default()
    }
}
