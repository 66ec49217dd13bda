// src/environment/venv.rs

//! Trial installs in throwaway virtual environments
//!
//! Each trial creates a fresh `python -m venv` in a temporary directory,
//! installs the target once without dependencies (to learn the name it
//! installs under, which may differ from the requested one for VCS and
//! local sources) and once with dependencies, diffing `pip list` around
//! each step. File lists and declared requirements come from
//! `pip show -f`.

use super::pip::{
    classify_download, parse_index_versions, parse_pip_list, parse_pip_show, scan_imports,
    top_level_names,
};
use super::{Environment, InstallError, ManifestEntry, TrialInstallReport};
use crate::distribution::{DistributionRef, PackageType, Requirement, SourceKind};
use crate::exec::CommandRunner;
use crate::version::DistVersion;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// A created virtual environment
struct Venv {
    dir: TempDir,
}

impl Venv {
    fn python(&self) -> PathBuf {
        self.dir.path().join("bin").join("python")
    }

    fn bin(&self) -> PathBuf {
        self.dir.path().join("bin")
    }
}

/// Environment backed by Python virtual environments
#[derive(Debug, Clone)]
pub struct VenvEnvironment {
    runner: CommandRunner,
    python: String,
    setup_requires: Vec<String>,
}

impl VenvEnvironment {
    pub fn new(runner: CommandRunner, python: &str) -> Self {
        Self {
            runner,
            python: python.to_string(),
            setup_requires: Vec::new(),
        }
    }

    /// Distributions installed into every environment before the trial
    pub fn with_setup_requires(mut self, setup_requires: Vec<String>) -> Self {
        self.setup_requires = setup_requires;
        self
    }

    fn create(&self, target: &str) -> Result<Venv, InstallError> {
        let dir = TempDir::new()?;
        let dir_str = dir.path().to_string_lossy().to_string();
        self.runner
            .run_checked(&self.python, &["-m", "venv", &dir_str], None)
            .map_err(|e| InstallError::from_runner(target, e))?;
        let venv = Venv { dir };

        if !self.setup_requires.is_empty() {
            self.pip(&venv, target, &self.install_args(&["--upgrade"], &self.setup_requires))?;
        }
        Ok(venv)
    }

    fn install_args(&self, flags: &[&str], targets: &[String]) -> Vec<String> {
        std::iter::once("install".to_string())
            .chain(flags.iter().map(|f| f.to_string()))
            .chain(targets.iter().cloned())
            .collect()
    }

    /// Run pip inside the environment, from the environment directory
    ///
    /// Running from the venv keeps pip away from whatever sources happen to
    /// be in the caller's working directory.
    fn pip(&self, venv: &Venv, target: &str, args: &[String]) -> Result<String, InstallError> {
        let python = venv.python();
        let python = python.to_string_lossy();
        let mut full: Vec<&str> = vec!["-m", "pip"];
        full.extend(args.iter().map(String::as_str));
        let runner = self.runner.clone().with_path_prefix(&venv.bin());
        runner
            .run_checked(&python, &full, Some(venv.dir.path()))
            .map(|output| output.stdout)
            .map_err(|e| InstallError::from_runner(target, e))
    }

    fn list(&self, venv: &Venv, target: &str) -> Result<BTreeMap<String, String>, InstallError> {
        let json = self.pip(venv, target, &["list".into(), "--format=json".into()])?;
        parse_pip_list(&json).map_err(|e| InstallError::Metadata(format!("pip list: {}", e)))
    }

    fn show(&self, venv: &Venv, target: &str, names: &[String]) -> Result<String, InstallError> {
        let mut args = vec!["show".to_string(), "-f".to_string()];
        args.extend(names.iter().cloned());
        self.pip(venv, target, &args)
    }

    /// Download `target` alone under a `--only-binary`/`--no-binary` policy
    fn download(&self, target: &str, policy: &str) -> Result<Vec<String>, InstallError> {
        let dir = TempDir::new()?;
        let dest = dir.path().to_string_lossy().to_string();
        self.runner
            .run_checked(
                &self.python,
                &["-m", "pip", "download", "--no-deps", policy, "--dest", &dest, target],
                None,
            )
            .map_err(|e| InstallError::from_runner(target, e))?;

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir.path())? {
            files.push(entry?.file_name().to_string_lossy().to_string());
        }
        Ok(files)
    }
}

/// pip flags pinning the kind of file `dist` is installed from
fn binary_policy(dist: &DistributionRef) -> Vec<String> {
    if dist.origin.is_some() {
        return Vec::new();
    }
    match dist.source_kind {
        SourceKind::Wheel => vec!["--only-binary".to_string(), dist.name.clone()],
        SourceKind::Sdist => vec!["--no-binary".to_string(), dist.name.clone()],
        SourceKind::Vcs => Vec::new(),
    }
}

/// Entries present in `after` but not in `before`
fn added(before: &BTreeMap<String, String>, after: &BTreeMap<String, String>) -> Vec<(String, String)> {
    after
        .iter()
        .filter(|(name, _)| !before.contains_key(*name))
        .map(|(n, v)| (n.clone(), v.clone()))
        .collect()
}

fn read_imports(location: &Path, file: &Path) -> BTreeSet<String> {
    if file.extension().is_none_or(|ext| ext != "py") {
        return BTreeSet::new();
    }
    match std::fs::read_to_string(location.join(file)) {
        Ok(source) => scan_imports(&source),
        Err(e) => {
            debug!("Cannot scan {}: {}", file.display(), e);
            BTreeSet::new()
        }
    }
}

impl Environment for VenvEnvironment {
    fn trial_install(
        &self,
        dist: &DistributionRef,
        extra_flags: &[String],
    ) -> Result<TrialInstallReport, InstallError> {
        let target = dist.install_target();
        let venv = self.create(&target)?;

        if !extra_flags.is_empty() {
            self.pip(&venv, &target, &self.install_args(&[], extra_flags))?;
        }

        let policy = binary_policy(dist);
        let policy: Vec<&str> = policy.iter().map(String::as_str).collect();
        let mut no_deps = vec!["--no-deps"];
        no_deps.extend(&policy);

        let before = self.list(&venv, &target)?;
        self.pip(&venv, &target, &self.install_args(&no_deps, &[target.clone()]))?;
        let after_target = self.list(&venv, &target)?;

        // Already-present names (setuptools, pip, a fallback flag) install as no-ops
        let target_name = match added(&before, &after_target).as_slice() {
            [(name, _)] => name.clone(),
            [] => dist.name.clone(),
            several => {
                return Err(InstallError::Metadata(format!(
                    "installing {} without dependencies added {} distributions",
                    target,
                    several.len()
                )));
            }
        };

        self.pip(&venv, &target, &self.install_args(&policy, &[target.clone()]))?;
        let after = self.list(&venv, &target)?;

        let mut installed_distributions = Vec::new();
        for (name, version) in added(&before, &after) {
            match DistVersion::parse(&version) {
                Ok(parsed) => installed_distributions.push(DistributionRef::new(&name, parsed)),
                Err(e) => warn!("Skipping {} with unparseable version {}: {}", name, version, e),
            }
        }
        if !installed_distributions.iter().any(|d| d.name == target_name) {
            installed_distributions.push(dist.clone());
        }

        let names: Vec<String> = installed_distributions.iter().map(|d| d.name.clone()).collect();
        let blocks = parse_pip_show(&self.show(&venv, &target, &names)?);

        let mut report = TrialInstallReport {
            target_name: target_name.clone(),
            installed_distributions,
            ..Default::default()
        };

        for block in &blocks {
            report
                .top_level
                .insert(block.name.clone(), top_level_names(&block.files));

            if block.name == target_name {
                report.declared_requirements = block
                    .requires
                    .iter()
                    .filter_map(|r| Requirement::parse(r).ok())
                    .collect();
                report.manifest = block
                    .files
                    .iter()
                    .map(|file| ManifestEntry {
                        path: file.clone(),
                        imports: read_imports(&block.location, file),
                    })
                    .collect();
            }
        }

        debug!(
            "Trial install of {} added {} distributions",
            dist,
            report.installed_distributions.len()
        );
        Ok(report)
    }

    fn available_versions(&self, name_or_origin: &str) -> Result<Vec<DistVersion>, InstallError> {
        if name_or_origin.contains("://") {
            // VCS and local sources: build once and read the version back
            let venv = self.create(name_or_origin)?;
            let before = self.list(&venv, name_or_origin)?;
            self.pip(
                &venv,
                name_or_origin,
                &self.install_args(&["--no-deps"], &[name_or_origin.to_string()]),
            )?;
            let after = self.list(&venv, name_or_origin)?;
            return added(&before, &after)
                .into_iter()
                .map(|(_, version)| DistVersion::parse(&version).map_err(|e| InstallError::Metadata(e.to_string())))
                .collect();
        }

        let output = self
            .runner
            .run_checked(
                &self.python,
                &["-m", "pip", "index", "versions", "--pre", name_or_origin],
                None,
            )
            .map_err(|e| InstallError::from_runner(name_or_origin, e))?;

        let versions: Vec<DistVersion> = parse_index_versions(&output.stdout)
            .iter()
            .filter_map(|v| DistVersion::parse(v).ok())
            .collect();
        if versions.is_empty() {
            return Err(InstallError::NoVersions(name_or_origin.to_string()));
        }
        Ok(versions)
    }

    fn package_types(&self, dist: &DistributionRef) -> Result<BTreeSet<PackageType>, InstallError> {
        let target = dist.install_target();
        let mut types = BTreeSet::new();
        for policy in ["--only-binary=:all:", "--no-binary=:all:"] {
            match self.download(&target, policy) {
                Ok(files) => types.extend(files.iter().filter_map(|f| classify_download(f))),
                Err(InstallError::CommandFailed { .. }) => {
                    debug!("Nothing to download for {} with {}", target, policy);
                }
                Err(e) => return Err(e),
            }
        }
        debug!("Package types of {}: {:?}", dist, types);
        Ok(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_added_diff() {
        let before = map(&[("pip", "24.0"), ("setuptools", "69.0")]);
        let after = map(&[("pip", "24.0"), ("setuptools", "69.0"), ("six", "1.16.0")]);
        assert_eq!(added(&before, &after), vec![("six".to_string(), "1.16.0".to_string())]);
        assert!(added(&after, &after).is_empty());
    }

    #[test]
    fn test_binary_policy() {
        let version = DistVersion::parse("1.0").unwrap();
        let sdist = DistributionRef::new("foo", version.clone());
        assert_eq!(binary_policy(&sdist), vec!["--no-binary", "foo"]);

        let wheel = sdist.clone().with_source_kind(SourceKind::Wheel);
        assert_eq!(binary_policy(&wheel), vec!["--only-binary", "foo"]);

        let local = DistributionRef::new("foo", version)
            .with_source_kind(SourceKind::Wheel)
            .with_origin("file:///tmp/foo-1.0-py3-none-any.whl");
        assert!(binary_policy(&local).is_empty());
    }

    #[test]
    fn test_read_imports_only_python_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/__init__.py"), "import numpy\n").unwrap();
        std::fs::write(dir.path().join("pkg/data.txt"), "import nothing\n").unwrap();

        let imports = read_imports(dir.path(), Path::new("pkg/__init__.py"));
        assert!(imports.contains("numpy"));
        assert!(read_imports(dir.path(), Path::new("pkg/data.txt")).is_empty());
        assert!(read_imports(dir.path(), Path::new("pkg/missing.py")).is_empty());
    }
}
