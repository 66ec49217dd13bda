// src/packages/pacman_query.rs

//! Native catalog backed by pacman and pkgfile
//!
//! A distribution counts as natively provided when
//! 1. an installed package owns its `*.dist-info`/`*.egg-info` directory in
//!    the system site-packages (handles non-standard package names), or
//! 2. an installed package is named `<prefix><name>`, or
//! 3. a repository package ships that metadata directory (via `pkgfile`).
//!
//! Component packages this tool generated (anything containing `--`) are
//! never reported, so they cannot mask a real upstream distribution.

use crate::descriptor::{COMPONENT_SEPARATOR, VCS_SUFFIX};
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::packages::traits::{CatalogEntry, CatalogOrigin, NativeCatalog};
use crate::version::{NativeVersion, to_wheel_name};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Catalog querying the local pacman database
#[derive(Debug, Clone)]
pub struct PacmanCatalog {
    runner: CommandRunner,
    prefix: String,
    site_packages: PathBuf,
    use_pkgfile: bool,
}

impl PacmanCatalog {
    pub fn new(runner: CommandRunner, prefix: &str, site_packages: PathBuf) -> Self {
        let use_pkgfile = which::which("pkgfile").is_ok();
        if !use_pkgfile {
            warn!("pkgfile not found, repository packages will not be considered");
        }
        Self {
            runner,
            prefix: prefix.to_string(),
            site_packages,
            use_pkgfile,
        }
    }

    /// Create a catalog for the system interpreter's site-packages
    pub fn detect(runner: CommandRunner, python: &str, prefix: &str) -> Result<Self> {
        if !is_pacman_available() {
            return Err(Error::ToolNotFound("pacman".to_string()));
        }
        let output = runner.run_checked(
            python,
            &["-c", "import sysconfig; print(sysconfig.get_paths()['purelib'])"],
            None,
        )?;
        let site_packages = PathBuf::from(output.stdout.trim());
        debug!("System site-packages: {}", site_packages.display());
        Ok(Self::new(runner, prefix, site_packages))
    }

    /// Installed package owning the distribution's metadata directory
    fn find_installed_by_metadata(&self, name: &str) -> Result<Option<(String, NativeVersion)>> {
        for dir in metadata_dirs(&self.site_packages, name)? {
            let owners = self.query_file_owner(&dir)?;
            match owners.as_slice() {
                [] => continue,
                [single] => return Ok(Some(single.clone())),
                _ => {
                    return Err(Error::CatalogError(format!(
                        "{} is owned by several packages: {}",
                        dir.display(),
                        owners.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(", ")
                    )));
                }
            }
        }
        Ok(None)
    }

    /// Installed package named after the distribution
    fn find_installed_by_name(&self, name: &str) -> Result<Option<(String, NativeVersion)>> {
        let pkgname = format!("{}{}", self.prefix, name);
        let output = self.runner.run("pacman", &["-Q", &pkgname], None)?;
        if !output.success() {
            return Ok(None);
        }
        parse_name_version(output.stdout.trim()).map(Some)
    }

    /// Repository package shipping the distribution's metadata directory
    fn find_in_repositories(&self, name: &str) -> Result<Option<(String, NativeVersion)>> {
        if !self.use_pkgfile {
            return Ok(None);
        }

        let pattern = format!(
            "^{}/{}-[^/]*\\.(dist|egg)-info",
            regex::escape(&self.site_packages.to_string_lossy()),
            to_wheel_name(name)
        );
        let output = self.runner.run("pkgfile", &["-riv", &pattern], None)?;
        if !output.success() {
            return Ok(None);
        }

        let mut candidates: Vec<&str> = output
            .stdout
            .lines()
            .filter_map(|line| line.split('\t').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        candidates.dedup();

        match candidates.as_slice() {
            [] => Ok(None),
            [single] => {
                // "extra/python-numpy 1.26.4-1"
                let (qualified, version) = parse_name_version(single)?;
                let pkgname = qualified.rsplit('/').next().unwrap_or(&qualified).to_string();
                Ok(Some((pkgname, version)))
            }
            _ => Err(Error::CatalogError(format!(
                "Multiple candidates for {}: {}",
                name,
                candidates.join(", ")
            ))),
        }
    }

    /// Query which package owns a path, with its version
    fn query_file_owner(&self, path: &Path) -> Result<Vec<(String, NativeVersion)>> {
        let path_str = path.to_string_lossy();
        let output = self.runner.run("pacman", &["-Qo", &path_str], None)?;
        if !output.success() {
            return Ok(Vec::new());
        }

        // Output format: "/path/to/file is owned by package_name version"
        output
            .stdout
            .lines()
            .filter_map(|line| {
                line.find(" is owned by ")
                    .map(|pos| &line[pos + " is owned by ".len()..])
            })
            .map(parse_name_version)
            .collect()
    }

    /// `-git` packages stand in for their base name only if they conflict with it
    fn resolve_vcs_provider(&self, pkgname: &str) -> Result<String> {
        let Some(base) = pkgname.strip_suffix(VCS_SUFFIX) else {
            return Ok(pkgname.to_string());
        };

        let output = self.runner.run("pacman", &["-Qi", pkgname], None)?;
        let conflicts = output
            .stdout
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(key, _)| key.trim() == "Conflicts With")
            .map(|(_, value)| value.split_whitespace().any(|c| c == base))
            .unwrap_or(false);

        if conflicts {
            Ok(base.to_string())
        } else {
            Err(Error::CatalogError(format!(
                "Found installed package {} which does NOT conflict with {}. Please uninstall it first.",
                pkgname, base
            )))
        }
    }
}

impl NativeCatalog for PacmanCatalog {
    fn lookup(&self, name: &str) -> Result<Option<CatalogEntry>> {
        debug!("Looking up native provider for {}", name);

        let installed = match self.find_installed_by_metadata(name)? {
            Some(found) => Some(found),
            None => self.find_installed_by_name(name)?,
        };

        if let Some((pkgname, version)) = installed {
            if pkgname.contains(COMPONENT_SEPARATOR) {
                debug!("Ignoring component package {}", pkgname);
            } else {
                let provider_name = self.resolve_vcs_provider(&pkgname)?;
                return Ok(Some(CatalogEntry {
                    provider_name,
                    installed_version: version,
                    origin: CatalogOrigin::Installed,
                }));
            }
        }

        Ok(self
            .find_in_repositories(name)?
            .map(|(provider_name, installed_version)| CatalogEntry {
                provider_name,
                installed_version,
                origin: CatalogOrigin::Repository,
            }))
    }
}

/// Metadata directories for `name` in a site-packages directory (case-insensitive)
fn metadata_dirs(site_packages: &Path, name: &str) -> Result<Vec<PathBuf>> {
    let wanted = format!("{}-", to_wheel_name(name)).to_lowercase();
    let entries = match std::fs::read_dir(site_packages) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .is_some_and(|n| {
                    n.starts_with(&wanted) && (n.ends_with(".dist-info") || n.ends_with(".egg-info"))
                })
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Parse "name version" as printed by `pacman -Q`
fn parse_name_version(line: &str) -> Result<(String, NativeVersion)> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(name), Some(version)) => Ok((name.to_string(), NativeVersion::parse(version)?)),
        _ => Err(Error::ParseError(format!(
            "Malformed package manager output: '{}'",
            line
        ))),
    }
}

/// Check if pacman is available on this system
pub fn is_pacman_available() -> bool {
    which::which("pacman").is_ok()
}
