// src/outdated.rs

//! Natively packaged distributions with newer upstream releases
//!
//! `pip list --outdated` on the system interpreter names the candidates.
//! Only distributions in the system site-packages that an installed native
//! package owns are kept, and only when the native version really lags
//! behind: some distributions misreport their version to pip.

use crate::environment::{OutdatedListing, parse_pip_outdated};
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::packages::{CatalogEntry, CatalogOrigin, NativeCatalog};
use crate::version::{DistVersion, normalize_name};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

const SITE_PATHS_SCRIPT: &str =
    "import sysconfig; print(sysconfig.get_path('purelib')); print(sysconfig.get_path('platlib'))";

/// A native package whose distribution has a newer upstream release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutdatedPackage {
    /// Normalized distribution name
    pub name: String,
    pub installed_version: String,
    pub latest_version: String,
    pub owner: CatalogEntry,
}

/// Outdated distributions installed in the system site-packages of `python`
pub fn list_outdated(runner: &CommandRunner, python: &str) -> Result<Vec<OutdatedListing>> {
    let sites = runner.run_checked(python, &["-c", SITE_PATHS_SCRIPT], None)?;
    let sites: BTreeSet<&str> = sites
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut args = vec!["-m", "pip", "list", "--outdated", "--format=json"];
    for site in &sites {
        args.extend(["--path", *site]);
    }
    debug!("Listing outdated distributions in {:?}", sites);

    let output = runner.run_checked(python, &args, None)?;
    parse_pip_outdated(&output.stdout)
        .map_err(|e| Error::ParseError(format!("pip list --outdated: {}", e)))
}

/// Whether the native package really is older than `latest`
fn lags_behind(owner: &CatalogEntry, latest: &str) -> bool {
    let installed = &owner.installed_version.version;
    match (DistVersion::parse(installed), DistVersion::parse(latest)) {
        (Ok(installed), Ok(latest)) => installed.cmp(&latest) == Ordering::Less,
        _ => installed != latest,
    }
}

/// Keep the listings owned by an installed native package that lags behind
pub fn owned_outdated(
    listings: Vec<OutdatedListing>,
    catalog: &dyn NativeCatalog,
) -> Result<Vec<OutdatedPackage>> {
    let mut outdated = Vec::new();
    for listing in listings {
        let owner = match catalog.lookup(&listing.name)? {
            Some(owner) if owner.origin == CatalogOrigin::Installed => owner,
            _ => {
                debug!("{} is outdated but not natively installed", listing.name);
                continue;
            }
        };
        if !lags_behind(&owner, &listing.latest_version) {
            warn!(
                "pip thinks that {} is outdated, but the installed version is actually {}, and up-to-date.",
                listing.name, owner.installed_version
            );
            continue;
        }
        outdated.push(OutdatedPackage {
            name: normalize_name(&listing.name),
            installed_version: listing.version,
            latest_version: listing.latest_version,
            owner,
        });
    }

    outdated.sort_by(|a, b| {
        a.owner
            .provider_name
            .cmp(&b.owner.provider_name)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(outdated)
}

/// Names to update, minus the ignored ones
pub fn update_names(outdated: &[OutdatedPackage], ignore: &[String]) -> Vec<String> {
    let ignore: BTreeSet<String> = ignore.iter().map(|n| normalize_name(n)).collect();
    let names: BTreeSet<String> = outdated.iter().map(|p| p.name.clone()).collect();

    let ignored: Vec<&str> = names.intersection(&ignore).map(String::as_str).collect();
    if !ignored.is_empty() {
        info!("Ignoring update of {}", ignored.join(", "));
    }
    names.difference(&ignore).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::StaticCatalog;
    use crate::version::NativeVersion;

    fn listing(name: &str, version: &str, latest: &str) -> OutdatedListing {
        OutdatedListing {
            name: name.to_string(),
            version: version.to_string(),
            latest_version: latest.to_string(),
            latest_filetype: "wheel".to_string(),
        }
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with("six", "python-six", NativeVersion::parse("1.15.0-3").unwrap())
            .with("pyyaml", "python-yaml", NativeVersion::parse("6.0.1-2").unwrap())
            .with("jinja2", "python-jinja", NativeVersion::parse("3.1.2-1").unwrap())
    }

    #[test]
    fn test_owned_outdated_filters_and_sorts() {
        let listings = vec![
            listing("six", "1.15.0", "1.16.0"),
            listing("requests", "2.0.0", "2.32.0"),
            // Misreported by pip: the native package is already current
            listing("pyyaml", "6.0", "6.0.1"),
            listing("jinja2", "3.1.2", "3.1.4"),
        ];
        let outdated = owned_outdated(listings, &catalog()).unwrap();

        let names: Vec<&str> = outdated.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["jinja2", "six"]);
        assert_eq!(outdated[0].owner.provider_name, "python-jinja");
        assert_eq!(outdated[1].latest_version, "1.16.0");
    }

    #[test]
    fn test_update_names_honors_ignore() {
        let listings = vec![
            listing("six", "1.15.0", "1.16.0"),
            listing("jinja2", "3.1.2", "3.1.4"),
        ];
        let outdated = owned_outdated(listings, &catalog()).unwrap();

        assert_eq!(update_names(&outdated, &[]), vec!["jinja2", "six"]);
        assert_eq!(update_names(&outdated, &["Jinja2".to_string()]), vec!["six"]);
    }

    #[test]
    fn test_lags_behind_unparseable_versions() {
        let owner = CatalogEntry {
            provider_name: "python-odd".to_string(),
            installed_version: NativeVersion::parse("r1234-1").unwrap(),
            origin: CatalogOrigin::Installed,
        };
        assert!(lags_behind(&owner, "r1235"));
        assert!(!lags_behind(&owner, "r1234"));
    }
}
