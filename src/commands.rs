// src/commands.rs
//! Command handlers for the pypi2pkg CLI

use crate::cli::{Cli, OutputFormat};
use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;
use pypi2pkg::builder::{PipWheelBuilder, RegexClassifier};
use pypi2pkg::conglomerate::NameListDetector;
use pypi2pkg::environment::VenvEnvironment;
use pypi2pkg::outdated::{OutdatedPackage, list_outdated, owned_outdated, update_names};
use pypi2pkg::packages::{NativeCatalog, PacmanCatalog, StaticCatalog, is_pacman_available};
use pypi2pkg::probe::{NoUncertainDeps, SourceGlobHeuristic, UncertainBuildDeps};
use pypi2pkg::{
    CommandRunner, Config, DescriptorKind, Interrupt, PackageType, ResolutionReport, Resolver,
    ResolverOptions, RootRequest, normalize_name,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Options of `pypi2pkg resolve` that override the configuration file
pub struct ResolveArgs {
    pub packages: Vec<String>,
    pub update: bool,
    pub ignore: Vec<String>,
    pub pre: bool,
    pub pkgrel: Option<u32>,
    pub prefix: Option<String>,
    pub conglomerates: Vec<String>,
    pub setup_requires: Vec<String>,
    pub no_probe: bool,
    pub pkgtypes: Vec<String>,
    pub no_deps: bool,
    pub jobs: usize,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
}

/// Apply command-line overrides to the loaded configuration
pub fn apply_overrides(config: &mut Config, args: &ResolveArgs) -> Result<()> {
    if args.pre {
        config.package.pre = true;
    }
    if let Some(pkgrel) = args.pkgrel {
        config.package.pkgrel = pkgrel;
    }
    if let Some(prefix) = &args.prefix {
        config.package.prefix = prefix.clone();
    }
    config.conglomerates.names.extend(args.conglomerates.iter().cloned());
    for requirement in &args.setup_requires {
        if !config.install.setup_requires.contains(requirement) {
            config.install.setup_requires.push(requirement.clone());
        }
    }
    if args.no_probe {
        config.probe.enabled = false;
    }
    if !args.pkgtypes.is_empty() {
        config.package.pkgtypes = args
            .pkgtypes
            .iter()
            .map(|t| t.parse::<PackageType>())
            .collect::<pypi2pkg::Result<Vec<_>>>()
            .context("Invalid --pkgtypes")?;
    }
    if args.no_deps {
        config.package.dependencies = false;
    }
    config.validate().context("Invalid configuration")?;
    Ok(())
}

fn build_catalog(config: &Config, runner: &CommandRunner) -> Result<Arc<dyn NativeCatalog>> {
    if config.catalog.use_pacman {
        if is_pacman_available() {
            let catalog =
                PacmanCatalog::detect(runner.clone(), &config.install.python, &config.package.prefix)
                    .context("Failed to set up the pacman catalog")?;
            return Ok(Arc::new(catalog));
        }
        warn!("pacman not found, only packages listed in [catalog] count as native");
    }
    Ok(Arc::new(
        StaticCatalog::from_config(&config.catalog).context("Invalid [catalog] entries")?,
    ))
}

/// Assemble a resolver with the shipped capability implementations
pub fn build_resolver(config: &Config, interrupt: Interrupt) -> Result<Resolver> {
    let runner = CommandRunner::new(config.install.timeout(), interrupt.clone());

    let catalog = build_catalog(config, &runner)?;
    let env = VenvEnvironment::new(runner.clone(), &config.install.python)
        .with_setup_requires(config.install.setup_requires.clone());
    let builder = PipWheelBuilder::new(runner.clone(), &config.install.python)
        .with_setup_requires(config.install.setup_requires.clone());
    let classifier = RegexClassifier::new(&config.probe.missing_tool_patterns)?;
    let heuristic: Arc<dyn UncertainBuildDeps> = if config.probe.enabled {
        Arc::new(SourceGlobHeuristic::new(
            runner,
            &config.install.python,
            config.probe.candidates.clone(),
        ))
    } else {
        Arc::new(NoUncertainDeps)
    };

    Ok(Resolver::new(catalog, Arc::new(env), Arc::new(builder))
        .with_options(ResolverOptions::from_config(config))
        .with_classifier(Arc::new(classifier))
        .with_detector(Arc::new(NameListDetector::new(&config.conglomerates.names)))
        .with_heuristic(heuristic)
        .with_interrupt(interrupt))
}

/// Resolve the requested distributions; returns whether every root succeeded
pub fn cmd_resolve(config_path: Option<&Path>, args: ResolveArgs) -> Result<bool> {
    let mut config = Config::load_or_default(config_path).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args)?;

    let packages = if args.update {
        let names = find_outdated(&config)
            .map(|outdated| update_names(&outdated, &args.ignore))?;
        if names.is_empty() {
            println!("Nothing to update");
            return Ok(true);
        }
        names
    } else {
        args.packages.clone()
    };

    let roots = packages
        .iter()
        .map(|spec| RootRequest::parse(spec).with_context(|| format!("Invalid package spec '{}'", spec)))
        .collect::<Result<Vec<_>>>()?;

    let resolver = build_resolver(&config, Interrupt::new())?;
    info!("Resolving {} distribution(s)", roots.len());

    let report = if args.jobs > 1 && roots.len() > 1 {
        resolver.run_each(&roots, args.jobs)?
    } else {
        resolver.run(&roots)?
    };

    let rendered = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&report)? + "\n",
        OutputFormat::Summary => render_summary(&report),
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => {
            std::io::stdout().write_all(rendered.as_bytes())?;
        }
    }

    Ok(report.is_success())
}

/// Outdated distributions owned by native packages
fn find_outdated(config: &Config) -> Result<Vec<OutdatedPackage>> {
    let runner = CommandRunner::new(config.install.timeout(), Interrupt::new());
    let catalog = build_catalog(config, &runner)?;
    let listings = list_outdated(&runner, &config.install.python)
        .context("Failed to list outdated distributions")?;
    Ok(owned_outdated(listings, catalog.as_ref())?)
}

/// List outdated natively packaged distributions
pub fn cmd_outdated(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = Config::load_or_default(config_path).context("Failed to load configuration")?;
    let outdated = find_outdated(&config)?;
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&outdated)? + "\n",
        OutputFormat::Summary => render_outdated(&outdated),
    };
    std::io::stdout().write_all(rendered.as_bytes())?;
    Ok(())
}

/// Outdated distributions grouped by the native package owning them
pub fn render_outdated(outdated: &[OutdatedPackage]) -> String {
    let mut out = String::new();
    let mut owner: Option<&str> = None;
    for package in outdated {
        if owner != Some(package.owner.provider_name.as_str()) {
            owner = Some(package.owner.provider_name.as_str());
            out.push_str(&format!(
                "{} {}\n",
                package.owner.provider_name, package.owner.installed_version
            ));
        }
        out.push_str(&format!(
            "\t{} {} -> {}\n",
            package.name, package.installed_version, package.latest_version
        ));
    }
    out
}

/// Human-readable rendering of a report
pub fn render_summary(report: &ResolutionReport) -> String {
    let mut out = String::new();

    out.push_str("Roots:\n");
    for root in &report.roots {
        let status = match (&root.error, root.state) {
            (Some(error), _) => format!("error: {}", error),
            (None, Some(state)) => state.to_string(),
            (None, None) => "unknown".to_string(),
        };
        out.push_str(&format!("  {} [{}]\n", root.request, status));
    }

    out.push_str(&format!("\nPackages to build ({}):\n", report.descriptors.len()));
    for descriptor in &report.descriptors {
        let role = match &descriptor.kind {
            DescriptorKind::Standard => String::new(),
            DescriptorKind::Component { aggregate } => format!(" (component of {})", aggregate),
            DescriptorKind::Aggregate { .. } => " (aggregate)".to_string(),
        };
        out.push_str(&format!(
            "  {} {}{}\n",
            descriptor.name,
            descriptor.native_version(),
            role
        ));
        if !descriptor.runtime_depends.is_empty() {
            let deps: Vec<&str> = descriptor.runtime_depends.iter().map(String::as_str).collect();
            out.push_str(&format!("    depends: {}\n", deps.join(" ")));
        }
        if !descriptor.build_time_depends.is_empty() {
            let deps: Vec<&str> = descriptor.build_time_depends.iter().map(String::as_str).collect();
            out.push_str(&format!("    makedepends: {}\n", deps.join(" ")));
        }
        if !descriptor.conflicts.is_empty() {
            let conflicts: Vec<String> = descriptor.conflicts.iter().map(|c| c.to_string()).collect();
            out.push_str(&format!("    conflicts: {}\n", conflicts.join(" ")));
        }
        if !descriptor.provides.is_empty() {
            let provides: Vec<&str> = descriptor.provides.iter().map(String::as_str).collect();
            out.push_str(&format!("    provides: {}\n", provides.join(" ")));
        }
    }

    let satisfied: Vec<String> = report
        .nodes
        .iter()
        .filter_map(|n| {
            n.satisfied_by()
                .map(|e| format!("{} ({} {})", normalize_name(n.name()), e.provider_name, e.installed_version))
        })
        .collect();
    if !satisfied.is_empty() {
        out.push_str(&format!("\nAlready provided ({}):\n", satisfied.len()));
        for line in satisfied {
            out.push_str(&format!("  {}\n", line));
        }
    }

    let warnings: Vec<String> = report.all_warnings().map(|w| w.to_string()).collect();
    if !warnings.is_empty() {
        out.push_str(&format!("\nWarnings ({}):\n", warnings.len()));
        for warning in warnings {
            out.push_str(&format!("  {}\n", warning));
        }
    }

    out
}

/// Print a completion script for `shell`
pub fn cmd_completions(shell: Shell) -> Result<()> {
    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "pypi2pkg", &mut std::io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ResolveArgs {
        ResolveArgs {
            packages: vec!["foo".into()],
            update: false,
            ignore: Vec::new(),
            pre: true,
            pkgrel: Some(2),
            prefix: None,
            conglomerates: vec!["bigpkg".into()],
            setup_requires: vec!["setuptools-scm".into()],
            no_probe: true,
            pkgtypes: vec!["sdist".into()],
            no_deps: true,
            jobs: 1,
            format: OutputFormat::Summary,
            output: None,
        }
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        apply_overrides(&mut config, &args()).unwrap();
        assert!(config.package.pre);
        assert_eq!(config.package.pkgrel, 2);
        assert_eq!(config.package.prefix, "python-");
        assert_eq!(config.conglomerates.names, vec!["bigpkg".to_string()]);
        assert_eq!(config.install.setup_requires, vec!["setuptools-scm".to_string()]);
        assert!(!config.probe.enabled);
        assert_eq!(config.package.pkgtypes, vec![PackageType::Sdist]);
        assert!(!config.package.dependencies);
    }

    #[test]
    fn test_apply_overrides_rejects_zero_pkgrel() {
        let mut config = Config::default();
        let mut bad = args();
        bad.pkgrel = Some(0);
        assert!(apply_overrides(&mut config, &bad).is_err());

        let mut bad = args();
        bad.pkgtypes = vec!["egg".into()];
        assert!(apply_overrides(&mut Config::default(), &bad).is_err());
    }

    #[test]
    fn test_render_outdated_groups_by_owner() {
        use pypi2pkg::packages::{CatalogEntry, CatalogOrigin};
        use pypi2pkg::NativeVersion;

        let owner = CatalogEntry {
            provider_name: "python-jinja".to_string(),
            installed_version: NativeVersion::parse("3.1.2-1").unwrap(),
            origin: CatalogOrigin::Installed,
        };
        let package = |name: &str| OutdatedPackage {
            name: name.to_string(),
            installed_version: "3.1.2".to_string(),
            latest_version: "3.1.4".to_string(),
            owner: owner.clone(),
        };
        let rendered = render_outdated(&[package("jinja2"), package("markupsafe")]);
        assert_eq!(
            rendered,
            "python-jinja 3.1.2-1\n\tjinja2 3.1.2 -> 3.1.4\n\tmarkupsafe 3.1.2 -> 3.1.4\n"
        );
        assert!(render_outdated(&[]).is_empty());
    }

    #[test]
    fn test_render_summary_empty() {
        let summary = render_summary(&ResolutionReport::default());
        assert!(summary.contains("Packages to build (0)"));
        assert!(!summary.contains("Warnings"));
    }
}
