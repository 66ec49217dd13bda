// src/resolver/mod.rs

//! Dependency resolution and synthesis
//!
//! A [`Resolver`] holds the capabilities (native catalog, environment,
//! builder, and the pluggable detector/heuristic/classifier) and the
//! options. Each call to [`Resolver::run`] is one resolution pass with its
//! own cache: every distinct distribution gets exactly one
//! [`ResolutionNode`] and at most one trial install.
//!
//! Traversal is depth-first over an explicit work-list. A dependency that
//! is already on the current path closes a cycle; it is treated as
//! satisfied and recorded as a warning on the dependent. Only one version
//! per distribution name is kept per pass (the highest seen), and
//! dependency edges refer to names.

mod conflict;
mod graph;
mod node;
mod plan;

pub use conflict::Warning;
pub use graph::DependencyGraph;
pub use node::{
    BundledComponent, FailureKind, Necessity, NodeFailure, NodeState, ResolutionNode,
};
pub use plan::{ResolutionReport, RootOutcome};

use crate::builder::{Builder, FailureClassifier, RegexClassifier};
use crate::config::{Config, ProbeCandidate};
use crate::conglomerate::{ConglomerateDetector, NameListDetector, partition};
use crate::descriptor::Naming;
use crate::distribution::{DistributionRef, PackageType, Requirement, RootRequest, SourceKind};
use crate::environment::{Environment, TrialInstallReport, TrialInstaller};
use crate::error::{Error, Result};
use crate::exec::Interrupt;
use crate::packages::NativeCatalog;
use crate::probe::{BuildProber, NoUncertainDeps, UncertainBuildDeps};
use crate::version::normalize_name;
use plan::Synthesizer;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Knobs of a resolution pass
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub naming: Naming,
    /// Release number of synthesized descriptors
    pub pkgrel: u32,
    /// Consider pre-releases when choosing versions
    pub pre: bool,
    /// Preference order of published file kinds
    pub pkgtypes: Vec<PackageType>,
    /// Synthesize descriptors for dependencies, not only roots
    pub dependencies: bool,
    pub fallback_flags: Vec<String>,
    pub setup_requires: Vec<String>,
    /// Probe uncertain build-time dependencies
    pub probe: bool,
    pub candidates: Vec<ProbeCandidate>,
}

impl ResolverOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            naming: Naming::new(&config.package.prefix),
            pkgrel: config.package.pkgrel,
            pre: config.package.pre,
            pkgtypes: config.package.pkgtypes.clone(),
            dependencies: config.package.dependencies,
            fallback_flags: config.install.fallback_flags.clone(),
            setup_requires: config.install.setup_requires.clone(),
            probe: config.probe.enabled,
            candidates: config.probe.candidates.clone(),
        }
    }
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// The resolution-and-synthesis engine
pub struct Resolver {
    catalog: Arc<dyn NativeCatalog>,
    env: Arc<dyn Environment>,
    builder: Arc<dyn Builder>,
    classifier: Arc<dyn FailureClassifier>,
    detector: Arc<dyn ConglomerateDetector>,
    heuristic: Arc<dyn UncertainBuildDeps>,
    options: ResolverOptions,
    interrupt: Interrupt,
}

impl Resolver {
    pub fn new(
        catalog: Arc<dyn NativeCatalog>,
        env: Arc<dyn Environment>,
        builder: Arc<dyn Builder>,
    ) -> Self {
        Self {
            catalog,
            env,
            builder,
            classifier: Arc::new(RegexClassifier::default()),
            detector: Arc::new(NameListDetector::default()),
            heuristic: Arc::new(NoUncertainDeps),
            options: ResolverOptions::default(),
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn ConglomerateDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_heuristic(mut self, heuristic: Arc<dyn UncertainBuildDeps>) -> Self {
        self.heuristic = heuristic;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Resolve all roots in one pass
    ///
    /// Errors are reserved for broken internal invariants; resolution
    /// failures are reported per node in the returned report.
    pub fn run(&self, roots: &[RootRequest]) -> Result<ResolutionReport> {
        let mut pass = ResolutionPass::new(self);
        for (request, spec) in roots.iter().map(|r| (r, describe_request(r))) {
            pass.resolve_root(request, &spec)?;
        }
        pass.finish()
    }

    /// Resolve every root in its own pass, up to `jobs` passes at a time
    pub fn run_each(&self, roots: &[RootRequest], jobs: usize) -> Result<ResolutionReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create thread pool: {}", e)))?;

        let reports = pool.install(|| {
            roots
                .par_iter()
                .map(|root| self.run(std::slice::from_ref(root)))
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(ResolutionReport::merge(reports))
    }
}

/// A dependency still to be visited
#[derive(Debug, Clone)]
enum DepRequest {
    /// A concrete version observed in a trial install
    Pinned(DistributionRef),
    /// A name whose version is chosen on demand (fallback install flags)
    Unpinned(String),
}

/// Work-list entry: a node whose dependencies are being visited
struct Frame {
    name: String,
    deps: Vec<DepRequest>,
    next: usize,
}

/// State of a single resolution pass
struct ResolutionPass<'r> {
    resolver: &'r Resolver,
    installer: TrialInstaller<'r>,
    prober: BuildProber<'r>,
    nodes: BTreeMap<String, ResolutionNode>,
    reports: HashMap<String, TrialInstallReport>,
    roots: Vec<RootOutcome>,
    warnings: Vec<Warning>,
}

impl<'r> ResolutionPass<'r> {
    fn new(resolver: &'r Resolver) -> Self {
        Self {
            resolver,
            installer: TrialInstaller::new(
                resolver.env.as_ref(),
                resolver.options.fallback_flags.clone(),
                resolver.interrupt.clone(),
            ),
            prober: BuildProber::new(resolver.builder.as_ref(), resolver.classifier.as_ref()),
            nodes: BTreeMap::new(),
            reports: HashMap::new(),
            roots: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn interrupted(&self) -> bool {
        self.resolver.interrupt.is_raised()
    }

    fn resolve_root(&mut self, request: &RootRequest, spec: &str) -> Result<()> {
        info!("Resolving {}", spec);
        let dist = match self.select_version(request) {
            Ok(dist) => dist,
            Err(e) => {
                warn!("Cannot resolve {}: {}", spec, e);
                self.roots.push(RootOutcome::failed(spec, e.to_string()));
                return Ok(());
            }
        };
        self.roots.push(RootOutcome::resolved(spec, &dist.name));
        self.traverse(dist)
    }

    /// Pick the concrete version a root request resolves to
    fn select_version(&self, request: &RootRequest) -> Result<DistributionRef> {
        if let Some(version) = &request.version {
            return Ok(request.to_ref(version.clone()));
        }
        if self.interrupted() {
            return Err(Error::Interrupted);
        }

        let query = request.origin.as_deref().unwrap_or(&request.name);
        let versions = self
            .resolver
            .env
            .available_versions(query)
            .map_err(|e| Error::ResolutionError(e.to_string()))?;

        // VCS and local sources build exactly one version
        if request.origin.is_some() {
            return versions
                .into_iter()
                .max()
                .map(|v| request.to_ref(v))
                .ok_or_else(|| Error::NotFoundError(format!("no version for {}", query)));
        }

        let any = !versions.is_empty();
        let best = versions
            .into_iter()
            .filter(|v| self.resolver.options.pre || !v.is_prerelease())
            .max();
        match best {
            Some(version) => Ok(request.to_ref(version)),
            None if any => Err(Error::NotFoundError(format!(
                "only pre-releases available for {} (enable pre-releases to use them)",
                request.name
            ))),
            None => Err(Error::NotFoundError(format!("no versions of {}", request.name))),
        }
    }

    /// First published file kind of `dist` in preference order
    fn select_package_type(&self, dist: &DistributionRef) -> Result<PackageType> {
        let preference = &self.resolver.options.pkgtypes;
        if preference == &[PackageType::Sdist] {
            return Ok(PackageType::Sdist);
        }
        if self.interrupted() {
            return Err(Error::Interrupted);
        }

        let available = self.resolver.env.package_types(dist).map_err(|e| {
            if e.is_interrupted() {
                Error::Interrupted
            } else {
                Error::ResolutionError(e.to_string())
            }
        })?;
        preference
            .iter()
            .copied()
            .find(|t| available.contains(t))
            .ok_or_else(|| {
                let wanted: Vec<&str> = preference.iter().map(PackageType::as_str).collect();
                let found: Vec<&str> = available.iter().map(PackageType::as_str).collect();
                Error::NotFoundError(format!(
                    "{} publishes no {} (found: {})",
                    dist,
                    wanted.join(", "),
                    if found.is_empty() { "nothing".to_string() } else { found.join(", ") }
                ))
            })
    }

    /// Depth-first traversal from one root over an explicit work-list
    fn traverse(&mut self, root: DistributionRef) -> Result<()> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut on_path: HashSet<String> = HashSet::new();

        if let Some(frame) = self.visit(root, None, &on_path)? {
            on_path.insert(frame.name.clone());
            stack.push(frame);
        }

        while let Some(top) = stack.last_mut() {
            if top.next >= top.deps.len() {
                let name = top.name.clone();
                stack.pop();
                on_path.remove(&name);
                self.complete(&name)?;
                continue;
            }

            let request = top.deps[top.next].clone();
            top.next += 1;
            let parent = top.name.clone();

            let Some(dist) = self.dependency_ref(&parent, request) else {
                continue;
            };
            if let Some(frame) = self.visit(dist, Some(&parent), &on_path)? {
                on_path.insert(frame.name.clone());
                stack.push(frame);
            }
        }
        Ok(())
    }

    /// Concrete ref for a dependency request, if it needs visiting
    fn dependency_ref(&mut self, parent: &str, request: DepRequest) -> Option<DistributionRef> {
        match request {
            DepRequest::Pinned(dist) => Some(dist),
            DepRequest::Unpinned(name) => {
                if self.nodes.contains_key(&name) {
                    return None;
                }
                let request = RootRequest {
                    name: name.clone(),
                    version: None,
                    source_kind: SourceKind::Sdist,
                    origin: None,
                };
                match self.select_version(&request) {
                    Ok(dist) => Some(dist),
                    Err(e) => {
                        warn!("Cannot resolve {} (needed by {}): {}", name, parent, e);
                        if let Some(node) = self.nodes.get_mut(parent) {
                            node.warnings.push(Warning::DependencyFailed {
                                dependent: node.dist.to_string(),
                                dependency: name,
                                reason: e.to_string(),
                            });
                        }
                        None
                    }
                }
            }
        }
    }

    /// Create and expand the node for `dist`
    ///
    /// Returns a frame when the node's dependencies still need visiting.
    fn visit(
        &mut self,
        dist: DistributionRef,
        dependent: Option<&str>,
        on_path: &HashSet<String>,
    ) -> Result<Option<Frame>> {
        if let Some(existing) = self.nodes.get(&dist.name) {
            let existing_version = existing.dist.version.clone();

            if on_path.contains(&dist.name) {
                if let Some(parent) = dependent.and_then(|p| self.nodes.get_mut(p)) {
                    debug!("Cycle: {} -> {}", parent.dist, dist.name);
                    parent.back_edges.insert(dist.name.clone());
                    parent.warnings.push(Warning::CycleDetected {
                        dependent: parent.dist.to_string(),
                        dependency: dist.name.clone(),
                    });
                }
                return Ok(None);
            }

            match dist.version.cmp(&existing_version) {
                Ordering::Equal => {
                    debug!("{} already resolved in this pass", dist);
                    return Ok(None);
                }
                Ordering::Less => {
                    debug!("Keeping {} {} over {}", dist.name, existing_version, dist.version);
                    self.skipped(&dist.name, &existing_version.to_string(), &dist.version.to_string());
                    return Ok(None);
                }
                Ordering::Greater => {
                    info!("Superseding {} {} with {}", dist.name, existing_version, dist.version);
                    self.nodes.remove(&dist.name);
                    self.reports.remove(&dist.name);
                    self.skipped(&dist.name, &dist.version.to_string(), &existing_version.to_string());
                }
            }
        }

        let name = dist.name.clone();
        let mut node = ResolutionNode::new(dist);
        let frame = self.expand(&mut node)?;
        self.nodes.insert(name, node);
        Ok(frame)
    }

    fn skipped(&mut self, name: &str, kept: &str, skipped: &str) {
        let warning = Warning::VersionSkipped {
            name: name.to_string(),
            kept: kept.to_string(),
            skipped: skipped.to_string(),
        };
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Native check and trial install of a fresh node
    fn expand(&mut self, node: &mut ResolutionNode) -> Result<Option<Frame>> {
        node.transition(NodeState::CheckingNative)?;
        if self.interrupted() {
            node.fail(FailureKind::Interrupted, "interrupted")?;
            return Ok(None);
        }

        match self.resolver.catalog.lookup(node.name()) {
            Ok(Some(entry)) => {
                info!(
                    "{} is provided by {} {}",
                    node.dist, entry.provider_name, entry.installed_version
                );
                node.set_satisfied(entry)?;
                node.transition(NodeState::Satisfied)?;
                return Ok(None);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Native lookup of {} failed: {}", node.dist, e);
                node.fail(FailureKind::Catalog, e.to_string())?;
                return Ok(None);
            }
        }

        if node.dist.origin.is_none() {
            match self.select_package_type(&node.dist) {
                Ok(package_type) => {
                    debug!("Packaging {} from its {}", node.dist, package_type);
                    node.dist.source_kind = package_type.source_kind();
                }
                Err(Error::Interrupted) => {
                    node.fail(FailureKind::Interrupted, "interrupted")?;
                    return Ok(None);
                }
                Err(e) => {
                    warn!("No usable distribution of {}: {}", node.dist, e);
                    node.fail(FailureKind::Install, e.to_string())?;
                    return Ok(None);
                }
            }
        }

        node.transition(NodeState::Installing)?;
        let outcome = match self.installer.install(&node.dist) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Trial install of {} failed: {}", node.dist, e);
                let kind = if e.is_interrupted() {
                    FailureKind::Interrupted
                } else {
                    FailureKind::Install
                };
                node.fail(kind, e.to_string())?;
                return Ok(None);
            }
        };

        let observed = outcome.report.observed(&node.dist);
        record_requirement_diff(node, &outcome.report.declared_requirements, &observed);

        let own_name = node.name().to_string();
        node.declared_requirements = outcome.report.declared_requirements.clone();
        node.install_flags = outcome
            .install_flags
            .iter()
            .map(|f| normalize_name(f))
            .filter(|f| *f != own_name)
            .collect();

        let mut deps: Vec<DepRequest> = observed.iter().cloned().map(DepRequest::Pinned).collect();
        deps.extend(
            node.install_flags
                .iter()
                .filter(|f| !observed.iter().any(|o| &o.name == *f))
                .cloned()
                .map(DepRequest::Unpinned),
        );
        node.edges = deps
            .iter()
            .map(|d| match d {
                DepRequest::Pinned(dist) => dist.name.clone(),
                DepRequest::Unpinned(name) => name.clone(),
            })
            .collect();

        node.set_observed(observed)?;
        node.transition(NodeState::Resolved)?;
        self.reports.insert(own_name.clone(), outcome.report);

        Ok(Some(Frame {
            name: own_name,
            deps,
            next: 0,
        }))
    }

    /// Post-order step: probe build dependencies, then split or finalize
    fn complete(&mut self, name: &str) -> Result<()> {
        let Some(mut node) = self.nodes.remove(name) else {
            return Ok(());
        };
        let result = self.complete_node(&mut node);
        self.nodes.insert(name.to_string(), node);
        result
    }

    fn complete_node(&mut self, node: &mut ResolutionNode) -> Result<()> {
        if node.state() != NodeState::Resolved {
            return Ok(());
        }

        if !self.probe_build_deps(node)? {
            return Ok(());
        }

        if self.resolver.detector.is_conglomerate(&node.dist) {
            let plan = match (self.reports.get(node.name()), node.observed_requirements()) {
                (Some(report), Some(observed)) => partition(report, observed),
                _ => Default::default(),
            };

            if plan.is_splittable() {
                info!(
                    "Splitting {} into {} components",
                    node.dist,
                    plan.components.len()
                );
                node.transition(NodeState::Splitting)?;
                for requirement in &plan.unattributed {
                    node.warnings.push(Warning::ConglomerateAmbiguity {
                        node: node.dist.to_string(),
                        detail: format!(
                            "no component imports {}; it stays on the aggregate",
                            requirement
                        ),
                    });
                }
                node.unattributed = plan.unattributed;
                node.set_bundled(plan.components)?;
                node.transition(NodeState::Split)?;
                return Ok(());
            }

            warn!("{} is marked as a conglomerate but cannot be split", node.dist);
            node.warnings.push(Warning::ConglomerateAmbiguity {
                node: node.dist.to_string(),
                detail: format!(
                    "found {} top-level package(s), packaging it whole",
                    plan.components.len()
                ),
            });
        }

        node.transition(NodeState::Final)?;
        Ok(())
    }

    /// Settle uncertain build dependencies; false when the node failed
    fn probe_build_deps(&mut self, node: &mut ResolutionNode) -> Result<bool> {
        let options = &self.resolver.options;
        if !options.probe || node.dist.source_kind == SourceKind::Wheel {
            return Ok(true);
        }
        if self.interrupted() {
            node.fail(FailureKind::Interrupted, "interrupted")?;
            return Ok(false);
        }

        let uncertain = match self.resolver.heuristic.uncertain(&node.dist) {
            Ok(uncertain) => uncertain,
            Err(Error::Interrupted) => {
                node.fail(FailureKind::Interrupted, "interrupted")?;
                return Ok(false);
            }
            Err(e) => {
                warn!("Cannot inspect sources of {}, not probing: {}", node.dist, e);
                return Ok(true);
            }
        };
        for dep in uncertain {
            node.build_time_flags.entry(dep).or_insert(Necessity::Unknown);
        }

        let unknown: Vec<String> = node
            .build_time_flags
            .iter()
            .filter(|(_, n)| **n == Necessity::Unknown)
            .map(|(name, _)| name.clone())
            .collect();

        for dep in unknown {
            let base: Vec<String> = options
                .setup_requires
                .iter()
                .cloned()
                .chain(node.required_build_deps().map(str::to_string))
                .collect();

            match self.prober.probe(&node.dist, &dep, &base) {
                Ok(necessity) => {
                    node.build_time_flags.insert(dep, necessity);
                }
                Err(e) => {
                    warn!("Building {} failed: {}", node.dist, e);
                    let kind = if e.is_interrupted() {
                        FailureKind::Interrupted
                    } else {
                        FailureKind::Build
                    };
                    node.fail(kind, format!("probing build dependency {}: {}", dep, e))?;
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn finish(self) -> Result<ResolutionReport> {
        let options = &self.resolver.options;
        Synthesizer {
            naming: &options.naming,
            pkgrel: options.pkgrel,
            setup_requires: &options.setup_requires,
            candidates: &options.candidates,
            roots_only: !options.dependencies,
        }
        .finish(self.nodes, self.roots, self.warnings)
    }
}

/// Log and record where declared and observed requirements disagree
fn record_requirement_diff(
    node: &mut ResolutionNode,
    declared: &[Requirement],
    observed: &[DistributionRef],
) {
    let declared: BTreeSet<&str> = declared.iter().map(|r| r.name.as_str()).collect();
    let observed: BTreeSet<&str> = observed.iter().map(|d| d.name.as_str()).collect();

    for name in observed.difference(&declared) {
        debug!("{} installs undeclared {}", node.dist, name);
        node.warnings.push(Warning::UndeclaredRequirement {
            node: node.dist.to_string(),
            requirement: name.to_string(),
        });
    }
    for name in declared.difference(&observed) {
        debug!("{} declares {} but it was not installed", node.dist, name);
        node.warnings.push(Warning::UnusedDeclaration {
            node: node.dist.to_string(),
            requirement: name.to_string(),
        });
    }
}

/// Human-readable form of a root request
fn describe_request(request: &RootRequest) -> String {
    match (&request.origin, &request.version) {
        (Some(origin), _) => origin.clone(),
        (None, Some(version)) => format!("{}=={}", request.name, version),
        (None, None) => request.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::DistVersion;

    #[test]
    fn test_describe_request() {
        assert_eq!(describe_request(&RootRequest::parse("foo").unwrap()), "foo");
        assert_eq!(
            describe_request(&RootRequest::parse("Foo==1.0").unwrap()),
            "foo==1.0"
        );
        let vcs = RootRequest::parse("git+https://example.com/bar.git").unwrap();
        assert_eq!(describe_request(&vcs), "git+https://example.com/bar.git");
    }

    #[test]
    fn test_requirement_diff_warnings() {
        let mut node = ResolutionNode::new(DistributionRef::new(
            "a",
            DistVersion::parse("1.0").unwrap(),
        ));
        let declared = vec![Requirement::parse("b").unwrap(), Requirement::parse("d").unwrap()];
        let observed = vec![
            DistributionRef::new("b", DistVersion::parse("1.0").unwrap()),
            DistributionRef::new("c", DistVersion::parse("3.0").unwrap()),
        ];
        record_requirement_diff(&mut node, &declared, &observed);

        assert!(node.warnings.contains(&Warning::UndeclaredRequirement {
            node: "a==1.0".into(),
            requirement: "c".into(),
        }));
        assert!(node.warnings.contains(&Warning::UnusedDeclaration {
            node: "a==1.0".into(),
            requirement: "d".into(),
        }));
        assert_eq!(node.warnings.len(), 2);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.package.prefix = "py-".into();
        config.package.pkgrel = 4;
        let options = ResolverOptions::from_config(&config);
        assert_eq!(options.naming.prefix(), "py-");
        assert_eq!(options.pkgrel, 4);
        assert!(options.probe);
    }
}
