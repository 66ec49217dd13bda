// src/probe/mod.rs

//! Build-time dependency probing
//!
//! Whether an optional build tool (cython, swig, ...) is really needed is
//! found out by building without it first, and with it only when the
//! failure looks like the tool was missing.

mod source;

pub use source::{SourceGlobHeuristic, unpack_archive};

use crate::builder::{BuildError, Builder, FailureClass, FailureClassifier};
use crate::distribution::DistributionRef;
use crate::error::Result;
use crate::resolver::Necessity;
use std::collections::HashMap;
use tracing::{debug, info};

/// Decides which optional build dependencies are uncertain for a distribution
pub trait UncertainBuildDeps: Send + Sync {
    /// Names of candidate build dependencies worth probing
    fn uncertain(&self, dist: &DistributionRef) -> Result<Vec<String>>;
}

/// Heuristic that never finds anything uncertain
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUncertainDeps;

impl UncertainBuildDeps for NoUncertainDeps {
    fn uncertain(&self, _dist: &DistributionRef) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Runs the probe-and-retry protocol, memoized per (distribution, dependency)
pub struct BuildProber<'a> {
    builder: &'a dyn Builder,
    classifier: &'a dyn FailureClassifier,
    memo: HashMap<(DistributionRef, String), std::result::Result<Necessity, BuildError>>,
}

impl<'a> BuildProber<'a> {
    pub fn new(builder: &'a dyn Builder, classifier: &'a dyn FailureClassifier) -> Self {
        Self {
            builder,
            classifier,
            memo: HashMap::new(),
        }
    }

    /// Decide whether `dependency` is needed to build `dist`
    ///
    /// `base_deps` are build dependencies known to be present in both
    /// attempts. At most two builds are run per (dist, dependency).
    pub fn probe(
        &mut self,
        dist: &DistributionRef,
        dependency: &str,
        base_deps: &[String],
    ) -> std::result::Result<Necessity, BuildError> {
        let key = (dist.clone(), dependency.to_string());
        if let Some(outcome) = self.memo.get(&key) {
            debug!("Probe of {} for {} is cached", dependency, dist);
            return outcome.clone();
        }

        let outcome = self.run_probe(dist, dependency, base_deps);
        // An interrupted probe says nothing about the dependency
        if !matches!(outcome, Err(BuildError::Interrupted)) {
            self.memo.insert(key, outcome.clone());
        }
        outcome
    }

    fn run_probe(
        &self,
        dist: &DistributionRef,
        dependency: &str,
        base_deps: &[String],
    ) -> std::result::Result<Necessity, BuildError> {
        info!("Probing whether {} needs {} to build", dist, dependency);

        let first = match self.builder.attempt_build(dist, base_deps) {
            Ok(_) => {
                debug!("{} builds without {}", dist, dependency);
                return Ok(Necessity::NotRequired);
            }
            Err(e) => e,
        };

        if first.is_interrupted() {
            return Err(first);
        }
        if self.classifier.classify(&first) != FailureClass::MissingBuildTool {
            return Err(first);
        }

        let mut with_dep = base_deps.to_vec();
        with_dep.push(dependency.to_string());
        self.builder.attempt_build(dist, &with_dep)?;
        info!("{} requires {} to build", dist, dependency);
        Ok(Necessity::Required)
    }
}
