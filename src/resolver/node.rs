// src/resolver/node.rs

//! Resolution nodes and their state machine
//!
//! ```text
//! PENDING -> CHECKING_NATIVE -> { SATISFIED | INSTALLING }
//! INSTALLING -> { RESOLVED | FAILED }
//! RESOLVED -> { SPLITTING -> SPLIT | FINAL | FAILED }
//! ```
//!
//! `CHECKING_NATIVE -> FAILED` covers catalog errors and interruption;
//! `RESOLVED -> FAILED` covers build probing failures.

use super::conflict::Warning;
use crate::distribution::{DistributionRef, Requirement};
use crate::error::{Error, Result};
use crate::packages::CatalogEntry;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a [`ResolutionNode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Pending,
    CheckingNative,
    Satisfied,
    Installing,
    Resolved,
    Failed,
    Splitting,
    Split,
    Final,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::CheckingNative => "CHECKING_NATIVE",
            Self::Satisfied => "SATISFIED",
            Self::Installing => "INSTALLING",
            Self::Resolved => "RESOLVED",
            Self::Failed => "FAILED",
            Self::Splitting => "SPLITTING",
            Self::Split => "SPLIT",
            Self::Final => "FINAL",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Satisfied | Self::Failed | Self::Split | Self::Final)
    }

    /// Whether a descriptor is synthesized for nodes in this state
    pub fn needs_synthesis(&self) -> bool {
        matches!(self, Self::Split | Self::Final)
    }

    pub fn can_transition_to(&self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Pending, CheckingNative)
                | (CheckingNative, Satisfied)
                | (CheckingNative, Installing)
                | (CheckingNative, Failed)
                | (Installing, Resolved)
                | (Installing, Failed)
                | (Resolved, Splitting)
                | (Resolved, Final)
                | (Resolved, Failed)
                | (Splitting, Split)
        )
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an optional build-time dependency is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Necessity {
    Unknown,
    Required,
    NotRequired,
}

/// Why a node failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Catalog,
    Install,
    Build,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// One independently packaged piece of a conglomerate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundledComponent {
    /// Top-level import name
    pub name: String,
    pub files: Vec<PathBuf>,
    /// Distributions the component's files import
    pub runtime_depends: BTreeSet<String>,
    /// Sibling components the component's files import
    pub internal_depends: BTreeSet<String>,
}

/// Resolution state of one distribution within a pass
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionNode {
    pub dist: DistributionRef,
    state: NodeState,
    pub declared_requirements: Vec<Requirement>,
    observed_requirements: Option<Vec<DistributionRef>>,
    satisfied_by: Option<CatalogEntry>,
    bundled_components: Vec<BundledComponent>,
    /// Requirements no component references; they stay on the aggregate
    pub unattributed: BTreeSet<String>,
    pub build_time_flags: BTreeMap<String, Necessity>,
    pub install_flags: Vec<String>,
    /// Names this node depends on at runtime
    pub edges: BTreeSet<String>,
    /// Edges that closed a cycle; ignored for synthesis order
    pub back_edges: BTreeSet<String>,
    pub warnings: Vec<Warning>,
    pub failure: Option<NodeFailure>,
}

impl ResolutionNode {
    pub fn new(dist: DistributionRef) -> Self {
        Self {
            dist,
            state: NodeState::Pending,
            declared_requirements: Vec::new(),
            observed_requirements: None,
            satisfied_by: None,
            bundled_components: Vec::new(),
            unattributed: BTreeSet::new(),
            build_time_flags: BTreeMap::new(),
            install_flags: Vec::new(),
            edges: BTreeSet::new(),
            back_edges: BTreeSet::new(),
            warnings: Vec::new(),
            failure: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.dist.name
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn transition(&mut self, next: NodeState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                node: self.dist.to_string(),
                from: self.state.as_str(),
                to: next.as_str(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Record a failure and move to FAILED
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> Result<()> {
        self.transition(NodeState::Failed)?;
        self.failure = Some(NodeFailure {
            kind,
            message: message.into(),
        });
        Ok(())
    }

    pub fn observed_requirements(&self) -> Option<&[DistributionRef]> {
        self.observed_requirements.as_deref()
    }

    /// Record what the trial install observed; allowed once
    pub fn set_observed(&mut self, observed: Vec<DistributionRef>) -> Result<()> {
        if self.observed_requirements.is_some() {
            return Err(Error::ResolutionError(format!(
                "observed requirements of {} set twice",
                self.dist
            )));
        }
        self.observed_requirements = Some(observed);
        Ok(())
    }

    pub fn satisfied_by(&self) -> Option<&CatalogEntry> {
        self.satisfied_by.as_ref()
    }

    pub fn set_satisfied(&mut self, entry: CatalogEntry) -> Result<()> {
        if !self.bundled_components.is_empty() {
            return Err(Error::ResolutionError(format!(
                "{} cannot be both split and natively satisfied",
                self.dist
            )));
        }
        self.satisfied_by = Some(entry);
        Ok(())
    }

    pub fn bundled_components(&self) -> &[BundledComponent] {
        &self.bundled_components
    }

    pub fn set_bundled(&mut self, components: Vec<BundledComponent>) -> Result<()> {
        if self.satisfied_by.is_some() {
            return Err(Error::ResolutionError(format!(
                "{} cannot be both natively satisfied and split",
                self.dist
            )));
        }
        self.bundled_components = components;
        Ok(())
    }

    /// Build-time dependencies found to be required
    pub fn required_build_deps(&self) -> impl Iterator<Item = &str> {
        self.build_time_flags
            .iter()
            .filter(|(_, necessity)| **necessity == Necessity::Required)
            .map(|(name, _)| name.as_str())
    }
}
