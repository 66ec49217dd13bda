// src/resolver/conflict.rs

//! Non-fatal findings recorded during resolution
//!
//! Failures stay scoped to the node they happen on; everything the
//! dependents of that node should know about is recorded as a [`Warning`].

use serde::Serialize;

/// A warning attached to a resolution node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A dependency was already on the resolution path
    CycleDetected { dependent: String, dependency: String },
    /// Splitting a conglomerate could not attribute something cleanly
    ConglomerateAmbiguity { node: String, detail: String },
    /// A dependency could not be resolved
    DependencyFailed {
        dependent: String,
        dependency: String,
        reason: String,
    },
    /// Installed, but not declared in the distribution's metadata
    UndeclaredRequirement { node: String, requirement: String },
    /// Declared in the metadata, but not installed by the trial
    UnusedDeclaration { node: String, requirement: String },
    /// Another version of the same distribution was requested
    VersionSkipped {
        name: String,
        kept: String,
        skipped: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::CycleDetected {
                dependent,
                dependency,
            } => write!(
                f,
                "Circular dependency: {} depends on {}, which is still being resolved",
                dependent, dependency
            ),
            Warning::ConglomerateAmbiguity { node, detail } => {
                write!(f, "Ambiguous split of {}: {}", node, detail)
            }
            Warning::DependencyFailed {
                dependent,
                dependency,
                reason,
            } => write!(
                f,
                "Dependency {} of {} failed: {}",
                dependency, dependent, reason
            ),
            Warning::UndeclaredRequirement { node, requirement } => write!(
                f,
                "{} installs {} without declaring it",
                node, requirement
            ),
            Warning::UnusedDeclaration { node, requirement } => write!(
                f,
                "{} declares {}, which was not installed",
                node, requirement
            ),
            Warning::VersionSkipped {
                name,
                kept,
                skipped,
            } => write!(f, "Using {} {} instead of {}", name, kept, skipped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display() {
        let w = Warning::CycleDetected {
            dependent: "b==1.0".into(),
            dependency: "a".into(),
        };
        assert!(w.to_string().contains("b==1.0 depends on a"));

        let w = Warning::VersionSkipped {
            name: "foo".into(),
            kept: "2.0".into(),
            skipped: "1.0".into(),
        };
        assert_eq!(w.to_string(), "Using foo 2.0 instead of 1.0");
    }

    #[test]
    fn test_warning_serializes_with_kind() {
        let w = Warning::ConglomerateAmbiguity {
            node: "pkge".into(),
            detail: "x".into(),
        };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["kind"], "conglomerate_ambiguity");
    }
}
