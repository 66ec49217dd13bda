// src/builder/mod.rs

//! Native build attempts and failure classification
//!
//! The prober only needs to know whether a build succeeded and, if not,
//! whether the failure looks like a missing build tool. Builders report
//! failures with a text signature (the tail of the build log) and a
//! [`FailureClassifier`] maps signatures to a [`FailureClass`].

mod classify;
mod pip_wheel;

pub use classify::RegexClassifier;
pub use pip_wheel::PipWheelBuilder;

use crate::distribution::DistributionRef;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a build attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Build interrupted")]
    Interrupted,

    /// The build ran and failed; `signature` is the classifiable log tail
    #[error("Build of {target} failed: {signature}")]
    Failed { target: String, signature: String },

    #[error("Build of {target} timed out after {seconds} seconds")]
    Timeout { target: String, seconds: u64 },

    /// The build environment itself could not be prepared
    #[error("Build setup failed: {0}")]
    Setup(String),
}

impl BuildError {
    /// Text a classifier looks at
    pub fn signature(&self) -> &str {
        match self {
            Self::Failed { signature, .. } => signature,
            Self::Setup(message) => message,
            Self::Interrupted | Self::Timeout { .. } => "",
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    pub(crate) fn from_runner(target: &str, err: Error) -> Self {
        match err {
            Error::Interrupted => Self::Interrupted,
            Error::CommandFailed { stderr, .. } => Self::Failed {
                target: target.to_string(),
                signature: stderr,
            },
            Error::CommandTimeout { seconds, .. } => Self::Timeout {
                target: target.to_string(),
                seconds,
            },
            other => Self::Setup(other.to_string()),
        }
    }
}

/// How a build failure is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The build needs a tool that was not available
    MissingBuildTool,
    Other,
}

/// Maps a build failure to a [`FailureClass`]
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, error: &BuildError) -> FailureClass;
}

/// A successful build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub dist: DistributionRef,
    /// File name of the produced artifact
    pub file_name: String,
}

/// Builds a distribution with a given set of build-time dependencies
pub trait Builder: Send + Sync {
    fn attempt_build(
        &self,
        dist: &DistributionRef,
        build_time_deps: &[String],
    ) -> Result<BuildArtifact, BuildError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_signature() {
        let err = BuildError::Failed {
            target: "foo==1.0".into(),
            signature: "error: command 'swig' failed".into(),
        };
        assert_eq!(err.signature(), "error: command 'swig' failed");
        assert_eq!(BuildError::Interrupted.signature(), "");
        assert!(BuildError::Interrupted.is_interrupted());
    }

    #[test]
    fn test_build_error_from_runner() {
        let err = BuildError::from_runner(
            "foo==1.0",
            Error::CommandFailed {
                command: "pip wheel".into(),
                stderr: "boom".into(),
            },
        );
        assert_eq!(err.signature(), "boom");
        assert!(BuildError::from_runner("foo", Error::Interrupted).is_interrupted());
    }
}
