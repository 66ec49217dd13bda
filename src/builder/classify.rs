// src/builder/classify.rs

use super::{BuildError, FailureClass, FailureClassifier};
use crate::error::{Error, Result};
use regex::Regex;

/// Classifies failures whose signature matches a configured pattern as
/// [`FailureClass::MissingBuildTool`]
#[derive(Debug, Clone)]
pub struct RegexClassifier {
    patterns: Vec<Regex>,
}

impl RegexClassifier {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    Error::ConfigError(format!("invalid missing-tool pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl Default for RegexClassifier {
    /// Classifier with the built-in cython/swig patterns
    fn default() -> Self {
        let patterns = crate::config::ProbeConfig::default()
            .missing_tool_patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self { patterns }
    }
}

impl FailureClassifier for RegexClassifier {
    fn classify(&self, error: &BuildError) -> FailureClass {
        if !matches!(error, BuildError::Failed { .. }) {
            return FailureClass::Other;
        }
        let signature = error.signature();
        if self.patterns.iter().any(|re| re.is_match(signature)) {
            FailureClass::MissingBuildTool
        } else {
            FailureClass::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;

    fn failed(signature: &str) -> BuildError {
        BuildError::Failed {
            target: "pkg==1.0".into(),
            signature: signature.into(),
        }
    }

    #[test]
    fn test_default_patterns() {
        let classifier = RegexClassifier::new(&ProbeConfig::default().missing_tool_patterns).unwrap();

        assert_eq!(
            classifier.classify(&failed("ModuleNotFoundError: No module named 'Cython'")),
            FailureClass::MissingBuildTool
        );
        assert_eq!(
            classifier.classify(&failed("error: command 'swig' failed: No such file or directory")),
            FailureClass::MissingBuildTool
        );
        assert_eq!(
            classifier.classify(&failed("error: invalid syntax in setup.py")),
            FailureClass::Other
        );
    }

    #[test]
    fn test_non_build_failures_are_other() {
        let classifier = RegexClassifier::new(&[".*".to_string()]).unwrap();
        assert_eq!(classifier.classify(&BuildError::Interrupted), FailureClass::Other);
        assert_eq!(
            classifier.classify(&BuildError::Timeout {
                target: "x".into(),
                seconds: 1
            }),
            FailureClass::Other
        );
    }

    #[test]
    fn test_default_matches_configured_defaults() {
        let classifier = RegexClassifier::default();
        assert_eq!(
            classifier.classify(&failed("/bin/sh: swig: command not found")),
            FailureClass::MissingBuildTool
        );
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(RegexClassifier::new(&["(".to_string()]).is_err());
    }
}
