// src/conglomerate/mod.rs

//! Conglomerate detection and splitting
//!
//! Some upstream distributions vendor several independent components
//! under one name. Such a distribution is packaged as one native package
//! per top-level import plus an aggregate meta package.

mod split;

pub use split::{SplitPlan, partition};

use crate::distribution::DistributionRef;
use crate::version::normalize_name;
use std::collections::BTreeSet;

/// Decides which distributions should be split
pub trait ConglomerateDetector: Send + Sync {
    fn is_conglomerate(&self, dist: &DistributionRef) -> bool;
}

/// Detector driven by a configured list of distribution names
#[derive(Debug, Clone, Default)]
pub struct NameListDetector {
    names: BTreeSet<String>,
}

impl NameListDetector {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names.into_iter().map(|n| normalize_name(n.as_ref())).collect(),
        }
    }
}

impl ConglomerateDetector for NameListDetector {
    fn is_conglomerate(&self, dist: &DistributionRef) -> bool {
        self.names.contains(&dist.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::DistVersion;

    #[test]
    fn test_name_list_detector_normalizes() {
        let detector = NameListDetector::new(["Big_Stack"]);
        let dist = DistributionRef::new("big-stack", DistVersion::parse("1.0").unwrap());
        assert!(detector.is_conglomerate(&dist));

        let other = DistributionRef::new("small", DistVersion::parse("1.0").unwrap());
        assert!(!detector.is_conglomerate(&other));
        assert!(!NameListDetector::default().is_conglomerate(&dist));
    }
}
