// src/conglomerate/split.rs

//! Partitioning a trial-installed manifest by top-level import

use crate::distribution::DistributionRef;
use crate::environment::TrialInstallReport;
use crate::resolver::BundledComponent;
use crate::version::to_wheel_name;
use std::collections::{BTreeMap, BTreeSet};

/// Result of partitioning a conglomerate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitPlan {
    pub components: Vec<BundledComponent>,
    /// Observed requirements no component imports
    pub unattributed: BTreeSet<String>,
}

impl SplitPlan {
    pub fn is_splittable(&self) -> bool {
        self.components.len() >= 2
    }
}

/// Top-level import names a distribution provides
fn provided_imports(report: &TrialInstallReport, name: &str) -> BTreeSet<String> {
    match report.top_level.get(name) {
        Some(names) if !names.is_empty() => names.clone(),
        _ => BTreeSet::from([to_wheel_name(name)]),
    }
}

/// Split the manifest of a trial install into components
///
/// Each top-level import in the manifest becomes a component. An observed
/// requirement is attributed to every component whose files import one of
/// the requirement's top-level names; components importing each other get
/// internal dependencies (possibly circular).
pub fn partition(report: &TrialInstallReport, observed: &[DistributionRef]) -> SplitPlan {
    let mut files: BTreeMap<String, Vec<_>> = BTreeMap::new();
    let mut imports: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for entry in &report.manifest {
        let Some(top) = entry.top_level() else {
            continue;
        };
        files.entry(top.clone()).or_default().push(entry.path.clone());
        imports
            .entry(top)
            .or_default()
            .extend(entry.imports.iter().cloned());
    }

    let mut plan = SplitPlan::default();
    let mut runtime: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();

    for requirement in observed {
        let provided = provided_imports(report, &requirement.name);
        let mut attributed = false;
        for (component, used) in &imports {
            if !used.is_disjoint(&provided) {
                runtime
                    .entry(component.as_str())
                    .or_default()
                    .insert(requirement.name.clone());
                attributed = true;
            }
        }
        if !attributed {
            plan.unattributed.insert(requirement.name.clone());
        }
    }

    for (name, component_files) in &files {
        let used = imports.get(name).cloned().unwrap_or_default();
        let internal_depends = files
            .keys()
            .filter(|other| *other != name && used.contains(*other))
            .cloned()
            .collect();
        plan.components.push(BundledComponent {
            name: name.clone(),
            files: component_files.clone(),
            runtime_depends: runtime.remove(name.as_str()).unwrap_or_default(),
            internal_depends,
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::ManifestEntry;
    use crate::version::DistVersion;

    fn dist(name: &str) -> DistributionRef {
        DistributionRef::new(name, DistVersion::parse("1.0").unwrap())
    }

    fn report() -> TrialInstallReport {
        TrialInstallReport {
            target_name: "pkge".into(),
            manifest: vec![
                ManifestEntry::new("pkge-1.0.dist-info/RECORD"),
                ManifestEntry::new("e1/__init__.py").with_imports(["numpy", "e2"]),
                ManifestEntry::new("e1/__pycache__/__init__.cpython-312.pyc"),
                ManifestEntry::new("e2/__init__.py").with_imports(["yaml", "numpy"]),
                ManifestEntry::new("../../bin/e-tool"),
            ],
            top_level: BTreeMap::from([
                ("pyyaml".to_string(), BTreeSet::from(["yaml".to_string()])),
                ("numpy".to_string(), BTreeSet::from(["numpy".to_string()])),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn test_partition_by_top_level() {
        let plan = partition(&report(), &[dist("numpy"), dist("pyyaml"), dist("six")]);
        assert!(plan.is_splittable());

        let names: Vec<&str> = plan.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["e1", "e2"]);

        let e1 = &plan.components[0];
        assert_eq!(e1.files.len(), 2);
        assert_eq!(e1.runtime_depends, BTreeSet::from(["numpy".to_string()]));
        assert_eq!(e1.internal_depends, BTreeSet::from(["e2".to_string()]));

        let e2 = &plan.components[1];
        assert_eq!(
            e2.runtime_depends,
            BTreeSet::from(["numpy".to_string(), "pyyaml".to_string()])
        );
        assert!(e2.internal_depends.is_empty());

        assert_eq!(plan.unattributed, BTreeSet::from(["six".to_string()]));
    }

    #[test]
    fn test_single_partition_not_splittable() {
        let report = TrialInstallReport {
            manifest: vec![ManifestEntry::new("only/__init__.py")],
            ..Default::default()
        };
        let plan = partition(&report, &[]);
        assert_eq!(plan.components.len(), 1);
        assert!(!plan.is_splittable());
    }
}
