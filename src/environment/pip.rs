// src/environment/pip.rs

//! Parsers for pip output and Python sources
//!
//! Everything here is pure text processing so it can be tested without an
//! interpreter.

use crate::distribution::PackageType;
use crate::version::normalize_name;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::LazyLock;

/// `import a.b, c as d` / `from a.b import c`
static IMPORT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?m)^[ \t]*(?:from[ \t]+(?P<from>[A-Za-z_][A-Za-z0-9_]*)[A-Za-z0-9_.]*[ \t]+import\b|import[ \t]+(?P<names>[A-Za-z_][A-Za-z0-9_., \t]*))",
    )
    .unwrap()
});

/// One entry of `pip list --format=json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListedDistribution {
    pub name: String,
    pub version: String,
}

/// Parse `pip list --format=json` into normalized name → version
pub fn parse_pip_list(json: &str) -> serde_json::Result<BTreeMap<String, String>> {
    let listed: Vec<ListedDistribution> = serde_json::from_str(json)?;
    Ok(listed
        .into_iter()
        .map(|d| (normalize_name(&d.name), d.version))
        .collect())
}

/// One entry of `pip list --outdated --format=json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutdatedListing {
    pub name: String,
    pub version: String,
    pub latest_version: String,
    /// `wheel` or `sdist`
    #[serde(default)]
    pub latest_filetype: String,
}

/// Parse `pip list --outdated --format=json`, normalizing names
pub fn parse_pip_outdated(json: &str) -> serde_json::Result<Vec<OutdatedListing>> {
    let mut listed: Vec<OutdatedListing> = serde_json::from_str(json)?;
    for entry in &mut listed {
        entry.name = normalize_name(&entry.name);
    }
    Ok(listed)
}

/// Package type of a downloaded file, from its name
///
/// Wheel names are `{name}-{version}(-{build})?-{python}-{abi}-{platform}.whl`;
/// only pure (`any`) and manylinux wheels count. Anything else that is an
/// archive is an sdist.
pub fn classify_download(file_name: &str) -> Option<PackageType> {
    if let Some(stem) = file_name.strip_suffix(".whl") {
        let platform = stem.rsplit('-').next()?;
        if stem.split('-').count() < 5 {
            return None;
        }
        return if platform == "any" {
            Some(PackageType::AnyWheel)
        } else if platform.split('.').any(|tag| tag.starts_with("manylinux")) {
            Some(PackageType::ManylinuxWheel)
        } else {
            None
        };
    }
    [".tar.gz", ".tgz", ".tar.bz2", ".tar.xz", ".zip"]
        .iter()
        .any(|ext| file_name.ends_with(ext))
        .then_some(PackageType::Sdist)
}

/// One distribution block of `pip show -f`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowBlock {
    pub name: String,
    pub version: String,
    pub location: PathBuf,
    pub requires: Vec<String>,
    /// Paths relative to `location`
    pub files: Vec<PathBuf>,
}

/// Parse `pip show -f a b c` output (blocks separated by `---`)
pub fn parse_pip_show(text: &str) -> Vec<ShowBlock> {
    let mut blocks = Vec::new();
    let mut current = ShowBlock::default();
    let mut in_files = false;

    for line in text.lines() {
        if line.trim() == "---" {
            if !current.name.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            in_files = false;
            continue;
        }

        if in_files && line.starts_with(' ') {
            let file = line.trim();
            if !file.is_empty() {
                current.files.push(PathBuf::from(file));
            }
            continue;
        }
        in_files = false;

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "Name" => current.name = normalize_name(value),
            "Version" => current.version = value.to_string(),
            "Location" => current.location = PathBuf::from(value),
            "Requires" => {
                current.requires = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(normalize_name)
                    .collect();
            }
            "Files" => in_files = true,
            _ => {}
        }
    }

    if !current.name.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Top-level importable names shipped by a distribution's file list
///
/// Metadata directories, bytecode caches, scripts and data installed
/// outside site-packages (`../../bin/...`) do not count.
pub fn top_level_names(files: &[PathBuf]) -> BTreeSet<String> {
    files.iter().filter_map(|f| top_level_of(f)).collect()
}

/// The top-level import name a single installed file belongs to
pub fn top_level_of(file: &std::path::Path) -> Option<String> {
    let mut components = file.components();
    let first = components.next()?.as_os_str().to_str()?;
    let nested = components.next().is_some();

    if first == ".." || first == "__pycache__" {
        return None;
    }
    if first.ends_with(".dist-info") || first.ends_with(".egg-info") || first.ends_with(".data") {
        return None;
    }

    if nested {
        return is_identifier(first).then(|| first.to_string());
    }

    // Single-file modules and extension modules (`foo.py`, `foo.cpython-312-x86_64-linux-gnu.so`)
    let stem = if let Some(stem) = first.strip_suffix(".py") {
        stem
    } else if first.ends_with(".so") || first.ends_with(".pyd") {
        first.split('.').next()?
    } else {
        return None;
    };
    is_identifier(stem).then(|| stem.to_string())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Absolute top-level module names imported by a Python source file
pub fn scan_imports(source: &str) -> BTreeSet<String> {
    let mut imports = BTreeSet::new();
    for caps in IMPORT_RE.captures_iter(source) {
        if let Some(from) = caps.name("from") {
            imports.insert(from.as_str().to_string());
        } else if let Some(names) = caps.name("names") {
            for item in names.as_str().split(',') {
                let module = item.split_whitespace().next().unwrap_or_default();
                if let Some(top) = module.split('.').next()
                    && is_identifier(top)
                {
                    imports.insert(top.to_string());
                }
            }
        }
    }
    imports
}

/// Parse `pip index versions <name>` output
pub fn parse_index_versions(text: &str) -> Vec<String> {
    text.lines()
        .find_map(|line| line.trim().strip_prefix("Available versions:"))
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
