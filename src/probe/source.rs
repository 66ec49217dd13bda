// src/probe/source.rs

//! Source-tree heuristic for uncertain build dependencies
//!
//! The source of the distribution is fetched (`pip download` for index
//! and local sdists, `git clone` for VCS sources) and unpacked; a
//! candidate build dependency is uncertain when one of its globs matches.

use super::UncertainBuildDeps;
use crate::config::ProbeCandidate;
use crate::distribution::{DistributionRef, SourceKind};
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;
use tracing::debug;
use xz2::read::XzDecoder;

/// Globs the unpacked source tree against configured candidates
#[derive(Debug, Clone)]
pub struct SourceGlobHeuristic {
    runner: CommandRunner,
    python: String,
    candidates: Vec<ProbeCandidate>,
}

impl SourceGlobHeuristic {
    pub fn new(runner: CommandRunner, python: &str, candidates: Vec<ProbeCandidate>) -> Self {
        Self {
            runner,
            python: python.to_string(),
            candidates,
        }
    }

    /// Fetch and unpack the source of `dist` below `dest`
    fn fetch_source(&self, dist: &DistributionRef, dest: &Path) -> Result<PathBuf> {
        if dist.source_kind == SourceKind::Vcs
            && let Some(origin) = &dist.origin
        {
            let checkout = dest.join("checkout");
            let checkout_str = checkout.to_string_lossy().to_string();
            let url = vcs_clone_url(origin);
            self.runner
                .run_checked("git", &["clone", "--depth", "1", &url, &checkout_str], None)?;
            return Ok(checkout);
        }

        if let Some(path) = dist.origin.as_deref().and_then(|o| o.strip_prefix("file://"))
            && Path::new(path).is_dir()
        {
            return Ok(PathBuf::from(path));
        }

        let download = dest.join("download");
        let download_str = download.to_string_lossy().to_string();
        let target = dist.install_target();
        self.runner.run_checked(
            &self.python,
            &[
                "-m",
                "pip",
                "download",
                "--no-deps",
                "--no-binary",
                ":all:",
                "--dest",
                &download_str,
                &target,
            ],
            None,
        )?;

        let archive = std::fs::read_dir(&download)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .next()
            .ok_or_else(|| Error::NotFoundError(format!("no source archive downloaded for {}", dist)))?;

        let tree = dest.join("tree");
        unpack_archive(&archive, &tree)?;
        Ok(tree)
    }
}

impl UncertainBuildDeps for SourceGlobHeuristic {
    fn uncertain(&self, dist: &DistributionRef) -> Result<Vec<String>> {
        if dist.source_kind == SourceKind::Wheel || self.candidates.is_empty() {
            return Ok(Vec::new());
        }

        let work = TempDir::new()?;
        let tree = self.fetch_source(dist, work.path())?;
        let found = matching_candidates(&tree, &self.candidates)?;
        debug!("Uncertain build dependencies of {}: {:?}", dist, found);
        Ok(found)
    }
}

/// Candidates with at least one glob matching inside `tree`
fn matching_candidates(tree: &Path, candidates: &[ProbeCandidate]) -> Result<Vec<String>> {
    let mut found = Vec::new();
    for candidate in candidates {
        for pattern in &candidate.globs {
            let full = tree.join(pattern);
            let full = full.to_string_lossy();
            let mut matches = glob::glob(&full)
                .map_err(|e| Error::ConfigError(format!("invalid glob '{}': {}", pattern, e)))?;
            if matches.any(|m| m.is_ok()) {
                found.push(candidate.name.clone());
                break;
            }
        }
    }
    Ok(found)
}

/// `git+https://host/repo.git@ref#egg=name` -> `https://host/repo.git`
fn vcs_clone_url(origin: &str) -> String {
    let url = origin.strip_prefix("git+").unwrap_or(origin);
    let url = url.split('#').next().unwrap_or(url);
    // '@' after the last '/' selects a revision; user@host appears before it
    match (url.rfind('@'), url.rfind('/')) {
        (Some(at), Some(slash)) if at > slash => url[..at].to_string(),
        _ => url.to_string(),
    }
}

/// Unpack a tar source archive (plain, gzip or xz compressed)
pub fn unpack_archive(path: &Path, dest: &Path) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let file = File::open(path)?;

    let reader: Box<dyn Read> = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Box::new(GzDecoder::new(file))
    } else if name.ends_with(".tar.xz") {
        Box::new(XzDecoder::new(file))
    } else if name.ends_with(".tar") {
        Box::new(file)
    } else {
        return Err(Error::ParseError(format!(
            "Unsupported source archive format: {}",
            name
        )));
    };

    std::fs::create_dir_all(dest)?;
    Archive::new(reader).unpack(dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn candidates() -> Vec<ProbeCandidate> {
        crate::config::ProbeConfig::default().candidates
    }

    #[test]
    fn test_matching_candidates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg/src")).unwrap();
        std::fs::write(dir.path().join("pkg/src/fast.pyx"), "cdef int x").unwrap();
        std::fs::write(dir.path().join("pkg/setup.py"), "").unwrap();

        let found = matching_candidates(dir.path(), &candidates()).unwrap();
        assert_eq!(found, vec!["cython".to_string()]);
    }

    #[test]
    fn test_vcs_clone_url() {
        assert_eq!(
            vcs_clone_url("git+https://github.com/user/repo.git@v1.0#egg=repo"),
            "https://github.com/user/repo.git"
        );
        assert_eq!(
            vcs_clone_url("git+ssh://git@github.com/user/repo.git"),
            "ssh://git@github.com/user/repo.git"
        );
    }

    #[test]
    fn test_unpack_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("foo-1.0.tar.gz");
        {
            let file = File::create(&archive_path).unwrap();
            let encoder = GzEncoder::new(file, Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"%module foo";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "foo-1.0/foo.i", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = dir.path().join("out");
        unpack_archive(&archive_path, &dest).unwrap();
        assert!(dest.join("foo-1.0/foo.i").exists());

        let found = matching_candidates(&dest, &candidates()).unwrap();
        assert_eq!(found, vec!["swig".to_string()]);
    }

    #[test]
    fn test_unpack_rejects_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo-1.0.zip");
        std::fs::write(&path, b"PK").unwrap();
        assert!(unpack_archive(&path, &dir.path().join("out")).is_err());
    }

    #[test]
    fn test_wheels_never_uncertain() {
        let heuristic = SourceGlobHeuristic::new(
            CommandRunner::new(std::time::Duration::from_secs(1), crate::exec::Interrupt::new()),
            "python3",
            candidates(),
        );
        let wheel = DistributionRef::new("foo", crate::version::DistVersion::parse("1.0").unwrap())
            .with_source_kind(SourceKind::Wheel);
        assert!(heuristic.uncertain(&wheel).unwrap().is_empty());
    }
}
