// src/builder/pip_wheel.rs

//! Builds wheels with pip in a fresh virtual environment
//!
//! Build isolation is disabled so that exactly the build-time dependencies
//! handed in are visible to the build.

use super::{BuildArtifact, BuildError, Builder};
use crate::distribution::DistributionRef;
use crate::exec::CommandRunner;
use tempfile::TempDir;
use tracing::{debug, info};

/// Builder running `pip wheel --no-deps --no-build-isolation`
#[derive(Debug, Clone)]
pub struct PipWheelBuilder {
    runner: CommandRunner,
    python: String,
    setup_requires: Vec<String>,
}

impl PipWheelBuilder {
    pub fn new(runner: CommandRunner, python: &str) -> Self {
        Self {
            runner,
            python: python.to_string(),
            setup_requires: Vec::new(),
        }
    }

    pub fn with_setup_requires(mut self, setup_requires: Vec<String>) -> Self {
        self.setup_requires = setup_requires;
        self
    }
}

impl Builder for PipWheelBuilder {
    fn attempt_build(
        &self,
        dist: &DistributionRef,
        build_time_deps: &[String],
    ) -> Result<BuildArtifact, BuildError> {
        let target = dist.install_target();
        info!(
            "Building {} with build dependencies [{}]",
            dist,
            build_time_deps.join(", ")
        );

        let dir = TempDir::new().map_err(|e| BuildError::Setup(e.to_string()))?;
        let venv = dir.path().join("venv");
        let wheelhouse = dir.path().join("wheelhouse");
        let venv_str = venv.to_string_lossy().to_string();
        let wheelhouse_str = wheelhouse.to_string_lossy().to_string();

        self.runner
            .run_checked(&self.python, &["-m", "venv", &venv_str], None)
            .map_err(|e| BuildError::Setup(e.to_string()))?;

        let python = venv.join("bin").join("python");
        let python = python.to_string_lossy().to_string();
        let runner = self.runner.clone().with_path_prefix(&venv.join("bin"));

        // setuptools and wheel are needed by --no-build-isolation builds of legacy sdists
        let mut deps: Vec<&str> = vec!["setuptools", "wheel"];
        deps.extend(self.setup_requires.iter().map(String::as_str));
        deps.extend(build_time_deps.iter().map(String::as_str));
        let mut install = vec!["-m", "pip", "install"];
        install.extend(deps);
        runner
            .run_checked(&python, &install, Some(dir.path()))
            .map_err(|e| BuildError::Setup(e.to_string()))?;

        runner
            .run_checked(
                &python,
                &[
                    "-m",
                    "pip",
                    "wheel",
                    "--no-deps",
                    "--no-build-isolation",
                    "--wheel-dir",
                    &wheelhouse_str,
                    &target,
                ],
                Some(dir.path()),
            )
            .map_err(|e| BuildError::from_runner(&target, e))?;

        let file_name = std::fs::read_dir(&wheelhouse)
            .map_err(|e| BuildError::Setup(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .find(|name| name.ends_with(".whl"))
            .ok_or_else(|| BuildError::Failed {
                target: target.clone(),
                signature: "pip wheel produced no wheel".to_string(),
            })?;

        debug!("Built {}", file_name);
        Ok(BuildArtifact {
            dist: dist.clone(),
            file_name,
        })
    }
}
