// src/lib.rs

//! pypi2pkg
//!
//! Turns PyPI distributions into native (pacman) package descriptors.
//!
//! # Architecture
//!
//! - Empirical dependencies: what a trial install actually pulls in wins
//!   over what the metadata declares
//! - Native first: anything the package manager already provides is
//!   depended on, never re-packaged
//! - Conglomerates: distributions vendoring several components are split
//!   into one package per component plus an aggregate
//! - Probed build dependencies: optional build tools are only required when
//!   a build without them fails for lack of them

pub mod builder;
pub mod config;
pub mod conglomerate;
pub mod descriptor;
pub mod distribution;
pub mod environment;
mod error;
pub mod exec;
pub mod outdated;
pub mod packages;
pub mod probe;
pub mod resolver;
pub mod version;

pub use config::Config;
pub use descriptor::{ConflictEntry, DescriptorKind, Naming, PackageDescriptor};
pub use distribution::{DistributionRef, PackageType, Requirement, RootRequest, SourceKind};
pub use error::{Error, Result};
pub use exec::{CommandRunner, Interrupt};
pub use resolver::{
    NodeState, ResolutionNode, ResolutionReport, Resolver, ResolverOptions, Warning,
};
pub use version::{DistVersion, NativeVersion, VersionConstraint, normalize_name};
