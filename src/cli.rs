// src/cli.rs
//! CLI definitions for pypi2pkg
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pypi2pkg")]
#[command(author = "pypi2pkg Contributors")]
#[command(version)]
#[command(about = "Resolve PyPI distributions into native package descriptors", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ~/.config/pypi2pkg/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve distributions and synthesize package descriptors
    Resolve {
        /// Distributions: NAME, NAME==VERSION, git+URL or file://PATH
        #[arg(required_unless_present = "update")]
        packages: Vec<String>,

        /// Resolve every outdated natively packaged distribution instead
        #[arg(long, conflicts_with = "packages")]
        update: bool,

        /// Distributions left alone by --update (comma separated)
        #[arg(long, value_delimiter = ',', requires = "update")]
        ignore: Vec<String>,

        /// Allow pre-releases when choosing versions
        #[arg(long)]
        pre: bool,

        /// Release number of generated packages
        #[arg(long)]
        pkgrel: Option<u32>,

        /// Prefix of native package names
        #[arg(long)]
        prefix: Option<String>,

        /// Split this distribution into components (repeatable)
        #[arg(long = "conglomerate", value_name = "NAME")]
        conglomerates: Vec<String>,

        /// Build dependencies forced into every package (comma separated)
        #[arg(long, value_delimiter = ',')]
        setup_requires: Vec<String>,

        /// Do not probe optional build dependencies
        #[arg(long)]
        no_probe: bool,

        /// Preference order of published files (anywheel, sdist, manylinuxwheel)
        #[arg(short = 't', long, value_delimiter = ',')]
        pkgtypes: Vec<String>,

        /// Only synthesize descriptors for the requested distributions
        #[arg(short = 'd', long)]
        no_deps: bool,

        /// Resolve up to N roots in parallel, each in its own pass
        #[arg(short, long, default_value = "1")]
        jobs: usize,

        /// Output format
        #[arg(long, value_enum, default_value = "summary")]
        format: OutputFormat,

        /// Write the output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List natively packaged distributions with newer upstream releases
    Outdated {
        /// Output format
        #[arg(long, value_enum, default_value = "summary")]
        format: OutputFormat,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The full resolution report as JSON
    Json,
    /// Human-readable summary
    Summary,
}
