// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use commands::ResolveArgs;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging; RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Some(Commands::Resolve {
            packages,
            update,
            ignore,
            pre,
            pkgrel,
            prefix,
            conglomerates,
            setup_requires,
            no_probe,
            pkgtypes,
            no_deps,
            jobs,
            format,
            output,
        }) => {
            let args = ResolveArgs {
                packages,
                update,
                ignore,
                pre,
                pkgrel,
                prefix,
                conglomerates,
                setup_requires,
                no_probe,
                pkgtypes,
                no_deps,
                jobs,
                format,
                output,
            };
            if !commands::cmd_resolve(cli.config.as_deref(), args)? {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Outdated { format }) => commands::cmd_outdated(cli.config.as_deref(), format),
        Some(Commands::Completions { shell }) => commands::cmd_completions(shell),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
