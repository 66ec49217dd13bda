// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_name("PATH")
        .global(true)
        .help("Configuration file (default: ~/.config/pypi2pkg/config.toml)")
}

fn build_cli() -> Command {
    Command::new("pypi2pkg")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pypi2pkg Contributors")
        .about("Resolve PyPI distributions into native package descriptors")
        .subcommand_required(false)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable debug logging"),
        )
        .arg(config_arg())
        .subcommand(
            Command::new("resolve")
                .about("Resolve distributions and synthesize package descriptors")
                .arg(
                    Arg::new("packages")
                        .num_args(1..)
                        .required_unless_present("update")
                        .help("Distributions: NAME, NAME==VERSION, git+URL or file://PATH"),
                )
                .arg(
                    Arg::new("update")
                        .long("update")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("packages")
                        .help("Resolve every outdated natively packaged distribution instead"),
                )
                .arg(
                    Arg::new("ignore")
                        .long("ignore")
                        .value_delimiter(',')
                        .requires("update")
                        .help("Distributions left alone by --update (comma separated)"),
                )
                .arg(
                    Arg::new("pre")
                        .long("pre")
                        .action(ArgAction::SetTrue)
                        .help("Allow pre-releases when choosing versions"),
                )
                .arg(Arg::new("pkgrel").long("pkgrel").help("Release number of generated packages"))
                .arg(Arg::new("prefix").long("prefix").help("Prefix of native package names"))
                .arg(
                    Arg::new("conglomerate")
                        .long("conglomerate")
                        .value_name("NAME")
                        .action(ArgAction::Append)
                        .help("Split this distribution into components (repeatable)"),
                )
                .arg(
                    Arg::new("setup_requires")
                        .long("setup-requires")
                        .value_delimiter(',')
                        .help("Build dependencies forced into every package (comma separated)"),
                )
                .arg(
                    Arg::new("no_probe")
                        .long("no-probe")
                        .action(ArgAction::SetTrue)
                        .help("Do not probe optional build dependencies"),
                )
                .arg(
                    Arg::new("pkgtypes")
                        .short('t')
                        .long("pkgtypes")
                        .value_delimiter(',')
                        .help("Preference order of published files (anywheel, sdist, manylinuxwheel)"),
                )
                .arg(
                    Arg::new("no_deps")
                        .short('d')
                        .long("no-deps")
                        .action(ArgAction::SetTrue)
                        .help("Only synthesize descriptors for the requested distributions"),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .default_value("1")
                        .help("Resolve up to N roots in parallel, each in its own pass"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_parser(["json", "summary"])
                        .default_value("summary")
                        .help("Output format"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Write the output to a file instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("outdated")
                .about("List natively packaged distributions with newer upstream releases")
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_parser(["json", "summary"])
                        .default_value("summary")
                        .help("Output format"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell to generate completions for"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("pypi2pkg.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
