// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: recipe path
fn recipe_arg() -> Arg {
    Arg::new("recipe")
        .required(true)
        .value_name("RECIPE")
        .help("Path to the recipe (JSON or YAML)")
}

/// Build flags shared by cook and cook-all
fn build_args() -> Vec<Arg> {
    vec![
        Arg::new("output_dir")
            .short('o')
            .long("output-dir")
            .value_name("DIR")
            .help("Output directory for built packages"),
        Arg::new("work_root")
            .long("work-root")
            .value_name("DIR")
            .help("Parent directory for temporary build trees"),
        Arg::new("jobs")
            .short('j')
            .long("jobs")
            .value_name("N")
            .help("Parallel jobs passed to the build system"),
        Arg::new("timeout")
            .long("timeout")
            .value_name("SECS")
            .help("Whole-pipeline timeout in seconds"),
        Arg::new("keep_builddir")
            .long("keep-builddir")
            .action(ArgAction::SetTrue)
            .help("Keep the build directory after the run"),
        Arg::new("no_sign")
            .long("no-sign")
            .action(ArgAction::SetTrue)
            .help("Produce an unsigned package"),
        Arg::new("no_deps")
            .long("no-deps")
            .action(ArgAction::SetTrue)
            .help("Assume build dependencies are already installed"),
    ]
}

fn build_cli() -> Command {
    Command::new("apger")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Build signed APG packages from recipes")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .value_name("FILE")
                .help("Engine configuration file"),
        )
        .subcommand(
            Command::new("cook")
                .about("Build a package from a recipe")
                .arg(recipe_arg())
                .args(build_args())
                .arg(
                    Arg::new("log_file")
                        .long("log-file")
                        .value_name("FILE")
                        .help("Write the build log to this file"),
                ),
        )
        .subcommand(
            Command::new("cook-all")
                .about("Build several independent recipes concurrently")
                .arg(
                    Arg::new("recipes")
                        .required(true)
                        .num_args(1..)
                        .value_name("RECIPE")
                        .help("Recipe files"),
                )
                .arg(
                    Arg::new("parallel")
                        .short('p')
                        .long("parallel")
                        .default_value("2")
                        .help("Number of recipes built at the same time"),
                )
                .args(build_args()),
        )
        .subcommand(
            Command::new("validate")
                .about("Check a recipe without building it")
                .arg(recipe_arg())
                .arg(
                    Arg::new("resolve")
                        .long("resolve")
                        .action(ArgAction::SetTrue)
                        .help("Also resolve a `latest` version against upstream"),
                ),
        )
        .subcommand(
            Command::new("fetch")
                .about("Download and unpack a recipe's source without building")
                .arg(recipe_arg())
                .arg(
                    Arg::new("dest")
                        .short('d')
                        .long("dest")
                        .default_value("./apger-src")
                        .help("Destination directory"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Show the contents of a package and verify its checksums")
                .arg(Arg::new("package").required(true).help("Path to the .apg file"))
                .arg(
                    Arg::new("files")
                        .short('f')
                        .long("files")
                        .action(ArgAction::SetTrue)
                        .help("List every archive member"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .default_value("text")
                        .help("Output format: text or json"),
                )
                .arg(
                    Arg::new("public_key")
                        .long("public-key")
                        .value_name("FILE")
                        .help("Verify an ed25519 detached signature against this public key file"),
                ),
        )
        .subcommand(
            Command::new("keygen")
                .about("Generate an ed25519 signing key pair")
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .default_value("apger-signing")
                        .help("Base path; writes <output>.private and <output>.public"),
                )
                .arg(Arg::new("key_id").long("key-id").help("Key identifier recorded in signatures"))
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite existing key files"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(Arg::new("shell").required(true).help("Shell to generate completions for")),
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

    let man_path = man_dir.join("apger.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
