// src/cli/mod.rs
//! CLI definitions for apger
//!
//! Only argument parsing lives here; the handlers are in `commands`.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apger")]
#[command(version)]
#[command(about = "Build signed APG packages from recipes", long_about = None)]
pub struct Cli {
    /// Engine configuration file (default: $APGER_CONFIG or ~/.config/apger/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags that override the configuration file for a build
#[derive(Args, Debug, Clone, Default)]
pub struct BuildOverrides {
    /// Output directory for built packages
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Parent directory for temporary build trees
    #[arg(long)]
    pub work_root: Option<PathBuf>,

    /// Parallel jobs passed to the build system
    #[arg(short, long)]
    pub jobs: Option<u32>,

    /// Whole-pipeline timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Keep the build directory after the run
    #[arg(long)]
    pub keep_builddir: bool,

    /// Produce an unsigned package
    #[arg(long)]
    pub no_sign: bool,

    /// Assume build dependencies are already installed
    #[arg(long)]
    pub no_deps: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a package from a recipe
    Cook {
        /// Path to the recipe (JSON or YAML)
        recipe: PathBuf,

        #[command(flatten)]
        overrides: BuildOverrides,

        /// Write the build log to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Build several independent recipes concurrently
    CookAll {
        /// Recipe files
        #[arg(required = true)]
        recipes: Vec<PathBuf>,

        /// Number of recipes built at the same time
        #[arg(short, long, default_value = "2")]
        parallel: usize,

        #[command(flatten)]
        overrides: BuildOverrides,
    },

    /// Check a recipe without building it
    Validate {
        /// Path to the recipe
        recipe: PathBuf,

        /// Also resolve a `latest` version against upstream
        #[arg(long)]
        resolve: bool,
    },

    /// Download and unpack a recipe's source without building
    Fetch {
        /// Path to the recipe
        recipe: PathBuf,

        /// Destination directory
        #[arg(short, long, default_value = "./apger-src")]
        dest: PathBuf,
    },

    /// Show the contents of a package and verify its checksums
    Inspect {
        /// Path to the .apg file
        package: PathBuf,

        /// List every archive member
        #[arg(short, long)]
        files: bool,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Verify an ed25519 detached signature against this public key file
        #[arg(long)]
        public_key: Option<PathBuf>,
    },

    /// Generate an ed25519 signing key pair
    Keygen {
        /// Base path; writes <output>.private and <output>.public
        #[arg(short, long, default_value = "apger-signing")]
        output: PathBuf,

        /// Key identifier recorded in signatures
        #[arg(long)]
        key_id: Option<String>,

        /// Overwrite existing key files
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cook_overrides() {
        let cli = Cli::try_parse_from([
            "apger", "cook", "hello.yaml", "--jobs", "8", "--no-sign", "-o", "out",
        ])
        .unwrap();
        match cli.command {
            Commands::Cook { recipe, overrides, .. } => {
                assert_eq!(recipe, PathBuf::from("hello.yaml"));
                assert_eq!(overrides.jobs, Some(8));
                assert!(overrides.no_sign);
                assert_eq!(overrides.output_dir, Some(PathBuf::from("out")));
            }
            _ => panic!("expected cook"),
        }
    }
}
