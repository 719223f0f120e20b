// src/commands/mod.rs
//! Command handlers for the apger CLI

mod cook;
mod inspect;
mod keygen;
mod recipe;

pub use cook::{cmd_cook, cmd_cook_all};
pub use inspect::cmd_inspect;
pub use keygen::cmd_keygen;
pub use recipe::{cmd_fetch, cmd_validate};

use crate::cli::BuildOverrides;
use anyhow::{Context, Result};
use apger::EngineConfig;
use std::path::Path;

/// Load the engine configuration and apply command-line overrides
pub fn load_config(path: Option<&Path>, overrides: &BuildOverrides) -> Result<EngineConfig> {
    let mut config = EngineConfig::discover(path).context("Failed to load configuration")?;

    if let Some(dir) = &overrides.output_dir {
        config.engine.output_dir = dir.clone();
    }
    if let Some(dir) = &overrides.work_root {
        config.engine.work_root = dir.clone();
    }
    if let Some(jobs) = overrides.jobs {
        config.build.jobs = jobs;
    }
    if let Some(secs) = overrides.timeout {
        anyhow::ensure!(secs > 0, "--timeout must be greater than zero");
        config.engine.timeout_secs = secs;
    }
    if overrides.keep_builddir {
        config.engine.keep_builddir = true;
    }
    if overrides.no_sign {
        config.signing.enabled = false;
    }
    if overrides.no_deps {
        config.dependencies.enabled = false;
    }
    Ok(config)
}
