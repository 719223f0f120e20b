// src/commands/cook.rs

//! Cook commands - build packages from recipes

use super::load_config;
use crate::cli::BuildOverrides;
use anyhow::{Context, Result};
use apger::recipe::parse_recipe_file;
use apger::{CancelFlag, CookResult, Kitchen, LoadedRecipe};
use std::path::{Path, PathBuf};
use tracing::info;

fn load_recipe(path: &Path) -> Result<LoadedRecipe> {
    println!("Reading recipe: {}", path.display());
    let loaded = parse_recipe_file(path)
        .with_context(|| format!("Failed to parse recipe: {}", path.display()))?;
    for warning in &loaded.warnings {
        println!("Warning: {}", warning);
    }
    Ok(loaded)
}

fn print_result(result: &CookResult) {
    println!("\n[COMPLETE] Cooked: {}", result.archive_path.display());
    println!("  Files:    {}", result.manifest.len());
    match &result.signature {
        Some(sig) => println!("  Signature: {} ({})", sig.path.display(), sig.backend.as_str()),
        None => println!("  Signature: none"),
    }
    if let Some(dir) = &result.build_dir {
        println!("  Build directory kept at {}", dir.display());
    }
    if !result.dependencies.newly_installed.is_empty() {
        println!(
            "  Installed build dependencies: {}",
            result.dependencies.newly_installed.join(", ")
        );
    }

    if !result.warnings.is_empty() {
        println!("\nBuild warnings:");
        for warning in &result.warnings {
            println!("  - {}", warning);
        }
    }
}

/// Cook a package from a recipe
pub fn cmd_cook(
    recipe_path: &Path,
    config_path: Option<&Path>,
    overrides: &BuildOverrides,
    log_file: Option<&PathBuf>,
    cancel: CancelFlag,
) -> Result<()> {
    let loaded = load_recipe(recipe_path)?;
    let recipe = &loaded.recipe;
    println!("Recipe: {} version {}", recipe.package.name, recipe.package.version);

    let config = load_config(config_path, overrides)?;
    println!(
        "Cooking with {} parallel jobs ({} template)...",
        config.build.jobs(),
        recipe.template()
    );
    if !config.signing.enabled {
        println!("[WARNING] Signing disabled - package will be unsigned");
    }

    let kitchen = Kitchen::new(config).with_cancel_flag(cancel);
    let result = kitchen
        .cook(&loaded)
        .with_context(|| format!("Failed to cook {}", recipe.package.name))?;

    if let Some(path) = log_file {
        std::fs::write(path, &result.log)
            .with_context(|| format!("Failed to write build log: {}", path.display()))?;
        println!("Build log written to {}", path.display());
    }
    print_result(&result);

    info!(
        "Successfully cooked {} to {}",
        result.recipe.package.name,
        result.archive_path.display()
    );
    Ok(())
}

/// Cook several recipes, `parallel` at a time
pub fn cmd_cook_all(
    recipe_paths: &[PathBuf],
    parallel: usize,
    config_path: Option<&Path>,
    overrides: &BuildOverrides,
    cancel: CancelFlag,
) -> Result<()> {
    let recipes = recipe_paths
        .iter()
        .map(|path| load_recipe(path))
        .collect::<Result<Vec<_>>>()?;

    let config = load_config(config_path, overrides)?;
    let kitchen = Kitchen::new(config).with_cancel_flag(cancel);
    println!("Cooking {} recipe(s), {} at a time...", recipes.len(), parallel);

    let results = kitchen.cook_all(&recipes, parallel)?;

    let mut failed = Vec::new();
    println!();
    for (loaded, result) in recipes.iter().zip(&results) {
        let name = &loaded.recipe.package.name;
        match result {
            Ok(done) => println!("[OK]     {} -> {}", name, done.archive_path.display()),
            Err(e) => {
                println!("[FAILED] {}: {}", name, e);
                failed.push(name.clone());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("{} of {} recipe(s) failed: {}", failed.len(), results.len(), failed.join(", "));
    }
    println!("\n[COMPLETE] Cooked {} package(s)", results.len());
    Ok(())
}
