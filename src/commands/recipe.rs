// src/commands/recipe.rs

//! Recipe commands that stop short of building

use super::load_config;
use crate::cli::BuildOverrides;
use anyhow::{Context, Result};
use apger::recipe::parse_recipe_file;
use apger::{CancelFlag, Kitchen};
use std::path::Path;

/// Validate a recipe and print what would be built
pub fn cmd_validate(recipe_path: &Path, config_path: Option<&Path>, resolve: bool) -> Result<()> {
    let loaded = parse_recipe_file(recipe_path)
        .with_context(|| format!("Recipe validation failed: {}", recipe_path.display()))?;
    let recipe = &loaded.recipe;

    println!("Recipe: {} version {}", recipe.package.name, recipe.package.version);
    println!("  Type:     {}", recipe.package.package_type.as_str());
    println!("  Template: {}", recipe.template());
    println!("  Source:   {}", recipe.package.source);
    if !recipe.build.dependencies.is_empty() {
        println!("  Build deps: {}", recipe.build.dependencies.join(", "));
    }
    if !recipe.build.use_flags.is_empty() {
        println!("  Use flags:  {}", recipe.build.use_flags.join(", "));
    }

    if resolve && recipe.needs_version_resolution() {
        let config = load_config(config_path, &BuildOverrides::default())?;
        let resolved = Kitchen::new(config)
            .resolve(recipe)
            .context("Failed to resolve latest version")?;
        println!("  Resolved: {} -> {}", recipe.package.version, resolved.package.version);
        println!("  Archive:  {}", resolved.archive_name());
    } else if !recipe.needs_version_resolution() {
        println!("  Archive:  {}", recipe.archive_name());
    }

    for warning in &loaded.warnings {
        println!("Warning: {}", warning);
    }
    if loaded.warnings.is_empty() {
        println!("[OK] No issues found");
    } else {
        println!("[OK] {} warning(s)", loaded.warnings.len());
    }
    Ok(())
}

/// Fetch and unpack sources without building
pub fn cmd_fetch(
    recipe_path: &Path,
    dest: &Path,
    config_path: Option<&Path>,
    cancel: CancelFlag,
) -> Result<()> {
    let loaded = parse_recipe_file(recipe_path)
        .with_context(|| format!("Failed to parse recipe: {}", recipe_path.display()))?;
    let config = load_config(config_path, &BuildOverrides::default())?;
    let kitchen = Kitchen::new(config).with_cancel_flag(cancel);

    println!("Fetching sources (fetch-only mode)...");
    let (resolved, fetched) = kitchen
        .fetch(&loaded, dest)
        .with_context(|| format!("Failed to fetch sources for {}", loaded.recipe.package.name))?;

    println!(
        "\n[COMPLETE] {} {} source ready",
        resolved.package.name, resolved.package.version
    );
    if let Some(archive) = &fetched.archive {
        println!("  Archive: {}", archive.display());
    }
    if let Some(digest) = &fetched.digest {
        println!("  Digest:  {}", digest.to_prefixed_string());
    }
    println!("  Tree:    {}", fetched.root.display());
    Ok(())
}
