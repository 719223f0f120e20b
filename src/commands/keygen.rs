// src/commands/keygen.rs

//! Keygen command - create an ed25519 signing key pair

use anyhow::{Context, Result};
use apger::apg::signing::generate_keypair;
use std::fs;
use std::path::Path;

pub fn cmd_keygen(output: &Path, key_id: Option<&str>, force: bool) -> Result<()> {
    let private_path = output.with_extension("private");
    let public_path = output.with_extension("public");

    if private_path.exists() || public_path.exists() {
        if !force {
            anyhow::bail!(
                "Key files already exist. Use --force to overwrite.\n  Private: {}\n  Public: {}",
                private_path.display(),
                public_path.display()
            );
        }
        for path in [&private_path, &public_path] {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
    }

    println!("Generating Ed25519 signing key pair...");
    let public_key = generate_keypair(&private_path, &public_path, key_id)
        .context("Failed to save key files")?;

    println!();
    println!("Files created:");
    println!("  Private key: {} (keep this secret!)", private_path.display());
    println!("  Public key:  {} (share for verification)", public_path.display());
    println!();
    println!("Public key (base64):");
    println!("  {}", public_key);
    println!();
    println!("To sign packages, set in config.toml:");
    println!("  [signing]");
    println!("  backend = \"ed25519\"");
    println!("  key_file = \"{}\"", private_path.display());
    Ok(())
}
