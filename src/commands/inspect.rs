// src/commands/inspect.rs

//! Inspect command - show and verify a built package

use anyhow::{Context, Result};
use apger::apg::inspect::{inspect, EntryKind, InspectReport};
use apger::apg::signing::{load_public_key, signature_path, verify_ed25519, Ed25519SignatureDoc};
use std::fs;
use std::path::Path;

/// Inspect a package, verifying its checksum manifest
pub fn cmd_inspect(
    package: &Path,
    show_files: bool,
    format: &str,
    public_key: Option<&Path>,
) -> Result<()> {
    if !package.exists() {
        anyhow::bail!("Package not found: {}", package.display());
    }

    let report = inspect(package).context("Failed to read APG package")?;

    let signature = match public_key {
        Some(key_path) => Some(verify_signature(package, key_path)?),
        None => None,
    };

    if format == "json" {
        print_json(&report, show_files, signature.as_deref())?;
    } else {
        print_summary(&report, signature.as_deref());
        if show_files {
            println!();
            print_files(&report);
        }
        print_problems(&report);
    }

    if !report.is_intact() {
        anyhow::bail!("{} failed checksum verification", package.display());
    }
    Ok(())
}

/// Returns the key id, or "unnamed key"
fn verify_signature(package: &Path, key_path: &Path) -> Result<String> {
    let trusted = load_public_key(key_path)?;
    let sig_path = signature_path(package);
    let doc: Ed25519SignatureDoc = serde_json::from_slice(
        &fs::read(&sig_path)
            .with_context(|| format!("Failed to read signature: {}", sig_path.display()))?,
    )
    .context("Signature is not an ed25519 signature document")?;
    let content = fs::read(package)?;
    verify_ed25519(&content, &doc, Some(&trusted)).context("Signature verification failed")?;
    Ok(doc.key_id.unwrap_or_else(|| "unnamed key".to_string()))
}

fn print_summary(report: &InspectReport, signature: Option<&str>) {
    let meta = &report.metadata;
    println!("Package: {} {}", meta.name, meta.version);
    println!("  Type:         {}", meta.package_type.as_str());
    println!("  Architecture: {}", meta.architecture);
    if !meta.description.is_empty() {
        println!("  Description:  {}", meta.description);
    }
    if !meta.license.is_empty() {
        println!("  License:      {}", meta.license);
    }
    if !meta.dependencies.is_empty() {
        println!("  Depends:      {}", meta.dependencies.join(", "));
    }
    println!("  Files:        {}", report.file_count());
    println!(
        "  Manifest:     {} entries ({})",
        report.manifest.len(),
        report.manifest.algorithm()
    );
    if let Some(key_id) = signature {
        println!("  Signature:    valid ({})", key_id);
    }
    if report.is_intact() {
        println!("[OK] All checksums match");
    }
}

fn print_files(report: &InspectReport) {
    for entry in &report.entries {
        let kind = match entry.kind {
            EntryKind::File => '-',
            EntryKind::Dir => 'd',
            EntryKind::Symlink => 'l',
            EntryKind::Other => '?',
        };
        match &entry.link_target {
            Some(target) => println!("{} {:04o} {} -> {}", kind, entry.mode, entry.path, target),
            None => println!("{} {:04o} {:>10} {}", kind, entry.mode, entry.size, entry.path),
        }
    }
}

fn print_problems(report: &InspectReport) {
    for path in &report.mismatches {
        println!("[MISMATCH] {}", path);
    }
    for path in &report.missing {
        println!("[MISSING]  {}", path);
    }
    for path in &report.unlisted {
        println!("[UNLISTED] {}", path);
    }
}

fn print_json(report: &InspectReport, show_files: bool, signature: Option<&str>) -> Result<()> {
    let mut value = serde_json::json!({
        "path": report.path,
        "metadata": report.metadata,
        "checksum": report.manifest.algorithm().name(),
        "files": report.file_count(),
        "intact": report.is_intact(),
        "mismatches": report.mismatches,
        "missing": report.missing,
        "unlisted": report.unlisted,
    });
    if let Some(key_id) = signature {
        value["signature"] = serde_json::json!({ "valid": true, "key_id": key_id });
    }
    if show_files {
        value["entries"] = report
            .entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "path": e.path,
                    "mode": e.mode,
                    "size": e.size,
                    "link_target": e.link_target,
                })
            })
            .collect();
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
