// src/apg/metadata.rs

//! `metadata.json`: the package identity record
//!
//! Field order is the declaration order below and never changes, so two
//! archives of the same recipe carry byte-identical metadata.

use crate::error::{Error, Result};
use crate::recipe::{PackageType, Recipe};
use serde::{Deserialize, Serialize};

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub package_type: PackageType,
    pub architecture: String,
    pub description: String,
    pub maintainer: String,
    pub license: String,
    pub tags: Vec<String>,
    pub homepage: String,
    pub dependencies: Vec<String>,
    pub conflicts: Vec<String>,
    pub provides: Vec<String>,
    pub replaces: Vec<String>,
    pub conf: Vec<String>,
}

impl Metadata {
    /// Package identity of a resolved recipe
    pub fn from_recipe(recipe: &Recipe) -> Self {
        let pkg = &recipe.package;
        Self {
            name: pkg.name.clone(),
            version: pkg.version.clone(),
            package_type: pkg.package_type,
            architecture: pkg.architecture.clone(),
            description: pkg.description.clone(),
            maintainer: pkg.maintainer.clone(),
            license: pkg.license.clone(),
            tags: pkg.tags.clone(),
            homepage: pkg.homepage.clone(),
            dependencies: pkg.dependencies.clone(),
            conflicts: pkg.conflicts.clone(),
            provides: pkg.provides.clone(),
            replaces: pkg.replaces.clone(),
            conf: pkg.conf.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::ArchiveBuild(format!("cannot serialize metadata: {}", e)))?;
        json.push('\n');
        Ok(json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::ArchiveBuild(format!("invalid {}: {}", METADATA_FILE, e)))
    }
}

#[cfg(test)]
pub(crate) fn test_metadata() -> Metadata {
    Metadata {
        name: "hello".into(),
        version: "2.12".into(),
        package_type: PackageType::Binary,
        architecture: "x86_64".into(),
        description: "GNU Hello".into(),
        maintainer: "Jane Doe <jane@example.org>".into(),
        license: "GPL-3.0-or-later".into(),
        tags: vec!["demo".into()],
        homepage: "https://www.gnu.org/software/hello/".into(),
        dependencies: vec!["glibc".into()],
        conflicts: Vec::new(),
        provides: Vec::new(),
        replaces: Vec::new(),
        conf: vec!["/etc/hello.conf".into()],
    }
}
