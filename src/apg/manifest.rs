// src/apg/manifest.rs

//! Checksum manifest (`<algo>sums`)
//!
//! One line per staged regular file, sorted by archive path:
//!
//! ```text
//! 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824  data/usr/bin/hello
//! ```
//!
//! Directories and symlinks have no entry.

use super::stage::StagedPackage;
use crate::error::{Error, Result};
use crate::hash::{self, Hash, HashAlgorithm};
use rayon::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumManifest {
    algorithm: HashAlgorithm,
    entries: BTreeMap<String, String>,
}

impl ChecksumManifest {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            entries: BTreeMap::new(),
        }
    }

    /// Hash every regular file of a staged package
    pub fn compute(staged: &StagedPackage, algorithm: HashAlgorithm) -> Result<Self> {
        let files: Vec<(&str, &std::path::Path)> = staged.files().collect();
        let digests = files
            .par_iter()
            .map(|(path, source)| {
                hash::hash_file(algorithm, source)
                    .map(|digest| (path.to_string(), digest.value))
                    .map_err(|e| {
                        Error::ArchiveBuild(format!("cannot hash {}: {}", source.display(), e))
                    })
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            algorithm,
            entries: digests,
        })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Archive member name, e.g. `sha256sums`
    pub fn file_name(&self) -> String {
        self.algorithm.manifest_name()
    }

    pub fn insert(&mut self, path: impl Into<String>, digest: Hash) {
        self.entries.insert(path.into(), digest.value);
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_str()))
    }

    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(|(path, digest)| format!("{}  {}\n", digest, path))
            .collect()
    }

    /// Parse manifest text written by [`ChecksumManifest::to_text`]
    pub fn parse(text: &str, algorithm: HashAlgorithm) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (digest, path) = line.split_once("  ").ok_or_else(|| {
                Error::ArchiveBuild(format!("malformed manifest line {}: {}", lineno + 1, line))
            })?;
            let hash = Hash::new(algorithm, digest).map_err(|e| {
                Error::ArchiveBuild(format!("bad digest on manifest line {}: {}", lineno + 1, e))
            })?;
            entries.insert(path.to_string(), hash.value);
        }
        Ok(Self { algorithm, entries })
    }
}
