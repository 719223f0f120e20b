// src/apg/inspect.rs

//! Read an `.apg` archive back and check it against its own manifest

use super::metadata::{Metadata, METADATA_FILE};
use super::manifest::ChecksumManifest;
use crate::compression::{create_decoder, CompressionFormat};
use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tar::EntryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub kind: EntryKind,
    pub mode: u32,
    pub size: u64,
    pub link_target: Option<String>,
}

/// Everything learned from one archive
#[derive(Debug, Clone)]
pub struct InspectReport {
    pub path: PathBuf,
    pub entries: Vec<ArchiveEntry>,
    pub metadata: Metadata,
    pub manifest: ChecksumManifest,
    /// Files whose digest differs from the manifest
    pub mismatches: Vec<String>,
    /// Manifest entries with no file in the archive
    pub missing: Vec<String>,
    /// Payload files the manifest does not list
    pub unlisted: Vec<String>,
}

impl InspectReport {
    pub fn is_intact(&self) -> bool {
        self.mismatches.is_empty() && self.missing.is_empty() && self.unlisted.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| e.kind == EntryKind::File).count()
    }
}

fn open_archive(path: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
    let file = File::open(path)
        .map_err(|e| Error::ArchiveBuild(format!("cannot open {}: {}", path.display(), e)))?;
    let decoder = create_decoder(BufReader::new(file), CompressionFormat::Zstd)
        .map_err(|e| Error::ArchiveBuild(e.to_string()))?;
    Ok(tar::Archive::new(decoder))
}

fn corrupt(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::ArchiveBuild(format!("corrupt archive {}: {}", path.display(), e))
}

fn is_payload(path: &str) -> bool {
    ["data/", "home/", "scripts/"]
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Read `archive`, list its entries and verify every payload digest
pub fn inspect(archive: &Path) -> Result<InspectReport> {
    // Pass 1: entry list, metadata and manifest (stored at the end)
    let mut entries = Vec::new();
    let mut metadata_json = None;
    let mut manifest_text = None;
    let mut tar = open_archive(archive)?;
    for entry in tar.entries().map_err(|e| corrupt(archive, e))? {
        let mut entry = entry.map_err(|e| corrupt(archive, e))?;
        let header = entry.header();
        let path = entry
            .path()
            .map_err(|e| corrupt(archive, e))?
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();
        let kind = match header.entry_type() {
            EntryType::Regular => EntryKind::File,
            EntryType::Directory => EntryKind::Dir,
            EntryType::Symlink => EntryKind::Symlink,
            _ => EntryKind::Other,
        };
        let link_target = entry
            .link_name()
            .map_err(|e| corrupt(archive, e))?
            .map(|t| t.to_string_lossy().into_owned());
        let mode = header.mode().map_err(|e| corrupt(archive, e))?;
        let size = header.size().map_err(|e| corrupt(archive, e))?;

        if path == METADATA_FILE {
            let mut json = String::new();
            entry.read_to_string(&mut json)?;
            metadata_json = Some(json);
        } else if let Some(algo) = path.strip_suffix("sums")
            && !path.contains('/')
        {
            let algorithm: HashAlgorithm = algo
                .parse()
                .map_err(|e| corrupt(archive, format!("unknown manifest {}: {}", path, e)))?;
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            manifest_text = Some((algorithm, text));
        }

        entries.push(ArchiveEntry {
            path,
            kind,
            mode,
            size,
            link_target,
        });
    }

    let metadata = Metadata::from_json(
        &metadata_json.ok_or_else(|| corrupt(archive, format!("no {}", METADATA_FILE)))?,
    )?;
    let (algorithm, text) =
        manifest_text.ok_or_else(|| corrupt(archive, "no checksum manifest"))?;
    let manifest = ChecksumManifest::parse(&text, algorithm)?;

    // Pass 2: hash payload files
    let mut actual = BTreeMap::new();
    let mut tar = open_archive(archive)?;
    for entry in tar.entries().map_err(|e| corrupt(archive, e))? {
        let mut entry = entry.map_err(|e| corrupt(archive, e))?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| corrupt(archive, e))?
            .to_string_lossy()
            .into_owned();
        if is_payload(&path) {
            let digest = hash::hash_reader(algorithm, &mut entry)?;
            actual.insert(path, digest.value);
        }
    }

    let mut mismatches = Vec::new();
    let mut missing = Vec::new();
    for (path, expected) in manifest.iter() {
        match actual.get(path) {
            Some(digest) if digest == expected => {}
            Some(_) => mismatches.push(path.to_string()),
            None => missing.push(path.to_string()),
        }
    }
    let unlisted = actual
        .keys()
        .filter(|path| manifest.get(path).is_none())
        .cloned()
        .collect();

    Ok(InspectReport {
        path: archive.to_path_buf(),
        entries,
        metadata,
        manifest,
        mismatches,
        missing,
        unlisted,
    })
}
