// src/apg/stage.rs

//! Staged package tree
//!
//! Collects everything that goes into an archive from the places the build
//! left it: the destination root becomes `data/`, the optional home overlay
//! becomes `home/`, and lifecycle scripts land in `scripts/`. Entries are
//! keyed by archive path so iteration order is the archive order.
//!
//! A [`FilesystemOverlay`] can add directories, files and symlinks to the
//! destination root before it is staged:
//!
//! ```yaml
//! directories:
//!   - path: /var/lib/hello
//!     permissions: "0750"
//! files:
//!   - source: files/hello.conf
//!     destination: /etc/hello/hello.conf
//!     permissions: "0644"
//! symlinks:
//!   - source: /usr/bin/hello
//!     destination: /usr/bin/hi
//! ```

use super::metadata::Metadata;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Lifecycle scripts the external installer knows about
pub const LIFECYCLE_SCRIPTS: [&str; 4] = ["pre-install", "post-install", "pre-remove", "post-remove"];

pub const DATA_DIR: &str = "data";
pub const HOME_DIR: &str = "home";
pub const SCRIPTS_DIR: &str = "scripts";

/// One staged filesystem object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedEntry {
    /// Regular file; content is read from `source` when archiving
    File { source: PathBuf, mode: u32, size: u64 },
    Symlink { target: PathBuf, mode: u32 },
    Dir { mode: u32 },
}

impl StagedEntry {
    pub fn mode(&self) -> u32 {
        match self {
            Self::File { mode, .. } | Self::Symlink { mode, .. } | Self::Dir { mode } => *mode,
        }
    }
}

/// Complete archive contents, ready to be packed
#[derive(Debug, Clone)]
pub struct StagedPackage {
    entries: BTreeMap<String, StagedEntry>,
    metadata: Metadata,
}

impl StagedPackage {
    /// Assemble the staged tree
    ///
    /// Fails with [`Error::Staging`] when `destdir` holds no files or
    /// symlinks, or when a declared overlay directory does not exist.
    pub fn assemble(
        destdir: &Path,
        home: Option<&Path>,
        scripts: Option<&Path>,
        metadata: Metadata,
    ) -> Result<Self> {
        let mut entries = BTreeMap::new();

        let payload = add_tree(&mut entries, destdir, DATA_DIR)?;
        if payload == 0 {
            return Err(Error::Staging(format!(
                "destination root {} is empty after install",
                destdir.display()
            )));
        }

        if let Some(home) = home {
            if !home.is_dir() {
                return Err(Error::Staging(format!(
                    "home overlay {} is not a directory",
                    home.display()
                )));
            }
            add_tree(&mut entries, home, HOME_DIR)?;
        }

        entries.insert(SCRIPTS_DIR.to_string(), StagedEntry::Dir { mode: 0o755 });
        if let Some(dir) = scripts {
            if !dir.is_dir() {
                return Err(Error::Staging(format!(
                    "scripts directory {} is not a directory",
                    dir.display()
                )));
            }
            add_scripts(&mut entries, dir)?;
        }

        debug!("Staged {} entries", entries.len());
        Ok(Self { entries, metadata })
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &StagedEntry)> {
        self.entries.iter().map(|(path, entry)| (path.as_str(), entry))
    }

    pub fn get(&self, path: &str) -> Option<&StagedEntry> {
        self.entries.get(path)
    }

    /// Regular files only, in path order
    pub fn files(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries().filter_map(|(path, entry)| match entry {
            StagedEntry::File { source, .. } => Some((path, source.as_path())),
            _ => None,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn has_home(&self) -> bool {
        self.entries.contains_key(HOME_DIR)
    }
}

/// Add `root` under `prefix`; returns the number of files and symlinks
fn add_tree(entries: &mut BTreeMap<String, StagedEntry>, root: &Path, prefix: &str) -> Result<usize> {
    let mut payload = 0;
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Staging(format!("cannot walk {}: {}", root.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| Error::Staging(e.to_string()))?;
        let archive_path = archive_path(prefix, relative)?;
        let meta = entry
            .path()
            .symlink_metadata()
            .map_err(|e| Error::Staging(format!("cannot stat {}: {}", entry.path().display(), e)))?;
        let mode = meta.permissions().mode() & 0o7777;
        let file_type = meta.file_type();

        let staged = if file_type.is_dir() {
            StagedEntry::Dir { mode }
        } else if file_type.is_symlink() {
            payload += 1;
            StagedEntry::Symlink {
                target: fs::read_link(entry.path())?,
                mode,
            }
        } else if file_type.is_file() {
            payload += 1;
            StagedEntry::File {
                source: entry.path().to_path_buf(),
                mode,
                size: meta.len(),
            }
        } else {
            return Err(Error::Staging(format!(
                "unsupported file type at {}",
                entry.path().display()
            )));
        };
        entries.insert(archive_path, staged);
    }
    Ok(payload)
}

fn add_scripts(entries: &mut BTreeMap<String, StagedEntry>, dir: &Path) -> Result<()> {
    for name in LIFECYCLE_SCRIPTS {
        let path = dir.join(name);
        if !path.is_file() {
            debug!("No {} script", name);
            continue;
        }
        let meta = fs::metadata(&path)?;
        let mode = meta.permissions().mode() & 0o7777;
        if mode & 0o111 == 0 {
            warn!("Lifecycle script {} is not executable", path.display());
        }
        entries.insert(
            format!("{}/{}", SCRIPTS_DIR, name),
            StagedEntry::File {
                source: path,
                mode,
                size: meta.len(),
            },
        );
    }
    Ok(())
}

/// Extra layout for the destination root
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemOverlay {
    #[serde(default)]
    pub directories: Vec<OverlayDirectory>,
    #[serde(default)]
    pub files: Vec<OverlayFile>,
    #[serde(default)]
    pub symlinks: Vec<OverlaySymlink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OverlayDirectory {
    pub path: String,
    /// Octal mode such as `"0755"`
    #[serde(default)]
    pub permissions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OverlayFile {
    /// Relative to the recipe directory
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub permissions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OverlaySymlink {
    /// Link target, stored verbatim
    pub source: String,
    pub destination: String,
}

impl FilesystemOverlay {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Staging(format!("cannot read filesystem overlay {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            Error::Staging(format!("invalid filesystem overlay {}: {}", path.display(), e))
        })
    }

    /// Apply to `destdir`; file sources resolve against `base_dir`
    ///
    /// Directories are created first, then files copied, then symlinks made.
    pub fn apply(&self, destdir: &Path, base_dir: &Path) -> Result<()> {
        for dir in &self.directories {
            let path = overlay_target(destdir, &dir.path)?;
            fs::create_dir_all(&path).map_err(|e| overlay_error(&path, e))?;
            if let Some(mode) = &dir.permissions {
                set_mode(&path, mode)?;
            }
        }

        for file in &self.files {
            let source = base_dir.join(&file.source);
            if !source.is_file() {
                return Err(Error::Staging(format!(
                    "overlay file {} does not exist",
                    source.display()
                )));
            }
            let dest = overlay_target(destdir, &file.destination)?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| overlay_error(parent, e))?;
            }
            fs::copy(&source, &dest).map_err(|e| overlay_error(&dest, e))?;
            if let Some(mode) = &file.permissions {
                set_mode(&dest, mode)?;
            }
        }

        for link in &self.symlinks {
            let dest = overlay_target(destdir, &link.destination)?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| overlay_error(parent, e))?;
            }
            if dest.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
                fs::remove_file(&dest).map_err(|e| overlay_error(&dest, e))?;
            }
            std::os::unix::fs::symlink(&link.source, &dest).map_err(|e| overlay_error(&dest, e))?;
        }

        debug!(
            "Applied filesystem overlay: {} directories, {} files, {} symlinks",
            self.directories.len(),
            self.files.len(),
            self.symlinks.len()
        );
        Ok(())
    }
}

/// Resolve an absolute-style package path inside `destdir`
fn overlay_target(destdir: &Path, path: &str) -> Result<PathBuf> {
    let relative = Path::new(path.trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(Error::Staging(format!(
            "overlay path '{}' must stay inside the package",
            path
        )));
    }
    Ok(destdir.join(relative))
}

fn set_mode(path: &Path, mode: &str) -> Result<()> {
    let bits = u32::from_str_radix(mode, 8)
        .ok()
        .filter(|bits| *bits <= 0o7777)
        .ok_or_else(|| Error::Staging(format!("invalid permissions '{}' for {}", mode, path.display())))?;
    fs::set_permissions(path, fs::Permissions::from_mode(bits)).map_err(|e| overlay_error(path, e))
}

fn overlay_error(path: &Path, e: std::io::Error) -> Error {
    Error::Staging(format!("filesystem overlay failed at {}: {}", path.display(), e))
}

fn archive_path(prefix: &str, relative: &Path) -> Result<String> {
    if relative.as_os_str().is_empty() {
        return Ok(prefix.to_string());
    }
    let relative = relative.to_str().ok_or_else(|| {
        Error::Staging(format!("non-UTF-8 path {}", relative.display()))
    })?;
    Ok(format!("{}/{}", prefix, relative))
}
