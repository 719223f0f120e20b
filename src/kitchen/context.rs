// src/kitchen/context.rs

//! Per-run working tree and build environment

use crate::error::{Error, Result};
use crate::recipe::Recipe;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Temporary directories and environment for one pipeline run
///
/// The tree is removed when the context is dropped, whether the run
/// succeeded or not, unless [`BuildContext::keep`] was called.
#[derive(Debug)]
pub struct BuildContext {
    root: Option<TempDir>,
    kept: Option<PathBuf>,
    pub download_dir: PathBuf,
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub destdir: PathBuf,
    /// Unpacked source root, set after fetching
    pub source_root: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl BuildContext {
    /// Create a fresh working tree under `work_root`
    pub fn new(recipe: &Recipe, work_root: &Path, jobs: u32) -> Result<Self> {
        fs::create_dir_all(work_root)?;
        let root = tempfile::Builder::new()
            .prefix(&format!("apger-{}-", recipe.package.name))
            .tempdir_in(work_root)
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to create build directory in {}: {}", work_root.display(), e),
                ))
            })?;

        let base = root.path();
        let download_dir = base.join("download");
        let source_dir = base.join("source");
        let build_dir = base.join("build");
        let destdir = base.join("destdir");
        for dir in [&download_dir, &source_dir, &build_dir, &destdir] {
            fs::create_dir_all(dir)?;
        }
        debug!("Build directory: {}", base.display());

        let mut env = BTreeMap::new();
        env.insert("PACKAGE_NAME".to_string(), recipe.package.name.clone());
        env.insert("PACKAGE_VERSION".to_string(), recipe.package.version.clone());
        env.insert("DESTDIR".to_string(), destdir.to_string_lossy().into_owned());
        env.insert("APG_PREFIX".to_string(), recipe.build.prefix.clone());
        env.insert("BUILDDIR".to_string(), build_dir.to_string_lossy().into_owned());
        env.insert("MAKEFLAGS".to_string(), format!("-j{}", jobs));
        for (key, value) in &recipe.build.environment {
            env.insert(key.clone(), recipe.substitute(value));
        }

        Ok(Self {
            root: Some(root),
            kept: None,
            download_dir,
            source_dir,
            build_dir,
            destdir,
            source_root: None,
            env,
        })
    }

    /// Root of the working tree
    pub fn path(&self) -> &Path {
        match (&self.root, &self.kept) {
            (Some(root), _) => root.path(),
            (None, Some(kept)) => kept,
            (None, None) => Path::new(""),
        }
    }

    /// Record the unpacked source root; exported as `SRCDIR`
    pub fn set_source_root(&mut self, root: PathBuf) {
        self.env
            .insert("SRCDIR".to_string(), root.to_string_lossy().into_owned());
        self.source_root = Some(root);
    }

    /// Directory build steps run in
    pub fn work_dir(&self, workdir: Option<&str>) -> PathBuf {
        let root = self.source_root.as_ref().unwrap_or(&self.source_dir);
        match workdir {
            Some(sub) => root.join(sub),
            None => root.clone(),
        }
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Keep the working tree on disk after the run
    pub fn keep(&mut self) {
        if let Some(root) = self.root.take() {
            let path = root.keep();
            info!("Keeping build directory {}", path.display());
            self.kept = Some(path);
        }
    }
}
