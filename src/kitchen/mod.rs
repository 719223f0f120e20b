// src/kitchen/mod.rs

//! Kitchen: where recipes are cooked into `.apg` packages
//!
//! One [`Kitchen::cook`] call runs the whole pipeline for a recipe:
//! version resolution, source fetch, build dependency installation, the
//! template's build and install steps, staging, archiving and signing.
//! Every run gets its own temporary working tree, removed on exit unless
//! `engine.keep_builddir` is set.

mod cook;
pub mod context;
pub mod makedepends;
pub mod runner;

pub use context::BuildContext;
pub use makedepends::{
    DependencyReport, HostPackageManager, InstallStatus, NoopPackageManager, PackageManager,
};
pub use runner::{CancelFlag, CommandOutput, CommandRunner, CommandSpec, Deadline};

use crate::apg::signing::signer_from_config;
use crate::apg::{ChecksumManifest, Metadata, PackageSigner, SignatureArtifact};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::recipe::{LoadedRecipe, Recipe};
use crate::source::{FetchedSource, SourceFetcher};
use cook::Cook;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of a successful cook
#[derive(Debug, Clone)]
pub struct CookResult {
    /// Recipe as built, with its version resolved
    pub recipe: Recipe,
    pub archive_path: PathBuf,
    pub signature: Option<SignatureArtifact>,
    pub manifest: ChecksumManifest,
    pub metadata: Metadata,
    pub dependencies: DependencyReport,
    /// Working tree left on disk when `keep_builddir` is set
    pub build_dir: Option<PathBuf>,
    pub log: String,
    pub warnings: Vec<String>,
}

/// The Kitchen: runs recipes through the build pipeline
pub struct Kitchen {
    pub(crate) config: EngineConfig,
    package_manager: Arc<dyn PackageManager>,
    signer: Option<Arc<dyn PackageSigner>>,
    cancel: CancelFlag,
}

impl Kitchen {
    /// Create a Kitchen wired up from `config`
    pub fn new(config: EngineConfig) -> Self {
        let package_manager: Arc<dyn PackageManager> = if config.dependencies.enabled {
            Arc::new(HostPackageManager::new(&config.dependencies))
        } else {
            Arc::new(NoopPackageManager)
        };
        let signer = signer_from_config(&config.signing).map(Arc::from);
        Self {
            config,
            package_manager,
            signer,
            cancel: CancelFlag::new(),
        }
    }

    /// Replace the host package manager
    pub fn with_package_manager(mut self, manager: Arc<dyn PackageManager>) -> Self {
        self.package_manager = manager;
        self
    }

    /// Replace the signer; `None` disables signing
    pub fn with_signer(mut self, signer: Option<Arc<dyn PackageSigner>>) -> Self {
        self.signer = signer;
        self
    }

    /// Share a cancellation flag with the caller (e.g. a Ctrl-C handler)
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Runner for one pipeline run; the signing key variable never reaches
    /// a child process
    fn runner(&self) -> CommandRunner {
        CommandRunner::new(Deadline::new(
            self.config.pipeline_timeout(),
            self.cancel.clone(),
        ))
        .hide_env(&self.config.signing.key_env)
    }

    /// Cook a recipe into a signed package
    ///
    /// ## Pipeline
    /// 1. **Resolve**: pin `latest` to a concrete upstream version
    /// 2. **Prep**: fetch, verify and unpack the source
    /// 3. **Gather**: install missing build dependencies
    /// 4. **Simmer**: run the template's build and install steps
    /// 5. **Plate**: stage the destination root and write the archive
    /// 6. **Sign**: write the detached signature
    ///
    /// Nothing is written to the output directory unless every step up to
    /// plating succeeded.
    pub fn cook(&self, loaded: &LoadedRecipe) -> Result<CookResult> {
        let recipe = &loaded.recipe;
        info!(
            "Cooking {} version {}",
            recipe.package.name, recipe.package.version
        );

        let runner = self.runner();
        let fetcher = SourceFetcher::new(&self.config.fetch, &runner)?;
        let resolved = fetcher.resolve(recipe)?;
        if resolved.package.version != recipe.package.version {
            info!(
                "Resolved {} to version {}",
                resolved.package.name, resolved.package.version
            );
        }

        let mut cook = Cook::new(self, loaded, resolved, &runner)?;

        let outcome = (|| -> Result<_> {
            info!("Prep: fetching ingredients...");
            cook.prep(&fetcher)?;

            info!("Gathering build dependencies...");
            cook.gather()?;

            info!("Simmering: running build...");
            cook.simmer()?;

            info!("Plating: creating APG package...");
            let (metadata, built) = cook.plate()?;

            let signature = cook.sign(&built.path)?;
            Ok((metadata, built, signature))
        })();

        let build_dir = if self.config.engine.keep_builddir {
            cook.ctx.keep();
            Some(cook.ctx.path().to_path_buf())
        } else {
            None
        };

        let (metadata, built, signature) = outcome?;
        info!("Cooked {}", built.path.display());
        Ok(CookResult {
            recipe: cook.recipe,
            archive_path: built.path,
            signature,
            manifest: built.manifest,
            metadata,
            dependencies: cook.dependencies,
            build_dir,
            log: cook.log,
            warnings: cook.warnings,
        })
    }

    /// Pin a `latest` version without fetching anything else
    pub fn resolve(&self, recipe: &Recipe) -> Result<Recipe> {
        let runner = self.runner();
        SourceFetcher::new(&self.config.fetch, &runner)?.resolve(recipe)
    }

    /// Fetch and unpack a recipe's source without building
    ///
    /// The archive lands in `dest/download`, the tree in `dest/source`.
    pub fn fetch(&self, loaded: &LoadedRecipe, dest: &Path) -> Result<(Recipe, FetchedSource)> {
        let runner = self.runner();
        let fetcher = SourceFetcher::new(&self.config.fetch, &runner)?;
        let resolved = fetcher.resolve(&loaded.recipe)?;
        info!(
            "Fetching sources for {} version {}",
            resolved.package.name, resolved.package.version
        );

        let download_dir = dest.join("download");
        let source_dir = dest.join("source");
        fs::create_dir_all(&download_dir)?;
        fs::create_dir_all(&source_dir)?;
        let fetched = fetcher.fetch(&resolved, &loaded.base_dir, &download_dir, &source_dir)?;
        info!("Source tree ready at {}", fetched.root.display());
        Ok((resolved, fetched))
    }

    /// Cook several independent recipes, at most `jobs` at a time
    ///
    /// Each recipe runs in its own working tree with its own deadline.
    /// Results come back in input order.
    pub fn cook_all(&self, recipes: &[LoadedRecipe], jobs: usize) -> Result<Vec<Result<CookResult>>> {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        Ok(pool.install(|| {
            recipes
                .par_iter()
                .map(|loaded| {
                    let result = self.cook(loaded);
                    if let Err(e) = &result {
                        error!("{} failed: {}", loaded.recipe.package.name, e);
                    }
                    result
                })
                .collect()
        }))
    }
}
