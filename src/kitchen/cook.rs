// src/kitchen/cook.rs

//! Cook: one pipeline run for a single recipe

use super::context::BuildContext;
use super::makedepends::{DependencyInstaller, DependencyReport};
use super::runner::{CommandOutput, CommandRunner, CommandSpec};
use super::Kitchen;
use crate::apg::{
    ArchiveBuilder, BuiltArchive, FilesystemOverlay, Metadata, SignatureArtifact, StagedPackage,
};
use crate::error::{BuildPhase, Error, Result, Stage};
use crate::recipe::{LoadedRecipe, Recipe};
use crate::source::SourceFetcher;
use crate::template::{self, Action, BuildPlan, TemplateContext};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A single cook operation
pub(super) struct Cook<'a> {
    kitchen: &'a Kitchen,
    loaded: &'a LoadedRecipe,
    /// Recipe with a concrete version
    pub(super) recipe: Recipe,
    runner: &'a CommandRunner,
    pub(super) ctx: BuildContext,
    pub(super) dependencies: DependencyReport,
    /// Build log accumulator
    pub(super) log: String,
    pub(super) warnings: Vec<String>,
}

impl<'a> Cook<'a> {
    pub(super) fn new(
        kitchen: &'a Kitchen,
        loaded: &'a LoadedRecipe,
        recipe: Recipe,
        runner: &'a CommandRunner,
    ) -> Result<Self> {
        let config = &kitchen.config;
        let ctx = BuildContext::new(&recipe, &config.engine.work_root, config.build.jobs())?;
        Ok(Self {
            kitchen,
            loaded,
            recipe,
            runner,
            ctx,
            dependencies: DependencyReport::default(),
            log: String::new(),
            warnings: loaded.warnings.clone(),
        })
    }

    /// Phase 1: Prep - fetch and unpack the source
    pub(super) fn prep(&mut self, fetcher: &SourceFetcher<'_>) -> Result<()> {
        let fetched = fetcher.fetch(
            &self.recipe,
            &self.loaded.base_dir,
            &self.ctx.download_dir,
            &self.ctx.source_dir,
        )?;
        self.log_line(&format!("Fetched source: {}", self.recipe.source_url()));
        if let Some(digest) = &fetched.digest {
            self.log_line(&format!("Source digest: {}", digest.to_prefixed_string()));
        }
        self.ctx.set_source_root(fetched.root);
        Ok(())
    }

    /// Phase 2: make sure build dependencies are installed
    pub(super) fn gather(&mut self) -> Result<()> {
        let deps = &self.recipe.build.dependencies;
        if !self.kitchen.config.dependencies.enabled {
            if !deps.is_empty() {
                debug!("Dependency installation disabled, assuming {} present", deps.join(", "));
            }
            return Ok(());
        }
        let installer = DependencyInstaller::new(
            self.kitchen.package_manager.as_ref(),
            self.runner,
            &self.kitchen.config.dependencies,
        );
        self.dependencies = installer.ensure_installed(deps)?;
        if !self.dependencies.newly_installed.is_empty() {
            self.log_line(&format!(
                "Installed build dependencies: {}",
                self.dependencies.newly_installed.join(", ")
            ));
        }
        Ok(())
    }

    /// Phase 3: Simmer - run the template's build and install steps
    pub(super) fn simmer(&mut self) -> Result<()> {
        let plan = self.plan()?;
        self.run_phase(&plan, BuildPhase::Build)?;
        self.run_phase(&plan, BuildPhase::Install)
    }

    fn plan(&self) -> Result<BuildPlan> {
        let build = &self.recipe.build;
        let work_dir = self.ctx.work_dir(build.workdir.as_deref());
        if !work_dir.is_dir() {
            return Err(Error::BuildStep {
                phase: BuildPhase::Build,
                step: "prepare".to_string(),
                exit_code: None,
                output_tail: format!("build directory {} does not exist", work_dir.display()),
            });
        }

        let ctx = TemplateContext {
            source_dir: &work_dir,
            build_dir: &self.ctx.build_dir,
            destdir: &self.ctx.destdir,
            prefix: &build.prefix,
            jobs: self.kitchen.config.build.jobs(),
            use_flags: &build.use_flags,
            extra_flags: &build.extra_flags,
            build_script: build.script.as_deref(),
            install_script: self.recipe.install.script.as_deref(),
        };
        let template = self.recipe.template();
        debug!("Using {} template in {}", template, work_dir.display());
        Ok(template::plan(template, &ctx))
    }

    fn run_phase(&mut self, plan: &BuildPlan, phase: BuildPhase) -> Result<()> {
        for step in plan.phase(phase) {
            info!("Running {} step: {}", phase, step.name);
            match &step.action {
                Action::Run(spec) => self.run_command(phase, &step.name, spec)?,
                Action::InstallWheel { wheel_dir, command } => {
                    let wheel = find_wheel(wheel_dir).ok_or_else(|| Error::BuildStep {
                        phase,
                        step: step.name.clone(),
                        exit_code: None,
                        output_tail: format!("no wheel was built in {}", wheel_dir.display()),
                    })?;
                    let spec = command.clone().arg(wheel.to_string_lossy());
                    self.run_command(phase, &step.name, &spec)?;
                }
                Action::CopyExecutables { from, to } => {
                    let copied = copy_executables(from, to)?;
                    if copied.is_empty() {
                        return Err(Error::BuildStep {
                            phase,
                            step: step.name.clone(),
                            exit_code: None,
                            output_tail: format!("no executables found in {}", from.display()),
                        });
                    }
                    self.log_line(&format!("Installed binaries: {}", copied.join(", ")));
                }
                Action::CopyArtifacts {
                    from,
                    extensions,
                    to,
                } => {
                    let copied = copy_artifacts(from, extensions, to)?;
                    if copied.is_empty() {
                        return Err(Error::BuildStep {
                            phase,
                            step: step.name.clone(),
                            exit_code: None,
                            output_tail: format!(
                                "no .{} files found in {}",
                                extensions.join(" or ."),
                                from.display()
                            ),
                        });
                    }
                    self.log_line(&format!("Installed artifacts: {}", copied.join(", ")));
                }
            }
        }
        Ok(())
    }

    fn run_command(&mut self, phase: BuildPhase, name: &str, spec: &CommandSpec) -> Result<()> {
        debug!("Command: {}", spec.display());
        // Step-specific variables override the shared environment
        let mut spec = spec.clone();
        let mut env = self.ctx.env().clone();
        env.append(&mut spec.env);
        spec.env = env;

        let stage = match phase {
            BuildPhase::Build => Stage::Build,
            BuildPhase::Install => Stage::Install,
        };
        let output = self.runner.run(&spec, stage)?;
        self.log_build_output(name, &output);

        if !output.success {
            return Err(Error::BuildStep {
                phase,
                step: name.to_string(),
                exit_code: output.exit_code,
                output_tail: output.tail(self.kitchen.config.build.output_tail_lines),
            });
        }
        Ok(())
    }

    /// Phase 4: Plate - stage the result and write the archive
    pub(super) fn plate(&mut self) -> Result<(Metadata, BuiltArchive)> {
        if self.recipe.needs_version_resolution() {
            return Err(Error::ArchiveBuild(
                "package version was never resolved".to_string(),
            ));
        }
        if let Some(path) = self.loaded.filesystem_file() {
            info!("Applying filesystem overlay {}", path.display());
            FilesystemOverlay::load(&path)?.apply(&self.ctx.destdir, &self.loaded.base_dir)?;
        }

        let metadata = Metadata::from_recipe(&self.recipe);
        let home = self.loaded.home_dir();
        let scripts = self.loaded.scripts_dir();
        let staged = StagedPackage::assemble(
            &self.ctx.destdir,
            home.as_deref(),
            scripts.as_deref(),
            metadata.clone(),
        )?;

        self.runner.deadline().check(Stage::Archive)?;
        let config = &self.kitchen.config;
        let built = ArchiveBuilder::new(&config.archive).build(
            &staged,
            &config.engine.output_dir,
            &self.recipe.archive_name(),
        )?;
        self.log_line(&format!(
            "Created {} ({} files, {} bytes)",
            built.path.display(),
            built.manifest.len(),
            built.size
        ));
        Ok((metadata, built))
    }

    /// Phase 5: detached signature
    ///
    /// A signing failure leaves the archive in place. A timeout or
    /// cancellation removes it, since the run as a whole did not finish.
    pub(super) fn sign(&mut self, archive: &Path) -> Result<Option<SignatureArtifact>> {
        let Some(signer) = &self.kitchen.signer else {
            warn!("Signing disabled, {} is unsigned", archive.display());
            self.warnings.push("package was not signed".to_string());
            return Ok(None);
        };

        let result = self
            .runner
            .deadline()
            .check(Stage::Signing)
            .and_then(|_| signer.sign(archive, self.runner));
        match result {
            Ok(artifact) => {
                self.log_line(&format!("Signature: {}", artifact.path.display()));
                Ok(Some(artifact))
            }
            Err(e) if e.is_timeout() => {
                if let Err(remove) = fs::remove_file(archive) {
                    warn!("Failed to remove {}: {}", archive.display(), remove);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn log_line(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }

    fn log_build_output(&mut self, step: &str, output: &CommandOutput) {
        self.log_line(&format!("=== {} ===", step));
        if !output.stdout.is_empty() {
            self.log.push_str(&output.stdout);
            self.log.push('\n');
        }
        if !output.stderr.is_empty() {
            self.log.push_str(&output.stderr);
            self.log.push('\n');
        }
    }
}

fn find_wheel(dir: &Path) -> Option<PathBuf> {
    let pattern = dir.join("*.whl");
    let mut wheels: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .ok()?
        .filter_map(|entry| entry.ok())
        .collect();
    wheels.sort();
    wheels.pop()
}

/// Copy executable regular files from `from` into `to`
fn copy_executables(from: &Path, to: &Path) -> Result<Vec<String>> {
    let mut copied = Vec::new();
    if !from.is_dir() {
        return Ok(copied);
    }
    let mut entries: Vec<_> = fs::read_dir(from)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let meta = entry.metadata()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 || name.ends_with(".d") {
            continue;
        }
        fs::create_dir_all(to)?;
        fs::copy(entry.path(), to.join(&name))?;
        copied.push(name);
    }
    Ok(copied)
}

/// Copy regular files with one of `extensions` from `from` into `to`
fn copy_artifacts(from: &Path, extensions: &[String], to: &Path) -> Result<Vec<String>> {
    let mut copied = Vec::new();
    if !from.is_dir() {
        return Ok(copied);
    }
    let mut entries: Vec<_> = fs::read_dir(from)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want == ext));
        if !matches || !entry.metadata()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        fs::create_dir_all(to)?;
        fs::copy(&path, to.join(&name))?;
        copied.push(name);
    }
    Ok(copied)
}
