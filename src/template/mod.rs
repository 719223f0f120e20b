// src/template/mod.rs

//! Build templates
//!
//! A template turns a recipe's build section into a two-phase step plan:
//! the build phase compiles inside the source tree, the install phase puts
//! the result under the destination root. Plans are plain data, so they can
//! be inspected and tested without running anything; [`Kitchen`] executes
//! them.
//!
//! [`Kitchen`]: crate::kitchen::Kitchen

mod autotools;
mod cargo;
mod cmake;
mod custom;
pub mod flags;
mod gradle;
mod meson;
mod python;

use crate::error::BuildPhase;
use crate::kitchen::runner::CommandSpec;
use crate::recipe::TemplateKind;
use std::path::{Path, PathBuf};

/// Everything a template needs to plan a build
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    /// Directory the build runs in (source root plus `build.workdir`)
    pub source_dir: &'a Path,
    /// Out-of-tree build directory
    pub build_dir: &'a Path,
    /// Destination root
    pub destdir: &'a Path,
    pub prefix: &'a str,
    pub jobs: u32,
    pub use_flags: &'a [String],
    pub extra_flags: &'a [String],
    pub build_script: Option<&'a str>,
    pub install_script: Option<&'a str>,
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run(CommandSpec),
    /// Copy every executable regular file in `from` into `to`
    CopyExecutables { from: PathBuf, to: PathBuf },
    /// Copy files in `from` with one of `extensions` into `to`
    CopyArtifacts {
        from: PathBuf,
        extensions: Vec<String>,
        to: PathBuf,
    },
    /// Run `command` with the single wheel found in `wheel_dir` appended
    InstallWheel {
        wheel_dir: PathBuf,
        command: CommandSpec,
    },
}

/// One named step of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub action: Action,
}

impl Step {
    pub fn run(name: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            action: Action::Run(command),
        }
    }

    /// Command spec, if this step runs one directly
    pub fn command(&self) -> Option<&CommandSpec> {
        match &self.action {
            Action::Run(spec) | Action::InstallWheel { command: spec, .. } => Some(spec),
            Action::CopyExecutables { .. } | Action::CopyArtifacts { .. } => None,
        }
    }
}

/// Ordered steps for both phases
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlan {
    pub build: Vec<Step>,
    pub install: Vec<Step>,
}

impl BuildPlan {
    pub fn phase(&self, phase: BuildPhase) -> &[Step] {
        match phase {
            BuildPhase::Build => &self.build,
            BuildPhase::Install => &self.install,
        }
    }
}

/// Plan the build for `kind`
///
/// For every template except `custom`, a declared install script runs as a
/// final install step inside the destination root.
pub fn plan(kind: TemplateKind, ctx: &TemplateContext<'_>) -> BuildPlan {
    let mut plan = match kind {
        TemplateKind::Meson => meson::plan(ctx),
        TemplateKind::Cmake => cmake::plan(ctx),
        TemplateKind::Autotools => autotools::plan(ctx),
        TemplateKind::Cargo => cargo::plan(ctx),
        TemplateKind::PythonPep517 => python::plan(ctx),
        TemplateKind::Gradle => gradle::plan(ctx),
        TemplateKind::Custom => return custom::plan(ctx),
    };

    if let Some(script) = ctx.install_script {
        plan.install.push(Step::run(
            "install script",
            CommandSpec::shell(script).cwd(ctx.destdir),
        ));
    }
    plan
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}


#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::*;

    #[test]
    fn test_install_script_appended_for_build_systems() {
        let mut ctx = context(&[], &[]);
        ctx.install_script = Some("ln -s foo usr/bin/bar");
        let plan = plan(TemplateKind::Meson, &ctx);
        let last = plan.install.last().unwrap();
        assert_eq!(last.name, "install script");
        assert_eq!(
            last.command().unwrap().cwd.as_deref(),
            Some(Path::new("/w/destdir"))
        );
    }

    #[test]
    fn test_every_template_has_install_phase() {
        let mut ctx = context(&[], &[]);
        ctx.install_script = Some("true");
        for kind in TemplateKind::ALL {
            assert!(!plan(kind, &ctx).install.is_empty(), "{kind}");
        }
    }
}
