// src/template/cargo.rs

//! Cargo: release build, install by copying binaries out of `target/release`

use super::{flags, Action, BuildPlan, Step, TemplateContext};
use crate::kitchen::runner::CommandSpec;
use crate::recipe::TemplateKind;
use std::path::Path;

pub(super) fn plan(ctx: &TemplateContext<'_>) -> BuildPlan {
    let mut build = CommandSpec::new("cargo").args(["build", "--release"]);
    if ctx.source_dir.join("Cargo.lock").is_file() {
        build = build.arg("--locked");
    }
    let build = build
        .arg(format!("--jobs={}", ctx.jobs))
        .args(flags::translate(TemplateKind::Cargo, ctx.use_flags))
        .args(ctx.extra_flags.iter().cloned())
        .cwd(ctx.source_dir);

    let prefix = ctx.prefix.trim_start_matches('/');
    let install = Step {
        name: "install binaries".to_string(),
        action: Action::CopyExecutables {
            from: ctx.source_dir.join("target").join("release"),
            to: ctx.destdir.join(Path::new(prefix)).join("bin"),
        },
    };

    BuildPlan {
        build: vec![Step::run("cargo build", build)],
        install: vec![install],
    }
}
