// src/template/gradle.rs

//! Gradle: `build` through the project wrapper when it ships one, install
//! the resulting jars and wars under `<prefix>/share/java`

use super::{flags, Action, BuildPlan, Step, TemplateContext};
use crate::kitchen::runner::CommandSpec;
use crate::recipe::TemplateKind;
use std::path::Path;

pub(super) fn plan(ctx: &TemplateContext<'_>) -> BuildPlan {
    let program = if ctx.source_dir.join("gradlew").is_file() {
        "./gradlew"
    } else {
        "gradle"
    };
    let build = CommandSpec::new(program)
        .args(["build", "--no-daemon"])
        .args(flags::translate(TemplateKind::Gradle, ctx.use_flags))
        .args(ctx.extra_flags.iter().cloned())
        .cwd(ctx.source_dir);

    let prefix = ctx.prefix.trim_start_matches('/');
    let install = Step {
        name: "install java archives".to_string(),
        action: Action::CopyArtifacts {
            from: ctx.source_dir.join("build").join("libs"),
            extensions: vec!["jar".to_string(), "war".to_string()],
            to: ctx.destdir.join(Path::new(prefix)).join("share").join("java"),
        },
    };

    BuildPlan {
        build: vec![Step::run("gradle build", build)],
        install: vec![install],
    }
}
