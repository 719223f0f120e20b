// src/template/cmake.rs

//! CMake: out-of-tree configure, `--build`, `--install` with `DESTDIR`

use super::{flags, path_arg, BuildPlan, Step, TemplateContext};
use crate::kitchen::runner::CommandSpec;
use crate::recipe::TemplateKind;

pub(super) fn plan(ctx: &TemplateContext<'_>) -> BuildPlan {
    let build_dir = path_arg(ctx.build_dir);

    let configure = CommandSpec::new("cmake")
        .arg("-S")
        .arg(path_arg(ctx.source_dir))
        .arg("-B")
        .arg(&build_dir)
        .arg(format!("-DCMAKE_INSTALL_PREFIX={}", ctx.prefix))
        .arg("-DCMAKE_BUILD_TYPE=Release")
        .args(flags::translate(TemplateKind::Cmake, ctx.use_flags))
        .args(ctx.extra_flags.iter().cloned())
        .cwd(ctx.source_dir);
    let build = CommandSpec::new("cmake")
        .arg("--build")
        .arg(&build_dir)
        .arg("--parallel")
        .arg(ctx.jobs.to_string())
        .cwd(ctx.source_dir);
    let install = CommandSpec::new("cmake")
        .arg("--install")
        .arg(&build_dir)
        .env("DESTDIR", path_arg(ctx.destdir))
        .cwd(ctx.source_dir);

    BuildPlan {
        build: vec![
            Step::run("cmake configure", configure),
            Step::run("cmake build", build),
        ],
        install: vec![Step::run("cmake install", install)],
    }
}
