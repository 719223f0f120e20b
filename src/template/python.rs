// src/template/python.rs

//! Python PEP 517: build a wheel, install it with `installer`

use super::{flags, path_arg, Action, BuildPlan, Step, TemplateContext};
use crate::kitchen::runner::CommandSpec;
use crate::recipe::TemplateKind;

pub(super) fn plan(ctx: &TemplateContext<'_>) -> BuildPlan {
    let build = CommandSpec::new("python3")
        .args(["-m", "build", "--wheel", "--no-isolation", "--outdir"])
        .arg(path_arg(ctx.build_dir))
        .args(flags::translate(TemplateKind::PythonPep517, ctx.use_flags))
        .args(ctx.extra_flags.iter().cloned())
        .cwd(ctx.source_dir);

    let install = CommandSpec::new("python3")
        .args(["-m", "installer", "--destdir"])
        .arg(path_arg(ctx.destdir))
        .arg("--prefix")
        .arg(ctx.prefix)
        .cwd(ctx.source_dir);

    BuildPlan {
        build: vec![Step::run("python build", build)],
        install: vec![Step {
            name: "python install".to_string(),
            action: Action::InstallWheel {
                wheel_dir: ctx.build_dir.to_path_buf(),
                command: install,
            },
        }],
    }
}
