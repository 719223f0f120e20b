// src/template/meson.rs

//! Meson: `setup` / `compile` / `install --destdir`

use super::{flags, path_arg, BuildPlan, Step, TemplateContext};
use crate::kitchen::runner::CommandSpec;
use crate::recipe::TemplateKind;

pub(super) fn plan(ctx: &TemplateContext<'_>) -> BuildPlan {
    let build_dir = path_arg(ctx.build_dir);

    let setup = CommandSpec::new("meson")
        .arg("setup")
        .arg(&build_dir)
        .arg(format!("--prefix={}", ctx.prefix))
        .arg("--buildtype=release")
        .args(flags::translate(TemplateKind::Meson, ctx.use_flags))
        .args(ctx.extra_flags.iter().cloned())
        .cwd(ctx.source_dir);
    let compile = CommandSpec::new("meson")
        .args(["compile", "-C"])
        .arg(&build_dir)
        .arg(format!("-j{}", ctx.jobs))
        .cwd(ctx.source_dir);
    let install = CommandSpec::new("meson")
        .args(["install", "-C"])
        .arg(&build_dir)
        .arg("--destdir")
        .arg(path_arg(ctx.destdir))
        .cwd(ctx.source_dir);

    BuildPlan {
        build: vec![Step::run("meson setup", setup), Step::run("meson compile", compile)],
        install: vec![Step::run("meson install", install)],
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;

    #[test]
    fn test_use_flags_reach_setup() {
        let use_flags = vec!["lto".to_string()];
        let extra = vec!["-Dtests=false".to_string()];
        let plan = plan(&context(&use_flags, &extra));

        let setup = plan.build[0].command().unwrap();
        assert_eq!(
            setup.display(),
            "meson setup /w/build --prefix=/usr --buildtype=release -Dlto=true -Dtests=false"
        );
        assert_eq!(
            plan.install[0].command().unwrap().display(),
            "meson install -C /w/build --destdir /w/destdir"
        );
    }

    #[test]
    fn test_no_use_flags() {
        let plan = plan(&context(&[], &[]));
        let setup = plan.build[0].command().unwrap();
        assert!(!setup.args.iter().any(|a| a.starts_with("-D")));
    }
}
