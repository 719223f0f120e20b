// src/template/custom.rs

//! Raw shell scripts: `build.script`, then `install.script`

use super::{BuildPlan, Step, TemplateContext};
use crate::kitchen::runner::CommandSpec;

pub(super) fn plan(ctx: &TemplateContext<'_>) -> BuildPlan {
    let build = ctx
        .build_script
        .map(|script| Step::run("build script", CommandSpec::shell(script).cwd(ctx.source_dir)))
        .into_iter()
        .collect();
    let install = ctx
        .install_script
        .map(|script| Step::run("install script", CommandSpec::shell(script).cwd(ctx.source_dir)))
        .into_iter()
        .collect();
    BuildPlan { build, install }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;

    #[test]
    fn test_scripts_run_in_source_dir() {
        let mut ctx = context(&[], &[]);
        ctx.build_script = Some("make");
        ctx.install_script = Some("make install");
        let plan = plan(&ctx);
        assert_eq!(plan.build.len(), 1);
        assert_eq!(plan.install.len(), 1);
        let install = plan.install[0].command().unwrap();
        assert_eq!(install.args, vec!["-e", "-c", "make install"]);
        assert_eq!(install.cwd.as_deref(), Some(ctx.source_dir));
    }

    #[test]
    fn test_missing_build_script() {
        let mut ctx = context(&[], &[]);
        ctx.install_script = Some("install -Dm755 tool $DESTDIR/usr/bin/tool");
        assert!(plan(&ctx).build.is_empty());
    }
}
