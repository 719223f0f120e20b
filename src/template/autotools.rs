// src/template/autotools.rs

//! Autotools: in-tree `./configure && make && make install`

use super::{flags, path_arg, BuildPlan, Step, TemplateContext};
use crate::kitchen::runner::CommandSpec;
use crate::recipe::TemplateKind;

pub(super) fn plan(ctx: &TemplateContext<'_>) -> BuildPlan {
    let configure = CommandSpec::new("./configure")
        .arg(format!("--prefix={}", ctx.prefix))
        .args(flags::translate(TemplateKind::Autotools, ctx.use_flags))
        .args(ctx.extra_flags.iter().cloned())
        .cwd(ctx.source_dir);
    let make = CommandSpec::new("make")
        .arg(format!("-j{}", ctx.jobs))
        .cwd(ctx.source_dir);
    let install = CommandSpec::new("make")
        .arg(format!("DESTDIR={}", path_arg(ctx.destdir)))
        .arg("install")
        .cwd(ctx.source_dir);

    BuildPlan {
        build: vec![Step::run("configure", configure), Step::run("make", make)],
        install: vec![Step::run("make install", install)],
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;

    #[test]
    fn test_plan() {
        let use_flags = vec!["nls".to_string()];
        let extra = vec!["--disable-static".to_string()];
        let plan = plan(&context(&use_flags, &extra));
        assert_eq!(
            plan.build[0].command().unwrap().display(),
            "./configure --prefix=/usr --enable-nls --disable-static"
        );
        assert_eq!(plan.build[1].command().unwrap().display(), "make -j4");
        assert_eq!(
            plan.install[0].command().unwrap().display(),
            "make DESTDIR=/w/destdir install"
        );
    }
}
