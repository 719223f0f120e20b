// tests/recipes.rs

//! Recipe loading from files, and template planning from loaded recipes

mod common;

use apger::recipe::parse_recipe_file;
use apger::template::{self, TemplateContext};
use apger::{Error, TemplateKind};
use common::Workspace;
use std::fs;
use std::path::Path;

const ZLIB_YAML: &str = r#"
package:
  name: zlib-ng
  version: "2.2.4"
  architecture: x86_64
  source: https://github.com/zlib-ng/zlib-ng/archive/refs/tags/%(version)s.tar.gz
  source_checksum: "sha256:a73343c3093e5cdc50d9377997c3815b878fd110bf6511c2c7759f2afb90f5a3"
  type: library
  description: zlib replacement with optimizations
  maintainer: Packager <packager@example.org>
  license: Zlib
  homepage: https://github.com/zlib-ng/zlib-ng
  tags: [compression]
  dependencies: [glibc]
  provides: [libz.so]
  replaces: [zlib]
  conf: [etc/zlib-ng.conf]
build:
  template: cmake
  dependencies: [cmake, ninja]
  use: [shared]
  extra_flags: ["-DZLIB_COMPAT=ON"]
"#;

#[test]
fn test_identity_fields_echo_document() {
    let ws = Workspace::new();
    let path = ws.path().join("zlib-ng.yaml");
    fs::write(&path, ZLIB_YAML).unwrap();

    let loaded = parse_recipe_file(&path).unwrap();
    let pkg = &loaded.recipe.package;
    assert_eq!(pkg.name, "zlib-ng");
    assert_eq!(pkg.version, "2.2.4");
    assert_eq!(pkg.architecture, "x86_64");
    assert_eq!(pkg.license, "Zlib");
    assert_eq!(pkg.maintainer, "Packager <packager@example.org>");
    assert_eq!(pkg.tags, vec!["compression"]);
    assert_eq!(pkg.dependencies, vec!["glibc"]);
    assert_eq!(pkg.provides, vec!["libz.so"]);
    assert_eq!(pkg.replaces, vec!["zlib"]);
    assert_eq!(pkg.conf, vec!["etc/zlib-ng.conf"]);
    assert!(pkg.conflicts.is_empty());
    assert_eq!(loaded.recipe.template(), TemplateKind::Cmake);
    assert_eq!(loaded.recipe.build.use_flags, vec!["shared"]);
    assert_eq!(loaded.base_dir, ws.path());
    assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
}

#[test]
fn test_json_and_yaml_load_identically() {
    let ws = Workspace::new();
    let yaml = ws.path().join("zlib-ng.yaml");
    fs::write(&yaml, ZLIB_YAML).unwrap();
    let from_yaml = parse_recipe_file(&yaml).unwrap();

    let value: serde_json::Value = serde_yaml::from_str(ZLIB_YAML).unwrap();
    let json = ws.path().join("zlib-ng.json");
    fs::write(&json, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    let from_json = parse_recipe_file(&json).unwrap();

    assert_eq!(from_yaml.recipe, from_json.recipe);
}

fn load_error(ws: &Workspace, content: &str) -> Error {
    let path = ws.path().join("broken.json");
    fs::write(&path, content).unwrap();
    parse_recipe_file(&path).unwrap_err()
}

#[test]
fn test_invalid_recipes_rejected() {
    let ws = Workspace::new();
    let cases = [
        // missing name
        (
            r#"{"package": {"version": "1", "architecture": "x86_64", "source": "a.tar.gz"},
                "build": {"template": "meson"}}"#,
            "package.name",
        ),
        // unknown template
        (
            r#"{"package": {"name": "a", "version": "1", "architecture": "x86_64", "source": "a.tar.gz"},
                "build": {"template": "scons"}}"#,
            "build.template",
        ),
        // unknown package type
        (
            r#"{"package": {"name": "a", "version": "1", "architecture": "x86_64", "source": "a.tar.gz",
                            "type": "firmware"},
                "build": {"template": "meson"}}"#,
            "package.type",
        ),
        // custom without install script
        (
            r#"{"package": {"name": "a", "version": "1", "architecture": "x86_64", "source": "a.tar.gz"},
                "build": {"template": "custom", "script": "make"}}"#,
            "install.script",
        ),
    ];

    for (content, expected_field) in cases {
        match load_error(&ws, content) {
            Error::RecipeValidation { field, .. } => assert_eq!(field, expected_field),
            other => panic!("expected validation error for {expected_field}, got {other:?}"),
        }
    }
}

#[test]
fn test_invalid_recipe_never_reaches_fetch() {
    let ws = Workspace::new();
    let err = load_error(
        &ws,
        r#"{"package": {"name": "a", "version": "1", "architecture": "x86_64",
                        "source": "https://example.invalid/a.tar.gz"},
            "build": {"template": "nope"}}"#,
    );
    assert_eq!(err.stage(), Some(apger::Stage::Recipe));
    assert!(!ws.path().join("out").exists());
}

fn meson_context<'a>(use_flags: &'a [String], dirs: &'a Path) -> TemplateContext<'a> {
    TemplateContext {
        source_dir: dirs,
        build_dir: dirs,
        destdir: dirs,
        prefix: "/usr",
        jobs: 2,
        use_flags,
        extra_flags: &[],
        build_script: None,
        install_script: None,
    }
}

#[test]
fn test_meson_use_flags_reach_setup() {
    let ws = Workspace::new();
    let recipe = ws.recipe(
        "fmt.json",
        r#"{"package": {"name": "fmt", "version": "11.0", "architecture": "x86_64",
                        "source": "fmt-%(version)s.tar.gz", "license": "MIT",
                        "description": "formatting"},
            "build": {"template": "meson", "use": ["lto"]}}"#,
    );

    let flags = &recipe.recipe.build.use_flags;
    let plan = template::plan(recipe.recipe.template(), &meson_context(flags, ws.path()));
    let setup = plan.build[0].command().unwrap();
    assert!(setup.args.contains(&"-Dlto=true".to_string()), "{}", setup.display());

    let plan = template::plan(TemplateKind::Meson, &meson_context(&[], ws.path()));
    let setup = plan.build[0].command().unwrap();
    assert!(!setup.args.iter().any(|a| a.starts_with("-D")), "{}", setup.display());
}
