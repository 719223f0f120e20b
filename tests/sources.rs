// tests/sources.rs

//! Version resolution, HTTP fetching and build dependency installation

mod common;

use apger::kitchen::PackageManager;
use apger::{Error, Kitchen};
use common::{FakePackageManager, Workspace, HELLO_FILES, HELLO_INSTALL};
use std::sync::Arc;

fn release_server() -> String {
    let listing = "<html><body>\n\
        <a href=\"hello-2.2.0.tar.gz\">hello-2.2.0.tar.gz</a>\n\
        <a href=\"hello-2.3.1.tar.gz\">hello-2.3.1.tar.gz</a>\n\
        </body></html>";
    common::serve(vec![
        ("/releases/".to_string(), listing.as_bytes().to_vec()),
        (
            "/releases/hello-2.3.1.tar.gz".to_string(),
            common::tarball_bytes("hello-2.3.1", HELLO_FILES),
        ),
    ])
}

#[test]
fn test_latest_resolved_before_naming() {
    let base = release_server();
    let ws = Workspace::new();
    let source = format!("{}/releases/hello-%(version)s.tar.gz", base);
    let loaded = ws.recipe(
        "hello.json",
        &common::hello_recipe_json("latest", &source, "true", HELLO_INSTALL),
    );
    assert!(loaded.recipe.needs_version_resolution());

    let result = Kitchen::new(ws.config()).cook(&loaded).unwrap();
    assert_eq!(result.recipe.package.version, "2.3.1");
    assert_eq!(result.metadata.version, "2.3.1");
    assert_eq!(ws.outputs(), vec!["hello-2.3.1.apg"]);
}

#[test]
fn test_checksum_mismatch_fails_fetch() {
    let base = release_server();
    let ws = Workspace::new();
    let source = format!("{}/releases/hello-%(version)s.tar.gz", base);
    let mut recipe: serde_json::Value = serde_json::from_str(&common::hello_recipe_json(
        "2.3.1",
        &source,
        "true",
        HELLO_INSTALL,
    ))
    .unwrap();
    recipe["package"]["source_checksum"] = format!("sha256:{}", "0".repeat(64)).into();
    let loaded = ws.recipe("hello.json", &recipe.to_string());

    let err = Kitchen::new(ws.config()).cook(&loaded).unwrap_err();
    assert!(matches!(err, Error::SourceFetch(ref msg) if msg.contains("checksum mismatch")));
    assert!(ws.outputs().is_empty());
}

#[test]
fn test_missing_upstream_file() {
    let base = release_server();
    let ws = Workspace::new();
    let source = format!("{}/releases/hello-%(version)s.tar.gz", base);
    let loaded = ws.recipe(
        "hello.json",
        &common::hello_recipe_json("9.9.9", &source, "true", HELLO_INSTALL),
    );

    let err = Kitchen::new(ws.config()).cook(&loaded).unwrap_err();
    assert!(matches!(err, Error::SourceFetch(_)), "{err:?}");
}

#[test]
fn test_fetch_only() {
    let ws = Workspace::new();
    let loaded = ws.hello("true", HELLO_INSTALL);
    let dest = ws.path().join("fetched");

    let (resolved, fetched) = Kitchen::new(ws.config()).fetch(&loaded, &dest).unwrap();
    assert_eq!(resolved.package.version, "1.0");
    assert_eq!(fetched.root, dest.join("source/hello-1.0"));
    assert!(fetched.root.join("hello.sh").is_file());
    assert!(fetched.digest.is_some());
}

fn with_build_deps(ws: &Workspace, deps: &[&str]) -> apger::LoadedRecipe {
    common::write_hello_tarball(ws.path(), "1.0");
    let mut recipe: serde_json::Value = serde_json::from_str(&common::hello_recipe_json(
        "1.0",
        "hello-%(version)s.tar.gz",
        "true",
        HELLO_INSTALL,
    ))
    .unwrap();
    recipe["build"]["dependencies"] = serde_json::json!(deps);
    ws.recipe("hello.json", &recipe.to_string())
}

#[test]
fn test_missing_dependencies_installed() {
    let ws = Workspace::new();
    let loaded = with_build_deps(&ws, &["make", "meson"]);
    let mut config = ws.config();
    config.dependencies.enabled = true;
    config.dependencies.lock_retry_delay_ms = 10;

    let fake = Arc::new(FakePackageManager::with_installed(&["make"]));
    *fake.locked_attempts.lock().unwrap() = 1;
    let result = Kitchen::new(config)
        .with_package_manager(fake.clone() as Arc<dyn PackageManager>)
        .cook(&loaded)
        .unwrap();

    assert_eq!(result.dependencies.already_installed, vec!["make"]);
    assert_eq!(result.dependencies.newly_installed, vec!["meson"]);
    // one locked attempt, one successful retry
    assert_eq!(fake.install_calls.lock().unwrap().len(), 2);
}

#[test]
fn test_unavailable_dependency_stops_before_build() {
    let ws = Workspace::new();
    let loaded = with_build_deps(&ws, &["make", "nonexistent-tool"]);
    let mut config = ws.config();
    config.dependencies.enabled = true;

    let fake = FakePackageManager {
        unavailable: vec!["nonexistent-tool".to_string()],
        ..Default::default()
    };
    let err = Kitchen::new(config)
        .with_package_manager(Arc::new(fake))
        .cook(&loaded)
        .unwrap_err();

    match err {
        Error::DependencyInstall { unresolved, .. } => {
            assert_eq!(unresolved, vec!["nonexistent-tool"]);
        }
        other => panic!("expected dependency error, got {other:?}"),
    }
    assert!(ws.outputs().is_empty());
}
