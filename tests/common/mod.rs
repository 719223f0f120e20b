// tests/common/mod.rs

//! Shared fixtures for integration tests: local sources, recipes, configs
//! and a fake host package manager.

#![allow(dead_code)]

use apger::apg::builder::DEFAULT_MTIME;
use apger::kitchen::{CommandRunner, InstallStatus, PackageManager};
use apger::recipe::parse_recipe_file;
use apger::{EngineConfig, LoadedRecipe};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Files of the `hello` test project
pub const HELLO_FILES: &[(&str, &str, u32)] = &[
    ("hello.sh", "#!/bin/sh\necho hello\n", 0o755),
    ("README", "hello test project\n", 0o644),
    ("share/greeting.txt", "hi there\n", 0o644),
];

/// Gzipped tarball with every file under `<top>/`
pub fn tarball_bytes(top: &str, files: &[(&str, &str, u32)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    for (path, content, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(*mode);
        header.set_mtime(DEFAULT_MTIME);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", top, path), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Write `hello-<version>.tar.gz` into `dir`
pub fn write_hello_tarball(dir: &Path, version: &str) -> PathBuf {
    let path = dir.join(format!("hello-{}.tar.gz", version));
    std::fs::write(&path, tarball_bytes(&format!("hello-{}", version), HELLO_FILES)).unwrap();
    path
}

/// Install script copying the hello project into the destination root
pub const HELLO_INSTALL: &str = "install -Dm755 hello.sh \"$DESTDIR/usr/bin/hello\"\n\
install -Dm644 share/greeting.txt \"$DESTDIR/usr/share/hello/greeting.txt\"";

/// JSON recipe for the custom-template hello package
pub fn hello_recipe_json(version: &str, source: &str, build: &str, install: &str) -> String {
    serde_json::json!({
        "package": {
            "name": "hello",
            "version": version,
            "architecture": "x86_64",
            "source": source,
            "description": "Greets the world",
            "maintainer": "Packager <packager@example.org>",
            "license": "MIT",
            "homepage": "https://example.org/hello",
            "tags": ["demo"],
            "dependencies": ["glibc"],
            "provides": ["greeter"]
        },
        "build": {
            "template": "custom",
            "script": build
        },
        "install": {
            "script": install
        }
    })
    .to_string()
}

/// Workspace for one test: recipe directory, work root and output directory
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    pub fn work_root(&self) -> PathBuf {
        self.path().join("work")
    }

    /// Engine config isolated to this workspace; no signing, no host packages
    pub fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.engine.output_dir = self.output_dir();
        config.engine.work_root = self.work_root();
        config.engine.timeout_secs = 120;
        config.dependencies.enabled = false;
        config.signing.enabled = false;
        config.archive.compression_level = 3;
        config.archive.mtime = Some(DEFAULT_MTIME);
        config.build.jobs = 2;
        config
    }

    /// Write a recipe file next to the sources and load it
    pub fn recipe(&self, file_name: &str, content: &str) -> LoadedRecipe {
        let path = self.path().join(file_name);
        std::fs::write(&path, content).unwrap();
        parse_recipe_file(&path).unwrap()
    }

    /// Hello recipe built from a local tarball
    pub fn hello(&self, build: &str, install: &str) -> LoadedRecipe {
        write_hello_tarball(self.path(), "1.0");
        self.recipe(
            "hello.json",
            &hello_recipe_json("1.0", "hello-%(version)s.tar.gz", build, install),
        )
    }

    /// Names in the output directory, sorted
    pub fn outputs(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.output_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Leftover per-run build trees
    pub fn build_trees(&self) -> usize {
        std::fs::read_dir(self.work_root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Host package manager double that records what it was asked to do
#[derive(Default)]
pub struct FakePackageManager {
    pub installed: Mutex<Vec<String>>,
    pub install_calls: Mutex<Vec<Vec<String>>>,
    /// Install attempts answered with a lock error before succeeding
    pub locked_attempts: Mutex<u32>,
    /// Packages the fake refuses to install
    pub unavailable: Vec<String>,
}

impl FakePackageManager {
    pub fn with_installed(names: &[&str]) -> Self {
        Self {
            installed: Mutex::new(names.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }
}

impl PackageManager for FakePackageManager {
    fn check_missing(&self, deps: &[String], _runner: &CommandRunner) -> apger::Result<Vec<String>> {
        let installed = self.installed.lock().unwrap();
        Ok(deps
            .iter()
            .filter(|d| !installed.contains(d))
            .cloned()
            .collect())
    }

    fn install(&self, deps: &[String], _runner: &CommandRunner) -> apger::Result<InstallStatus> {
        self.install_calls.lock().unwrap().push(deps.to_vec());
        let mut locked = self.locked_attempts.lock().unwrap();
        if *locked > 0 {
            *locked -= 1;
            return Ok(InstallStatus::Locked("unable to lock database".into()));
        }
        let mut installed = self.installed.lock().unwrap();
        for dep in deps {
            if !self.unavailable.contains(dep) && !installed.contains(dep) {
                installed.push(dep.clone());
            }
        }
        Ok(InstallStatus::Installed)
    }
}

/// Minimal HTTP/1.1 server answering GETs from a fixed route table
///
/// Returns the base URL (`http://127.0.0.1:<port>`). The server thread
/// lives until the test process exits.
pub fn serve(routes: Vec<(String, Vec<u8>)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let request = String::from_utf8_lossy(&request);
            let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

            let response = match routes.iter().find(|(route, _)| *route == path) {
                Some((_, body)) => {
                    let mut head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    )
                    .into_bytes();
                    head.extend_from_slice(body);
                    head
                }
                None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    .to_vec(),
            };
            let _ = stream.write_all(&response);
            let _ = stream.flush();
        }
    });
    base
}
