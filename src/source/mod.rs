// src/source/mod.rs

//! Source acquisition
//!
//! Turns a recipe's source descriptor into an unpacked source tree:
//!
//! 1. resolve `"latest"` to a concrete version ([`version`])
//! 2. download (HTTP), copy (local path, `file://`) or shallow-clone (git)
//! 3. verify the download is non-empty and matches any declared checksum
//! 4. unpack with format auto-detection ([`extract`])

pub mod extract;
pub mod http;
pub mod version;

use crate::config::FetchSection;
use crate::error::{Error, Result, Stage};
use crate::hash::{self, Hash};
use crate::kitchen::runner::{CommandRunner, CommandSpec};
use crate::recipe::Recipe;
use http::HttpClient;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

/// Where a source comes from, after placeholder substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Http(String),
    Local(PathBuf),
    Git { url: String, reference: Option<String> },
}

impl SourceLocation {
    /// Classify a substituted source URL; relative paths resolve against `base_dir`
    pub fn parse(source: &str, base_dir: &Path) -> Result<Self> {
        if is_git_url(source) {
            let url = strip_git_prefix(source);
            let (url, reference) = match url.split_once('#') {
                Some((url, reference)) if !reference.is_empty() => {
                    (url.to_string(), Some(reference.to_string()))
                }
                _ => (url.trim_end_matches('#').to_string(), None),
            };
            return Ok(Self::Git { url, reference });
        }

        match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self::Http(source.to_string())),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Self::Local)
                .map_err(|_| Error::SourceFetch(format!("invalid file URL: {}", source))),
            Ok(url) => Err(Error::SourceFetch(format!(
                "unsupported source scheme '{}' in {}",
                url.scheme(),
                source
            ))),
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Self::Local(base_dir.join(source))),
            Err(e) => Err(Error::SourceFetch(format!("invalid source URL {}: {}", source, e))),
        }
    }
}

/// `*.git`, `git+...` and `git://` URLs are cloned rather than downloaded
pub fn is_git_url(source: &str) -> bool {
    let without_ref = source.split('#').next().unwrap_or(source);
    source.starts_with("git+")
        || source.starts_with("git://")
        || without_ref.trim_end_matches('/').ends_with(".git")
}

pub(crate) fn strip_git_prefix(source: &str) -> &str {
    source.strip_prefix("git+").unwrap_or(source)
}

/// Unpacked source ready for building
#[derive(Debug, Clone)]
pub struct FetchedSource {
    /// Root of the source tree
    pub root: PathBuf,
    /// Downloaded archive, if any
    pub archive: Option<PathBuf>,
    /// Digest of the archive, using the declared algorithm or SHA-256
    pub digest: Option<Hash>,
}

pub struct SourceFetcher<'a> {
    client: HttpClient,
    config: &'a FetchSection,
    runner: &'a CommandRunner,
}

impl<'a> SourceFetcher<'a> {
    pub fn new(config: &'a FetchSection, runner: &'a CommandRunner) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            config,
            runner,
        })
    }

    /// Return a copy of `recipe` with a concrete version
    ///
    /// Recipes that already name a version come back unchanged.
    pub fn resolve(&self, recipe: &Recipe) -> Result<Recipe> {
        if !recipe.needs_version_resolution() {
            return Ok(recipe.clone());
        }
        info!("Resolving latest version of {}", recipe.package.name);
        let version = version::resolve_latest(
            &recipe.package.source,
            &self.client,
            self.runner,
            &self.config.git_program,
        )?;
        Ok(recipe.with_version(version))
    }

    /// Acquire and unpack the source for a resolved recipe
    ///
    /// `download_dir` receives the raw archive, `source_dir` the unpacked tree.
    pub fn fetch(
        &self,
        recipe: &Recipe,
        base_dir: &Path,
        download_dir: &Path,
        source_dir: &Path,
    ) -> Result<FetchedSource> {
        if recipe.needs_version_resolution() {
            return Err(Error::SourceFetch(
                "version must be resolved before fetching".into(),
            ));
        }
        let source = recipe.source_url();
        let expected = recipe
            .package
            .source_checksum
            .as_deref()
            .map(Hash::parse_prefixed)
            .transpose()
            .map_err(|e| Error::SourceFetch(format!("invalid source checksum: {}", e)))?;

        match SourceLocation::parse(&source, base_dir)? {
            SourceLocation::Git { url, reference } => {
                if expected.is_some() {
                    warn!("source_checksum is ignored for git sources");
                }
                self.clone_git(&url, reference.as_deref(), source_dir)?;
                Ok(FetchedSource {
                    root: source_dir.to_path_buf(),
                    archive: None,
                    digest: None,
                })
            }
            SourceLocation::Local(path) if path.is_dir() => {
                info!("Copying source tree {}", path.display());
                copy_tree(&path, source_dir)?;
                Ok(FetchedSource {
                    root: source_dir.to_path_buf(),
                    archive: None,
                    digest: None,
                })
            }
            SourceLocation::Local(path) => {
                info!("Copying source archive {}", path.display());
                let archive = archive_path(recipe, download_dir)?;
                fs::copy(&path, &archive).map_err(|e| {
                    Error::SourceFetch(format!("cannot read {}: {}", path.display(), e))
                })?;
                self.unpack(archive, expected.as_ref(), source_dir)
            }
            SourceLocation::Http(url) => {
                let archive = archive_path(recipe, download_dir)?;
                self.client.download(&url, &archive, self.runner.deadline())?;
                self.unpack(archive, expected.as_ref(), source_dir)
            }
        }
    }

    fn unpack(
        &self,
        archive: PathBuf,
        expected: Option<&Hash>,
        source_dir: &Path,
    ) -> Result<FetchedSource> {
        self.runner.deadline().check(Stage::Fetch)?;
        let digest = verify_download(&archive, expected)?;
        let root = extract::extract_archive(&archive, source_dir)?;
        Ok(FetchedSource {
            root,
            archive: Some(archive),
            digest: Some(digest),
        })
    }

    fn clone_git(&self, url: &str, reference: Option<&str>, dest: &Path) -> Result<()> {
        info!("Cloning {}", url);
        let mut spec = CommandSpec::new(&self.config.git_program).args(["clone", "--depth", "1"]);
        if let Some(reference) = reference {
            spec = spec.arg("--branch").arg(reference);
        }
        let spec = spec.arg(url).arg(dest.to_string_lossy());

        let output = self.runner.run(&spec, Stage::Fetch)?;
        if !output.success {
            return Err(Error::SourceFetch(format!(
                "git clone of {} failed: {}",
                url,
                output.tail(10)
            )));
        }
        Ok(())
    }
}

fn archive_path(recipe: &Recipe, download_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(download_dir)?;
    Ok(download_dir.join(recipe.source_filename()))
}

/// Non-empty check plus optional checksum comparison
fn verify_download(archive: &Path, expected: Option<&Hash>) -> Result<Hash> {
    let size = fs::metadata(archive)?.len();
    if size == 0 {
        return Err(Error::SourceFetch(format!(
            "downloaded file {} is empty",
            archive.display()
        )));
    }

    let algorithm = expected.map(|h| h.algorithm).unwrap_or_default();
    let actual = hash::hash_file(algorithm, archive)?;
    if let Some(expected) = expected
        && actual.value != expected.value
    {
        return Err(Error::SourceFetch(format!(
            "checksum mismatch for {}: expected {}, got {}",
            archive.display(),
            expected.to_prefixed_string(),
            actual.to_prefixed_string()
        )));
    }
    Ok(actual)
}

/// Recursive copy preserving permissions and symlinks
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in walkdir::WalkDir::new(from).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let relative = entry.path().strip_prefix(from).map_err(|e| {
            Error::SourceFetch(format!("unexpected path {}: {}", entry.path().display(), e))
        })?;
        let target = to.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_http() {
        let loc = SourceLocation::parse("https://example.org/a-1.0.tar.gz", Path::new("/r")).unwrap();
        assert_eq!(loc, SourceLocation::Http("https://example.org/a-1.0.tar.gz".into()));
    }

    #[test]
    fn test_location_local() {
        assert_eq!(
            SourceLocation::parse("file:///srv/src/a.tar.gz", Path::new("/r")).unwrap(),
            SourceLocation::Local(PathBuf::from("/srv/src/a.tar.gz"))
        );
        assert_eq!(
            SourceLocation::parse("sources/a.tar.gz", Path::new("/recipes")).unwrap(),
            SourceLocation::Local(PathBuf::from("/recipes/sources/a.tar.gz"))
        );
    }

    #[test]
    fn test_location_git() {
        assert_eq!(
            SourceLocation::parse("https://example.org/tool.git#v1.2", Path::new("/r")).unwrap(),
            SourceLocation::Git {
                url: "https://example.org/tool.git".into(),
                reference: Some("v1.2".into())
            }
        );
        assert_eq!(
            SourceLocation::parse("git+https://example.org/tool", Path::new("/r")).unwrap(),
            SourceLocation::Git {
                url: "https://example.org/tool".into(),
                reference: None
            }
        );
    }

    #[test]
    fn test_location_unsupported_scheme() {
        assert!(SourceLocation::parse("ftp://example.org/a.tar.gz", Path::new("/r")).is_err());
    }

    #[test]
    fn test_verify_download() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.tar.gz");
        fs::write(&empty, b"").unwrap();
        assert!(matches!(verify_download(&empty, None), Err(Error::SourceFetch(_))));

        let file = dir.path().join("data.bin");
        fs::write(&file, b"hello world").unwrap();
        let good = Hash::parse_prefixed("crc32:0d4a1185").unwrap();
        assert_eq!(verify_download(&file, Some(&good)).unwrap(), good);

        let bad = Hash::parse_prefixed("crc32:deadbeef").unwrap();
        let err = verify_download(&file, Some(&bad)).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_copy_tree() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from");
        fs::create_dir_all(from.join("sub")).unwrap();
        fs::write(from.join("sub/file.txt"), "x").unwrap();
        std::os::unix::fs::symlink("sub/file.txt", from.join("link")).unwrap();

        let to = dir.path().join("to");
        copy_tree(&from, &to).unwrap();
        assert_eq!(fs::read_to_string(to.join("sub/file.txt")).unwrap(), "x");
        assert_eq!(fs::read_link(to.join("link")).unwrap(), PathBuf::from("sub/file.txt"));
    }
}
