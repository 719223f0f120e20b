// src/source/version.rs

//! Upstream "latest" version resolution
//!
//! The provider is picked from the shape of the source URL:
//!
//! | Source URL | Query |
//! |------------|-------|
//! | `github.com/<owner>/<repo>/...` | `api.github.com/repos/<owner>/<repo>/releases/latest` |
//! | `gitlab.com/<group>/<project>/...` | `/api/v4/projects/<group%2Fproject>/repository/tags` |
//! | git repository | `git ls-remote --tags` |
//! | anything else | directory listing of the URL's parent |
//!
//! Parsing is kept separate from fetching so each provider can be tested
//! against canned responses.

use crate::error::{Error, Result, Stage};
use crate::kitchen::runner::{CommandRunner, CommandSpec};
use crate::source::http::HttpClient;
use regex::Regex;
use serde::Deserialize;
use std::cmp::Ordering;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

static LISTING_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s/_\-])v?(\d+\.\d+(?:\.\d+)*)(?:[\s/_\-]|\.tar|\.zip|\.t[gx]z|$)")
        .unwrap()
});

/// Where to ask for the newest release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamProvider {
    GitHub { owner: String, repo: String },
    GitLab { host: String, project: String },
    Git { url: String },
    Listing { directory: String },
}

impl UpstreamProvider {
    /// Pick a provider for a source URL
    pub fn detect(source_url: &str) -> Result<Self> {
        if super::is_git_url(source_url) {
            return Ok(Self::Git {
                url: super::strip_git_prefix(source_url).to_string(),
            });
        }

        let url = Url::parse(source_url).map_err(|e| {
            Error::SourceFetch(format!(
                "cannot resolve latest version for '{}': {}",
                source_url, e
            ))
        })?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        match url.host_str() {
            Some("github.com") if segments.len() >= 2 => Ok(Self::GitHub {
                owner: segments[0].to_string(),
                repo: segments[1].trim_end_matches(".git").to_string(),
            }),
            Some(host @ ("gitlab.com" | "invent.kde.org" | "gitlab.freedesktop.org"))
                if segments.len() >= 2 =>
            {
                let project = segments
                    .iter()
                    .take_while(|seg| **seg != "-")
                    .copied()
                    .collect::<Vec<_>>()
                    .join("/");
                Ok(Self::GitLab {
                    host: host.to_string(),
                    project: project.trim_end_matches(".git").to_string(),
                })
            }
            _ => {
                let mut dir = url.clone();
                dir.set_query(None);
                dir.set_fragment(None);
                {
                    let mut path = dir.path_segments_mut().map_err(|_| {
                        Error::SourceFetch(format!("'{}' has no directory to list", source_url))
                    })?;
                    path.pop_if_empty().pop();
                    path.push("");
                }
                Ok(Self::Listing {
                    directory: dir.to_string(),
                })
            }
        }
    }

    /// Query URL for HTTP providers
    pub fn query_url(&self) -> Option<String> {
        match self {
            Self::GitHub { owner, repo } => Some(format!(
                "https://api.github.com/repos/{}/{}/releases/latest",
                owner, repo
            )),
            Self::GitLab { host, project } => Some(format!(
                "https://{}/api/v4/projects/{}/repository/tags",
                host,
                project.replace('/', "%2F")
            )),
            Self::Listing { directory } => Some(directory.clone()),
            Self::Git { .. } => None,
        }
    }

    /// Parse a provider response into a version string
    pub fn parse_response(&self, body: &str) -> Option<String> {
        match self {
            Self::GitHub { .. } => parse_github_release(body),
            Self::GitLab { .. } => parse_gitlab_tags(body),
            Self::Listing { .. } => parse_listing(body),
            Self::Git { .. } => parse_ls_remote(body),
        }
    }
}

/// Resolve the newest upstream version for `source_url`
pub fn resolve_latest(
    source_url: &str,
    client: &HttpClient,
    runner: &CommandRunner,
    git_program: &str,
) -> Result<String> {
    let provider = UpstreamProvider::detect(source_url)?;
    debug!("Resolving latest version via {:?}", provider);

    let body = match &provider {
        UpstreamProvider::Git { url } => {
            let spec = CommandSpec::new(git_program)
                .args(["ls-remote", "--tags", "--refs"])
                .arg(url.clone());
            let output = runner.run(&spec, Stage::Fetch)?;
            if !output.success {
                return Err(Error::SourceFetch(format!(
                    "git ls-remote failed for {}: {}",
                    url,
                    output.tail(5)
                )));
            }
            output.stdout
        }
        other => {
            let url = other
                .query_url()
                .ok_or_else(|| Error::SourceFetch("provider has no query URL".into()))?;
            client.get_text(&url, runner.deadline())?
        }
    };

    let version = provider.parse_response(&body).ok_or_else(|| {
        Error::SourceFetch(format!("no release version found for {}", source_url))
    })?;
    info!("Resolved latest version: {}", version);
    Ok(version)
}

#[derive(Deserialize)]
struct GitHubRelease {
    tag_name: String,
}

#[derive(Deserialize)]
struct GitLabTag {
    name: String,
}

pub fn parse_github_release(body: &str) -> Option<String> {
    let release: GitHubRelease = serde_json::from_str(body).ok()?;
    clean_tag(&release.tag_name)
}

/// GitLab returns tags newest first
pub fn parse_gitlab_tags(body: &str) -> Option<String> {
    let tags: Vec<GitLabTag> = serde_json::from_str(body).ok()?;
    tags.first().and_then(|tag| clean_tag(&tag.name))
}

/// Highest dotted version mentioned in a directory listing
pub fn parse_listing(body: &str) -> Option<String> {
    LISTING_VERSION
        .captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .max_by(|a, b| compare_versions(a, b))
}

/// Highest version among `git ls-remote --tags` lines
pub fn parse_ls_remote(body: &str) -> Option<String> {
    body.lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|r| r.strip_prefix("refs/tags/"))
        .filter_map(clean_tag)
        .filter(|tag| tag.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .max_by(|a, b| compare_versions(a, b))
}

fn clean_tag(tag: &str) -> Option<String> {
    let tag = tag.trim();
    let tag = tag
        .strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag);
    (!tag.is_empty()).then(|| tag.to_string())
}

/// Compare dotted versions numerically, component by component
///
/// Uses semver ordering when both sides are valid semver.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if let (Ok(va), Ok(vb)) = (semver::Version::parse(a), semver::Version::parse(b)) {
        return va.cmp(&vb);
    }
    let parts = |s: &str| -> Vec<u64> {
        s.split(['.', '-', '_'])
            .map(|p| {
                p.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    parts(a).cmp(&parts(b))
}
