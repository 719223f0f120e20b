// src/config.rs
//! Engine configuration
//!
//! Loaded from a TOML file with the following sections, all optional:
//! - [engine] - Work and output directories, pipeline timeout
//! - [fetch] - HTTP timeouts and retry policy for source downloads
//! - [dependencies] - Host package manager commands and lock handling
//! - [build] - Parallelism and diagnostic output
//! - [archive] - Checksum algorithm and compression level
//! - [signing] - Signing backend and key source
//!
//! Lookup order: explicit path, `$APGER_CONFIG`, then
//! `<config dir>/apger/config.toml`. A missing file means defaults.

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "APGER_CONFIG";

/// Default environment variable carrying the signing key
pub const DEFAULT_KEY_ENV: &str = "APGER_SIGNING_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub fetch: FetchSection,

    #[serde(default)]
    pub dependencies: DependencySection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub archive: ArchiveSection,

    #[serde(default)]
    pub signing: SigningSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Parent for per-run temporary build trees
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// Where finished packages are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Whole-pipeline deadline in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Keep build trees after the run
    #[serde(default)]
    pub keep_builddir: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            output_dir: default_output_dir(),
            timeout_secs: default_timeout_secs(),
            keep_builddir: false,
        }
    }
}

fn default_work_root() -> PathBuf {
    std::env::temp_dir()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist/output")
}

fn default_timeout_secs() -> u64 {
    7200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base delay, multiplied by the attempt number
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Program used for git sources
    #[serde(default = "default_git")]
    pub git_program: String,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            user_agent: default_user_agent(),
            git_program: default_git(),
        }
    }
}

fn default_http_timeout_secs() -> u64 {
    300
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_user_agent() -> String {
    format!("apger/{}", env!("CARGO_PKG_VERSION"))
}

fn default_git() -> String {
    "git".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySection {
    /// Skip dependency installation entirely
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// argv prefix printing/exiting non-zero for unsatisfied dependencies
    #[serde(default = "default_query_command")]
    pub query_command: Vec<String>,

    /// argv prefix installing packages if absent
    #[serde(default = "default_install_command")]
    pub install_command: Vec<String>,

    /// Output substrings meaning the package database is locked
    #[serde(default = "default_lock_patterns")]
    pub lock_patterns: Vec<String>,

    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,
}

impl Default for DependencySection {
    fn default() -> Self {
        Self {
            enabled: true,
            query_command: default_query_command(),
            install_command: default_install_command(),
            lock_patterns: default_lock_patterns(),
            lock_retries: default_lock_retries(),
            lock_retry_delay_ms: default_lock_retry_delay_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_query_command() -> Vec<String> {
    vec!["pacman".into(), "-T".into()]
}

fn default_install_command() -> Vec<String> {
    vec![
        "pacman".into(),
        "-S".into(),
        "--needed".into(),
        "--noconfirm".into(),
    ]
}

fn default_lock_patterns() -> Vec<String> {
    vec![
        "unable to lock database".into(),
        "Could not get lock".into(),
        "database is locked".into(),
    ]
}

fn default_lock_retries() -> u32 {
    5
}

fn default_lock_retry_delay_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    /// Parallel jobs passed to build tools (0 = detect)
    #[serde(default)]
    pub jobs: u32,

    /// Output lines kept in a failed step's error
    #[serde(default = "default_tail_lines")]
    pub output_tail_lines: usize,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            jobs: 0,
            output_tail_lines: default_tail_lines(),
        }
    }
}

impl BuildSection {
    /// Effective job count
    pub fn jobs(&self) -> u32 {
        if self.jobs > 0 {
            return self.jobs;
        }
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(4)
    }
}

fn default_tail_lines() -> usize {
    40
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSection {
    #[serde(default)]
    pub checksum: HashAlgorithm,

    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Fixed timestamp for archive entries; falls back to SOURCE_DATE_EPOCH
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u64>,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        Self {
            checksum: HashAlgorithm::default(),
            compression_level: default_compression_level(),
            mtime: None,
        }
    }
}

fn default_compression_level() -> i32 {
    19
}

/// Which signing implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningBackend {
    /// Sequoia `sq` command-line tool (OpenPGP)
    #[default]
    Sq,
    /// In-process Ed25519
    Ed25519,
}

impl SigningBackend {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sq => "sq",
            Self::Ed25519 => "ed25519",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: SigningBackend,

    /// Environment variable holding the secret key material
    #[serde(default = "default_key_env")]
    pub key_env: String,

    /// Key file, used when the environment variable is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// Identifier recorded alongside the signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    #[serde(default = "default_sq")]
    pub sq_program: String,
}

impl Default for SigningSection {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: SigningBackend::default(),
            key_env: default_key_env(),
            key_file: None,
            key_id: None,
            sq_program: default_sq(),
        }
    }
}

fn default_key_env() -> String {
    DEFAULT_KEY_ENV.to_string()
}

fn default_sq() -> String {
    "sq".to_string()
}

impl EngineConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content, path)
    }

    /// Parse TOML text; `origin` is only used in error messages
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content).map_err(|e| Error::Config {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate(origin)?;
        Ok(config)
    }

    /// Resolve and load the effective configuration
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }
        if let Some(path) = dirs::config_dir().map(|d| d.join("apger").join("config.toml"))
            && path.is_file()
        {
            debug!("Using config file {}", path.display());
            return Self::load(&path);
        }
        Ok(Self::default())
    }

    pub fn validate(&self, origin: &Path) -> Result<()> {
        let fail = |reason: String| Error::Config {
            path: origin.to_path_buf(),
            reason,
        };

        if self.engine.timeout_secs == 0 {
            return Err(fail("engine.timeout_secs must be greater than zero".into()));
        }
        if !(1..=22).contains(&self.archive.compression_level) {
            return Err(fail(format!(
                "archive.compression_level must be between 1 and 22, got {}",
                self.archive.compression_level
            )));
        }
        if self.dependencies.enabled
            && (self.dependencies.install_command.is_empty()
                || self.dependencies.query_command.is_empty())
        {
            return Err(fail(
                "dependencies.install_command and query_command must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.timeout_secs)
    }
}
