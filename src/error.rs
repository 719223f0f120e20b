// src/error.rs

//! Error types for the apger build pipeline
//!
//! Every pipeline stage has its own variant so callers can tell which stage
//! aborted a run (see [`Error::stage`]).

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Recipe,
    Fetch,
    Dependencies,
    Build,
    Install,
    Staging,
    Archive,
    Signing,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recipe => "recipe",
            Self::Fetch => "fetch",
            Self::Dependencies => "dependencies",
            Self::Build => "build",
            Self::Install => "install",
            Self::Staging => "staging",
            Self::Archive => "archive",
            Self::Signing => "signing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template phase a failing step belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Build,
    Install,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => f.write_str("build"),
            Self::Install => f.write_str("install"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Recipe document is malformed or fails validation
    #[error("invalid recipe field '{field}': {reason}")]
    RecipeValidation { field: String, reason: String },

    /// Source could not be resolved or downloaded
    #[error("source fetch failed: {0}")]
    SourceFetch(String),

    /// Downloaded source could not be unpacked
    #[error("source extraction failed: {0}")]
    SourceExtract(String),

    /// Build dependencies could not be installed
    #[error("dependency installation failed for [{}]: {reason}", unresolved.join(", "))]
    DependencyInstall {
        unresolved: Vec<String>,
        reason: String,
    },

    /// A template step exited unsuccessfully
    #[error("{phase} step '{step}' failed ({}):\n{output_tail}", exit_description(*exit_code))]
    BuildStep {
        phase: BuildPhase,
        step: String,
        exit_code: Option<i32>,
        output_tail: String,
    },

    /// Staged tree could not be assembled
    #[error("staging failed: {0}")]
    Staging(String),

    /// Archive could not be written
    #[error("archive build failed: {0}")]
    ArchiveBuild(String),

    /// Archive could not be signed
    #[error("signing failed: {0}")]
    Signing(String),

    /// Pipeline deadline exceeded or run cancelled
    #[error("{stage} stage interrupted: {reason}")]
    Timeout { stage: Stage, reason: String },

    /// Engine configuration could not be loaded
    #[error("configuration error in {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn exit_description(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl Error {
    /// Shorthand for a recipe validation error
    pub fn recipe(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RecipeValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Pipeline stage this error belongs to
    ///
    /// Errors that can happen anywhere (I/O, configuration) report `None`.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::RecipeValidation { .. } => Some(Stage::Recipe),
            Self::SourceFetch(_) | Self::SourceExtract(_) => Some(Stage::Fetch),
            Self::DependencyInstall { .. } => Some(Stage::Dependencies),
            Self::BuildStep { phase, .. } => Some(match phase {
                BuildPhase::Build => Stage::Build,
                BuildPhase::Install => Stage::Install,
            }),
            Self::Staging(_) => Some(Stage::Staging),
            Self::ArchiveBuild(_) => Some(Stage::Archive),
            Self::Signing(_) => Some(Stage::Signing),
            Self::Timeout { stage, .. } => Some(*stage),
            Self::Config { .. } | Self::Io(_) => None,
        }
    }

    /// Whether the error came from an interrupted run rather than a failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
