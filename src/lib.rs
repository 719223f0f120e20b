// src/lib.rs

//! apger: the APG package build engine
//!
//! Turns a declarative recipe into a signed `.apg` binary package.
//!
//! # Pipeline
//!
//! - Recipe: parsed and validated from JSON or YAML ([`recipe`])
//! - Source: version resolution, download, checksum, unpack ([`source`])
//! - Kitchen: per-run working tree, build dependencies, build steps ([`kitchen`])
//! - Templates: build-system specific step plans ([`template`])
//! - APG: staging, archive, manifest, metadata, signature ([`apg`])
//!
//! Every failure surfaces as one [`Error`] variant naming the stage that
//! failed. The secret signing key never leaves the signing step.

pub mod apg;
pub mod compression;
pub mod config;
mod error;
pub mod hash;
pub mod kitchen;
pub mod recipe;
pub mod source;
pub mod template;

pub use config::EngineConfig;
pub use error::{BuildPhase, Error, Result, Stage};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use kitchen::{CancelFlag, CookResult, Kitchen};
pub use recipe::{parse_recipe_file, LoadedRecipe, Recipe, TemplateKind};
