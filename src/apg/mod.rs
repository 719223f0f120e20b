// src/apg/mod.rs

//! APG binary package format
//!
//! Assembly ([`stage`]), packing ([`builder`]), integrity records
//! ([`metadata`], [`manifest`]), detached signatures ([`signing`]) and
//! read-back verification ([`inspect`]).

pub mod builder;
pub mod inspect;
pub mod manifest;
pub mod metadata;
pub mod signing;
pub mod stage;

pub use builder::{ArchiveBuilder, BuiltArchive};
pub use inspect::{inspect, InspectReport};
pub use manifest::ChecksumManifest;
pub use metadata::Metadata;
pub use signing::{PackageSigner, SignatureArtifact};
pub use stage::{FilesystemOverlay, StagedEntry, StagedPackage};
