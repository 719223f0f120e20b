// src/recipe/format.rs

//! Recipe document format
//!
//! A recipe is a JSON (or YAML) document with three sections:
//!
//! ```json
//! {
//!   "package": {
//!     "name": "zlib-ng",
//!     "version": "latest",
//!     "architecture": "x86_64",
//!     "source": "https://github.com/zlib-ng/zlib-ng/archive/refs/tags/%(version)s.tar.gz",
//!     "description": "zlib replacement with optimizations",
//!     "license": "Zlib"
//!   },
//!   "build": {
//!     "template": "cmake",
//!     "dependencies": ["cmake", "ninja"],
//!     "use": ["shared"],
//!     "extra_flags": ["-DZLIB_COMPAT=ON"]
//!   },
//!   "install": {}
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Version marker requesting upstream resolution
pub const LATEST_VERSION: &str = "latest";

/// A complete, validated recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub package: PackageSection,

    pub build: BuildSection,

    #[serde(default)]
    pub install: InstallSection,
}

impl Recipe {
    /// Whether the version still has to be resolved from upstream
    pub fn needs_version_resolution(&self) -> bool {
        self.package.version.eq_ignore_ascii_case(LATEST_VERSION)
    }

    /// Replace `%(name)s` and `%(version)s` placeholders
    pub fn substitute(&self, template: &str) -> String {
        template
            .replace("%(version)s", &self.package.version)
            .replace("%(name)s", &self.package.name)
    }

    /// Source URL with placeholders filled in
    pub fn source_url(&self) -> String {
        self.substitute(&self.package.source)
    }

    /// Last path segment of the source URL
    pub fn source_filename(&self) -> String {
        let url = self.source_url();
        let trimmed = url.split(['?', '#']).next().unwrap_or(&url);
        trimmed
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("source")
            .to_string()
    }

    /// Typed template; the loader guarantees this parses
    pub fn template(&self) -> TemplateKind {
        self.build
            .template
            .parse()
            .unwrap_or(TemplateKind::Custom)
    }

    /// File name of the produced package
    pub fn archive_name(&self) -> String {
        format!("{}-{}.apg", self.package.name, self.package.version)
    }

    /// Copy of this recipe with a concrete version
    pub fn with_version(&self, version: impl Into<String>) -> Recipe {
        let mut resolved = self.clone();
        resolved.package.version = version.into();
        resolved
    }
}

/// Package identity and metadata
///
/// Optional text fields default to empty strings and list fields to empty
/// lists, so they echo into `metadata.json` exactly as declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSection {
    pub name: String,

    pub version: String,

    pub architecture: String,

    /// Upstream source URL (may contain `%(version)s`)
    pub source: String,

    /// Expected digest of the downloaded source (`algo:hex`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_checksum: Option<String>,

    #[serde(default, rename = "type")]
    pub package_type: PackageType,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub maintainer: String,

    #[serde(default)]
    pub license: String,

    #[serde(default)]
    pub homepage: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Runtime dependencies, recorded in metadata only
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub conflicts: Vec<String>,

    #[serde(default)]
    pub provides: Vec<String>,

    #[serde(default)]
    pub replaces: Vec<String>,

    /// Configuration files the installer must not overwrite
    #[serde(default)]
    pub conf: Vec<String>,
}

/// Build procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSection {
    /// Template name (meson, cmake, autotools, cargo, python-pep517, gradle, custom)
    pub template: String,

    /// Build-time host packages
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Optional features to enable
    #[serde(default, rename = "use")]
    pub use_flags: Vec<String>,

    /// Passed verbatim to the configure step
    #[serde(default)]
    pub extra_flags: Vec<String>,

    /// Shell script for the `custom` template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Extra environment for every build step
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Subdirectory of the source tree to build in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
}

fn default_prefix() -> String {
    "/usr".to_string()
}

/// Install procedure and package payload extras
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallSection {
    /// Shell script run inside the destination root after the template install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Directory (relative to the recipe file) copied into `home/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    /// Directory (relative to the recipe file) holding lifecycle scripts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<String>,

    /// YAML file (relative to the recipe file) listing extra directories,
    /// files and symlinks for the destination root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<String>,
}

/// Package type recorded in metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    #[default]
    Binary,
    Library,
    Meta,
}

impl PackageType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Library => "library",
            Self::Meta => "meta",
        }
    }
}

impl FromStr for PackageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Self::Binary),
            "library" => Ok(Self::Library),
            "meta" => Ok(Self::Meta),
            other => Err(format!(
                "unknown package type '{}' (expected binary, library or meta)",
                other
            )),
        }
    }
}

/// Supported build templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Meson,
    Cmake,
    Autotools,
    Cargo,
    PythonPep517,
    Gradle,
    Custom,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 7] = [
        Self::Meson,
        Self::Cmake,
        Self::Autotools,
        Self::Cargo,
        Self::PythonPep517,
        Self::Gradle,
        Self::Custom,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Meson => "meson",
            Self::Cmake => "cmake",
            Self::Autotools => "autotools",
            Self::Cargo => "cargo",
            Self::PythonPep517 => "python-pep517",
            Self::Gradle => "gradle",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "meson" => Ok(Self::Meson),
            "cmake" => Ok(Self::Cmake),
            "autotools" | "configure" => Ok(Self::Autotools),
            "cargo" | "rust" => Ok(Self::Cargo),
            "python-pep517" | "python" | "pep517" => Ok(Self::PythonPep517),
            "gradle" | "java" | "kotlin" => Ok(Self::Gradle),
            "custom" | "raw" | "script" => Ok(Self::Custom),
            other => Err(format!("unknown template '{}'", other)),
        }
    }
}

/// Target architectures a package can be built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    X86_64,
    Aarch64,
    Armv7h,
    I686,
    Riscv64,
    Ppc64le,
    S390x,
    Any,
}

impl Architecture {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Armv7h => "armv7h",
            Self::I686 => "i686",
            Self::Riscv64 => "riscv64",
            Self::Ppc64le => "ppc64le",
            Self::S390x => "s390x",
            Self::Any => "any",
        }
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" | "amd64" => Ok(Self::X86_64),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            "armv7h" | "armv7" => Ok(Self::Armv7h),
            "i686" | "i386" => Ok(Self::I686),
            "riscv64" => Ok(Self::Riscv64),
            "ppc64le" => Ok(Self::Ppc64le),
            "s390x" => Ok(Self::S390x),
            "any" | "noarch" => Ok(Self::Any),
            other => Err(format!("unknown architecture '{}'", other)),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
