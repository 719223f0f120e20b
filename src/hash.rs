// src/hash.rs

//! Digest algorithms for source verification and package checksum manifests
//!
//! | Algorithm | Manifest file | Notes |
//! |-----------|---------------|-------|
//! | SHA-256   | `sha256sums`  | default, cryptographic |
//! | CRC32     | `crc32sums`   | compatible with early APG tooling |
//! | MD5       | `md5sums`     | legacy |
//! | XXH128    | `xxh128sums`  | fast, non-cryptographic |
//!
//! One algorithm is chosen per run and applied to every staged file.

use crc32fast::Hasher as Crc32;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use xxhash_rust::xxh3::Xxh3;

/// Checksum algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Crc32,
    Md5,
    Xxh128,
}

impl HashAlgorithm {
    /// Digest length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Crc32 => 4,
            Self::Md5 => 16,
            Self::Xxh128 => 16,
        }
    }

    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Crc32 => "crc32",
            Self::Md5 => "md5",
            Self::Xxh128 => "xxh128",
        }
    }

    /// Name of the checksum manifest inside a package (`sha256sums`, ...)
    pub fn manifest_name(&self) -> String {
        format!("{}sums", self.name())
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "crc32" | "crc" => Ok(Self::Crc32),
            "md5" => Ok(Self::Md5),
            "xxh128" | "xxh3" | "xxhash" => Ok(Self::Xxh128),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("invalid {algorithm} digest length: expected {expected}, got {got}")]
    InvalidLength {
        algorithm: HashAlgorithm,
        expected: usize,
        got: usize,
    },
    #[error("invalid hex in digest: {0}")]
    InvalidHex(String),
}

/// A digest together with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex
    pub value: String,
}

impl Hash {
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Result<Self, HashError> {
        let value = value.into();
        if value.len() != algorithm.hex_len() {
            return Err(HashError::InvalidLength {
                algorithm,
                expected: algorithm.hex_len(),
                got: value.len(),
            });
        }
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value));
        }
        Ok(Self {
            algorithm,
            value: value.to_ascii_lowercase(),
        })
    }

    /// Parse `algo:hex`; a bare hex string is taken as SHA-256
    pub fn parse_prefixed(s: &str) -> Result<Self, HashError> {
        match s.split_once(':') {
            Some((algo, hex)) => Self::new(algo.parse()?, hex),
            None => Self::new(HashAlgorithm::Sha256, s),
        }
    }

    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", self.algorithm, self.value)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Incremental hasher over any supported algorithm
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    Crc32(Crc32),
    Md5(Md5),
    Xxh128(Box<Xxh3>),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Crc32 => HasherState::Crc32(Crc32::new()),
            HashAlgorithm::Md5 => HasherState::Md5(Md5::new()),
            HashAlgorithm::Xxh128 => HasherState::Xxh128(Box::new(Xxh3::new())),
        };
        Self { algorithm, state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(h) => h.update(data),
            HasherState::Crc32(h) => h.update(data),
            HasherState::Md5(h) => h.update(data),
            HasherState::Xxh128(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Hash {
        let value = match self.state {
            HasherState::Sha256(h) => hex::encode(h.finalize()),
            HasherState::Crc32(h) => format!("{:08x}", h.finalize()),
            HasherState::Md5(h) => hex::encode(h.finalize()),
            HasherState::Xxh128(h) => format!("{:032x}", h.digest128()),
        };
        Hash {
            algorithm: self.algorithm,
            value,
        }
    }
}

pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<Hash> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}

/// Stream a file through the hasher
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<Hash> {
    let mut file = File::open(path)?;
    hash_reader(algorithm, &mut file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_known_digests() {
        let data = b"hello world";
        assert_eq!(
            hash_bytes(HashAlgorithm::Sha256, data).value,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            hash_bytes(HashAlgorithm::Md5, data).value,
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(hash_bytes(HashAlgorithm::Crc32, data).value, "0d4a1185");
    }

    #[test]
    fn test_output_lengths() {
        for algo in [
            HashAlgorithm::Sha256,
            HashAlgorithm::Crc32,
            HashAlgorithm::Md5,
            HashAlgorithm::Xxh128,
        ] {
            assert_eq!(hash_bytes(algo, b"x").value.len(), algo.hex_len(), "{algo}");
        }
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("crc32".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Crc32);
        assert!("blake9".parse::<HashAlgorithm>().is_err());
        assert_eq!(HashAlgorithm::Md5.manifest_name(), "md5sums");
    }

    #[test]
    fn test_parse_prefixed() {
        let h = Hash::parse_prefixed("md5:5EB63BBBE01EEED093CB22BB8F5ACDC3").unwrap();
        assert_eq!(h.algorithm, HashAlgorithm::Md5);
        assert_eq!(h.value, "5eb63bbbe01eeed093cb22bb8f5acdc3");

        assert!(matches!(
            Hash::parse_prefixed("sha256:abcd"),
            Err(HashError::InvalidLength { .. })
        ));
        assert!(matches!(
            Hash::parse_prefixed("crc32:zzzzzzzz"),
            Err(HashError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_hash_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        let digest = hash_file(HashAlgorithm::Crc32, file.path()).unwrap();
        assert_eq!(digest.to_prefixed_string(), "crc32:0d4a1185");
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut hasher = Hasher::new(HashAlgorithm::Xxh128);
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), hash_bytes(HashAlgorithm::Xxh128, b"hello world"));
    }
}
