// src/compression/mod.rs
//! Stream compression detection and decoding
//!
//! Upstream source tarballs arrive with whatever compression the project
//! chose; packages are always written with zstd.

use std::io::{self, Read};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Failed to create {format} decoder: {source}")]
    DecoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to create {format} encoder: {source}")]
    EncoderCreation {
        format: &'static str,
        source: io::Error,
    },
}

/// Compression wrapped around a tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    None,
    Gzip,
    Xz,
    Zstd,
    Bzip2,
}

impl CompressionFormat {
    /// Detect compression from file name suffix
    pub fn from_extension(path: &str) -> Self {
        if path.ends_with(".gz") || path.ends_with(".tgz") {
            Self::Gzip
        } else if path.ends_with(".xz") || path.ends_with(".txz") {
            Self::Xz
        } else if path.ends_with(".zst") || path.ends_with(".zstd") || path.ends_with(".apg") {
            Self::Zstd
        } else if path.ends_with(".bz2") || path.ends_with(".tbz2") {
            Self::Bzip2
        } else {
            Self::None
        }
    }

    /// Detect compression from leading magic bytes
    ///
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    /// - Bzip2: `42 5a 68` ("BZh")
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Self::Xz
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else if data.starts_with(b"BZh") {
            Self::Bzip2
        } else {
            Self::None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
            Self::Bzip2 => "bzip2",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Wrap a reader in the decoder for `format`
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::MultiGzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Bzip2 => Ok(Box::new(bzip2::read::BzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder =
                zstd::Decoder::new(reader).map_err(|e| CompressionError::DecoderCreation {
                    format: "zstd",
                    source: e,
                })?;
            Ok(Box::new(decoder))
        }
    }
}

/// zstd encoder at `level`; the caller must call `finish()`
pub fn zstd_encoder<'a, W: io::Write>(
    writer: W,
    level: i32,
) -> Result<zstd::Encoder<'a, W>, CompressionError> {
    zstd::Encoder::new(writer, level).map_err(|e| CompressionError::EncoderCreation {
        format: "zstd",
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(CompressionFormat::from_extension("foo-1.0.tar.gz"), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::from_extension("foo-1.0.tgz"), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::from_extension("foo-1.0.tar.xz"), CompressionFormat::Xz);
        assert_eq!(CompressionFormat::from_extension("foo-1.0.tar.bz2"), CompressionFormat::Bzip2);
        assert_eq!(CompressionFormat::from_extension("foo-1.0.apg"), CompressionFormat::Zstd);
        assert_eq!(CompressionFormat::from_extension("foo-1.0.tar"), CompressionFormat::None);
    }

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x1f, 0x8b, 0x08, 0x00]),
            CompressionFormat::Gzip
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]),
            CompressionFormat::Xz
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x28, 0xb5, 0x2f, 0xfd]),
            CompressionFormat::Zstd
        );
        assert_eq!(CompressionFormat::from_magic_bytes(b"BZh91AY"), CompressionFormat::Bzip2);
        assert_eq!(CompressionFormat::from_magic_bytes(&[0x1f]), CompressionFormat::None);
    }

    #[test]
    fn test_gzip_decoder() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(b"hello").unwrap();
        let compressed = encoder.finish().unwrap();

        let format = CompressionFormat::from_magic_bytes(&compressed);
        assert_eq!(format, CompressionFormat::Gzip);

        let mut out = String::new();
        create_decoder(&compressed[..], format)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_zstd_encoder_decoder() {
        let mut encoder = zstd_encoder(Vec::new(), 19).unwrap();
        encoder.write_all(b"package payload").unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(
            CompressionFormat::from_magic_bytes(&compressed),
            CompressionFormat::Zstd
        );

        let mut out = Vec::new();
        create_decoder(&compressed[..], CompressionFormat::Zstd)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"package payload");
    }
}
