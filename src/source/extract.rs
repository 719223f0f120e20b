// src/source/extract.rs

//! Source archive extraction
//!
//! The container format is detected from magic bytes, never from the file
//! name, so mislabelled downloads still unpack. Entries that would land
//! outside the destination are rejected.

use crate::compression::{create_decoder, CompressionFormat};
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Detected archive container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    /// tar, possibly compressed
    Tar(CompressionFormat),
}

impl ArchiveKind {
    /// Detect the container from the first bytes of a file
    ///
    /// An uncompressed stream is only accepted as tar when it carries the
    /// `ustar` magic at offset 257.
    pub fn detect(header: &[u8]) -> Option<Self> {
        if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
            return Some(Self::Zip);
        }
        match CompressionFormat::from_magic_bytes(header) {
            CompressionFormat::None => header
                .get(257..262)
                .filter(|magic| *magic == b"ustar")
                .map(|_| Self::Tar(CompressionFormat::None)),
            compressed => Some(Self::Tar(compressed)),
        }
    }
}

/// Unpack `archive` into `dest` and return the source root
///
/// When the archive holds exactly one top-level directory, that directory
/// is the source root.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<PathBuf> {
    let read_error =
        |e: std::io::Error| Error::SourceExtract(format!("cannot read {}: {}", archive.display(), e));
    let mut file = File::open(archive).map_err(read_error)?;
    let mut header = [0u8; 512];
    let len = read_up_to(&mut file, &mut header).map_err(read_error)?;
    file.seek(SeekFrom::Start(0)).map_err(read_error)?;

    let kind = ArchiveKind::detect(&header[..len]).ok_or_else(|| {
        Error::SourceExtract(format!(
            "{} is not a recognized archive (tar, tar.gz, tar.xz, tar.zst, tar.bz2, zip)",
            archive.display()
        ))
    })?;
    info!("Extracting {} ({:?})", archive.display(), kind);

    fs::create_dir_all(dest).map_err(|e| {
        Error::SourceExtract(format!("cannot create {}: {}", dest.display(), e))
    })?;
    match kind {
        ArchiveKind::Zip => extract_zip(file, dest)?,
        ArchiveKind::Tar(format) => extract_tar(file, format, dest)?,
    }

    source_root(dest)
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn extract_tar(file: File, format: CompressionFormat, dest: &Path) -> Result<()> {
    let decoder = create_decoder(BufReader::new(file), format)
        .map_err(|e| Error::SourceExtract(e.to_string()))?;
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let entries = archive
        .entries()
        .map_err(|e| Error::SourceExtract(format!("corrupt {} tarball: {}", format, e)))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::SourceExtract(format!("corrupt tar entry: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| Error::SourceExtract(format!("bad tar entry path: {}", e)))?
            .into_owned();
        if !is_safe_relative(&path) {
            return Err(Error::SourceExtract(format!(
                "tar entry escapes extraction root: {}",
                path.display()
            )));
        }
        // unpack_in refuses paths outside dest, including through symlinks
        let unpacked = entry.unpack_in(dest).map_err(|e| {
            Error::SourceExtract(format!("failed to unpack {}: {}", path.display(), e))
        })?;
        if !unpacked {
            return Err(Error::SourceExtract(format!(
                "tar entry escapes extraction root: {}",
                path.display()
            )));
        }
    }
    Ok(())
}

fn extract_zip(file: File, dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::SourceExtract(format!("corrupt zip archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::SourceExtract(format!("corrupt zip entry: {}", e)))?;
        let relative = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
            Error::SourceExtract(format!("zip entry escapes extraction root: {}", entry.name()))
        })?;
        let target = dest.join(&relative);
        let unpack_error =
            |e: std::io::Error| Error::SourceExtract(format!("failed to unpack {}: {}", relative.display(), e));

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(unpack_error)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(unpack_error)?;
        }

        let mode = entry.unix_mode();
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            // The entry body is the link target
            let mut link = String::new();
            entry.read_to_string(&mut link).map_err(unpack_error)?;
            if Path::new(&link).is_absolute() || !is_safe_link(&relative, Path::new(&link)) {
                return Err(Error::SourceExtract(format!(
                    "zip symlink {} points outside the extraction root: {}",
                    relative.display(),
                    link
                )));
            }
            if target.symlink_metadata().is_ok() {
                fs::remove_file(&target).map_err(unpack_error)?;
            }
            std::os::unix::fs::symlink(&link, &target).map_err(unpack_error)?;
            continue;
        }

        let mut out = File::create(&target).map_err(unpack_error)?;
        std::io::copy(&mut entry, &mut out).map_err(unpack_error)?;
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))
                .map_err(unpack_error)?;
        }
    }
    Ok(())
}

/// File type bits of a unix mode
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// A relative link target must resolve inside the archive root
fn is_safe_link(entry: &Path, target: &Path) -> bool {
    let mut depth: usize = entry.parent().map_or(0, |p| p.components().count());
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn is_safe_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Descend into a lone top-level directory
pub fn source_root(dest: &Path) -> Result<PathBuf> {
    let list_error =
        |e: std::io::Error| Error::SourceExtract(format!("cannot list {}: {}", dest.display(), e));
    let entries: Vec<_> = fs::read_dir(dest)
        .map_err(list_error)?
        .collect::<std::io::Result<_>>()
        .map_err(list_error)?;
    if entries.is_empty() {
        return Err(Error::SourceExtract(format!(
            "archive extracted to nothing in {}",
            dest.display()
        )));
    }
    if let [only] = entries.as_slice()
        && only.file_type().map_err(list_error)?.is_dir()
    {
        debug!("Source root is {}", only.path().display());
        return Ok(only.path());
    }
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (path, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_detect_kinds() {
        assert_eq!(ArchiveKind::detect(b"PK\x03\x04rest"), Some(ArchiveKind::Zip));
        assert_eq!(
            ArchiveKind::detect(&[0x1f, 0x8b, 0x08]),
            Some(ArchiveKind::Tar(CompressionFormat::Gzip))
        );
        assert_eq!(ArchiveKind::detect(b"#!/bin/sh\necho hi\n"), None);

        let mut plain = vec![0u8; 512];
        plain[257..262].copy_from_slice(b"ustar");
        assert_eq!(
            ArchiveKind::detect(&plain),
            Some(ArchiveKind::Tar(CompressionFormat::None))
        );
    }

    #[test]
    fn test_extract_tar_gz_single_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("hello-1.0.tar.gz");
        fs::write(
            &archive,
            tar_gz(&[
                ("hello-1.0/configure", b"#!/bin/sh\n", 0o755),
                ("hello-1.0/src/main.c", b"int main(){}\n", 0o644),
            ]),
        )
        .unwrap();

        let root = extract_archive(&archive, &dir.path().join("src")).unwrap();
        assert_eq!(root, dir.path().join("src").join("hello-1.0"));
        assert!(root.join("src/main.c").is_file());

        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(root.join("configure")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_extract_flat_archive_keeps_dest() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("flat.tgz");
        fs::write(
            &archive,
            tar_gz(&[("a.txt", b"a", 0o644), ("b.txt", b"b", 0o644)]),
        )
        .unwrap();

        let dest = dir.path().join("out");
        assert_eq!(extract_archive(&archive, &dest).unwrap(), dest);
    }

    #[test]
    fn test_extract_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tool.zip");
        {
            let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::FileOptions::default().unix_permissions(0o755);
            writer.start_file("tool-2.0/run.sh", options).unwrap();
            writer.write_all(b"#!/bin/sh\n").unwrap();
            writer.finish().unwrap();
        }

        let root = extract_archive(&archive, &dir.path().join("src")).unwrap();
        assert!(root.ends_with("tool-2.0"));
        assert!(root.join("run.sh").is_file());
    }

    #[test]
    fn test_extract_zip_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tool.zip");
        {
            let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::FileOptions::default().unix_permissions(0o755);
            writer.start_file("tool-2.0/bin/tool", options).unwrap();
            writer.write_all(b"#!/bin/sh\n").unwrap();
            writer
                .add_symlink("tool-2.0/bin/t", "tool", zip::write::FileOptions::default())
                .unwrap();
            writer.finish().unwrap();
        }

        let root = extract_archive(&archive, &dir.path().join("src")).unwrap();
        let link = root.join("bin/t");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("tool"));
    }

    #[test]
    fn test_zip_symlink_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        {
            let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
            writer
                .add_symlink("pkg/passwd", "../../etc/passwd", zip::write::FileOptions::default())
                .unwrap();
            writer.finish().unwrap();
        }

        let err = extract_archive(&archive, &dir.path().join("src")).unwrap_err();
        assert!(matches!(err, Error::SourceExtract(_)), "{err:?}");
    }

    #[test]
    fn test_safe_link() {
        assert!(is_safe_link(Path::new("pkg/bin/t"), Path::new("tool")));
        assert!(is_safe_link(Path::new("pkg/bin/t"), Path::new("../lib/libt.so")));
        assert!(!is_safe_link(Path::new("pkg/t"), Path::new("../../etc/passwd")));
    }

    #[test]
    fn test_rejects_non_archive() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("index.html");
        fs::write(&bogus, "<html>404</html>").unwrap();
        let err = extract_archive(&bogus, &dir.path().join("src")).unwrap_err();
        assert!(matches!(err, Error::SourceExtract(_)));
    }

    #[test]
    fn test_safe_relative() {
        assert!(is_safe_relative(Path::new("pkg/src/main.c")));
        assert!(!is_safe_relative(Path::new("../etc/passwd")));
        assert!(!is_safe_relative(Path::new("/etc/passwd")));
    }
}
