// src/apg/builder.rs

//! APG archive writer
//!
//! An `.apg` file is a zstd-compressed tar stream with members in this order:
//!
//! 1. `data/` - the destination root
//! 2. `home/` - optional home overlay
//! 3. `scripts/` - lifecycle scripts present in the recipe
//! 4. `metadata.json`
//! 5. `<algo>sums` - checksum manifest
//!
//! Every header carries the same mtime, uid/gid 0 and empty owner names, so
//! the tar stream depends only on file contents, modes and paths. The
//! archive is written to a temporary file next to its destination and
//! renamed into place only once complete.

use super::manifest::ChecksumManifest;
use super::metadata::METADATA_FILE;
use super::stage::{StagedEntry, StagedPackage};
use crate::compression;
use crate::config::ArchiveSection;
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tar::{EntryType, Header};
use tracing::{debug, info};

/// Mode of a published archive; temporary files start out owner-only
const ARCHIVE_MODE: u32 = 0o644;

/// 2024-01-01 00:00:00 UTC
pub const DEFAULT_MTIME: u64 = 1704067200;

/// A finished archive on disk
#[derive(Debug, Clone)]
pub struct BuiltArchive {
    pub path: PathBuf,
    pub manifest: ChecksumManifest,
    pub size: u64,
}

pub struct ArchiveBuilder<'a> {
    config: &'a ArchiveSection,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(config: &'a ArchiveSection) -> Self {
        Self { config }
    }

    /// Timestamp stamped on every entry
    ///
    /// The configured value wins, then `SOURCE_DATE_EPOCH`, then
    /// [`DEFAULT_MTIME`].
    pub fn mtime(&self) -> u64 {
        self.config.mtime.unwrap_or_else(|| {
            std::env::var("SOURCE_DATE_EPOCH")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(DEFAULT_MTIME)
        })
    }

    /// Pack `staged` into `<output_dir>/<archive_name>`
    pub fn build(
        &self,
        staged: &StagedPackage,
        output_dir: &Path,
        archive_name: &str,
    ) -> Result<BuiltArchive> {
        let manifest = ChecksumManifest::compute(staged, self.config.checksum)?;
        let metadata_json = staged.metadata().to_json()?;

        fs::create_dir_all(output_dir).map_err(|e| {
            Error::ArchiveBuild(format!("cannot create {}: {}", output_dir.display(), e))
        })?;
        let final_path = output_dir.join(archive_name);
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", archive_name))
            .suffix(".partial")
            .tempfile_in(output_dir)
            .map_err(|e| {
                Error::ArchiveBuild(format!("cannot create temporary archive: {}", e))
            })?;

        self.write_archive(temp.as_file(), staged, &metadata_json, &manifest)
            .map_err(|e| {
                Error::ArchiveBuild(format!("failed to write {}: {}", archive_name, e))
            })?;

        fs::set_permissions(temp.path(), fs::Permissions::from_mode(ARCHIVE_MODE)).map_err(|e| {
            Error::ArchiveBuild(format!("cannot set permissions on {}: {}", archive_name, e))
        })?;

        // The temporary file is removed on drop if persisting fails
        let file = temp
            .persist(&final_path)
            .map_err(|e| Error::ArchiveBuild(format!("cannot move archive into place: {}", e)))?;
        let size = file.metadata()?.len();

        info!(
            "Wrote {} ({} files, {} bytes)",
            final_path.display(),
            manifest.len(),
            size
        );
        Ok(BuiltArchive {
            path: final_path,
            manifest,
            size,
        })
    }

    fn write_archive(
        &self,
        file: &File,
        staged: &StagedPackage,
        metadata_json: &str,
        manifest: &ChecksumManifest,
    ) -> io::Result<()> {
        let mtime = self.mtime();
        let encoder = compression::zstd_encoder(BufWriter::new(file), self.config.compression_level)
            .map_err(io::Error::other)?;
        let mut archive = tar::Builder::new(encoder);

        for (path, entry) in staged.entries() {
            debug!("Packing {}", path);
            match entry {
                StagedEntry::Dir { mode } => {
                    let mut header = normalized_header(EntryType::Directory, *mode, 0, mtime);
                    archive.append_data(&mut header, format!("{}/", path), io::empty())?;
                }
                StagedEntry::File { source, mode, .. } => {
                    let mut content = File::open(source)?;
                    // Size comes from the open file, not the staging snapshot
                    let size = content.metadata()?.len();
                    let mut header = normalized_header(EntryType::Regular, *mode, size, mtime);
                    archive.append_data(&mut header, path, &mut content)?;
                }
                StagedEntry::Symlink { target, mode } => {
                    let mut header = normalized_header(EntryType::Symlink, *mode, 0, mtime);
                    archive.append_link(&mut header, path, target)?;
                }
            }
        }

        let mut header = normalized_header(EntryType::Regular, 0o644, metadata_json.len() as u64, mtime);
        archive.append_data(&mut header, METADATA_FILE, metadata_json.as_bytes())?;

        let sums = manifest.to_text();
        let mut header = normalized_header(EntryType::Regular, 0o644, sums.len() as u64, mtime);
        archive.append_data(&mut header, manifest.file_name(), sums.as_bytes())?;

        let encoder = archive.into_inner()?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}

fn normalized_header(entry_type: EntryType, mode: u32, size: u64, mtime: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    // Empty names cannot fail to fit
    let _ = header.set_username("");
    let _ = header.set_groupname("");
    header.set_cksum();
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apg::metadata::test_metadata;
    use crate::hash::HashAlgorithm;
    use std::io::Read;

    fn staged(dir: &Path) -> StagedPackage {
        let dest = dir.join("dest");
        fs::create_dir_all(dest.join("usr/bin")).unwrap();
        fs::write(dest.join("usr/bin/hello"), "#!/bin/sh\necho hello\n").unwrap();
        std::os::unix::fs::symlink("hello", dest.join("usr/bin/hi")).unwrap();
        StagedPackage::assemble(&dest, None, None, test_metadata()).unwrap()
    }

    fn member_names(archive: &Path) -> Vec<String> {
        let decoder = zstd::Decoder::new(File::open(archive).unwrap()).unwrap();
        let mut tar = tar::Archive::new(decoder);
        tar.entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let path = e.path().unwrap().to_string_lossy().into_owned();
                path.trim_end_matches('/').to_string()
            })
            .collect()
    }

    #[test]
    fn test_member_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = ArchiveSection {
            checksum: HashAlgorithm::Sha256,
            compression_level: 3,
            mtime: Some(0),
        };
        let built = ArchiveBuilder::new(&config)
            .build(&staged(dir.path()), &dir.path().join("out"), "hello-2.12.apg")
            .unwrap();

        assert_eq!(built.path, dir.path().join("out/hello-2.12.apg"));
        let names = member_names(&built.path);
        assert_eq!(
            names,
            vec![
                "data",
                "data/usr",
                "data/usr/bin",
                "data/usr/bin/hello",
                "data/usr/bin/hi",
                "scripts",
                "metadata.json",
                "sha256sums",
            ]
        );
        assert_eq!(built.manifest.len(), 1);
    }

    #[test]
    fn test_headers_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let config = ArchiveSection {
            mtime: Some(1_700_000_000),
            compression_level: 3,
            ..ArchiveSection::default()
        };
        let built = ArchiveBuilder::new(&config)
            .build(&staged(dir.path()), dir.path(), "hello-2.12.apg")
            .unwrap();

        let decoder = zstd::Decoder::new(File::open(&built.path).unwrap()).unwrap();
        let mut tar = tar::Archive::new(decoder);
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let header = entry.header();
            assert_eq!(header.mtime().unwrap(), 1_700_000_000);
            assert_eq!(header.uid().unwrap(), 0);
            assert_eq!(header.gid().unwrap(), 0);
            if entry.path().unwrap().to_string_lossy() == "metadata.json" {
                let mut json = String::new();
                entry.read_to_string(&mut json).unwrap();
                assert!(json.contains("\"name\": \"hello\""));
            }
        }
    }

    #[test]
    fn test_no_partial_files_left() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let config = ArchiveSection {
            compression_level: 3,
            ..ArchiveSection::default()
        };
        ArchiveBuilder::new(&config)
            .build(&staged(dir.path()), &out, "hello-2.12.apg")
            .unwrap();
        let names: Vec<_> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["hello-2.12.apg"]);
        let mode = fs::metadata(out.join("hello-2.12.apg"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
