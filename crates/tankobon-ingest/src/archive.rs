//! Chapter archive validation and extraction.
//!
//! An archive is accepted only if it is a readable zip whose entries are all
//! plain files at the top level with an allowed image extension. Every entry
//! is decompressed once during validation, so a checksum error surfaces as
//! `InvalidArchive` before anything is written to disk.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tankobon_common::config::IngestConfig;
use tankobon_common::{Error, Result};
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

const FOLDER_PRESENT: &str = "folder present";
const UNSUPPORTED_FILE: &str = "unsupported file";

/// Which entries a chapter archive may contain
#[derive(Clone, Debug)]
pub struct ArchivePolicy {
    allowed_extensions: Vec<String>,
}

impl ArchivePolicy {
    /// Extensions are given without the leading dot and matched exactly
    pub fn new<I, S>(allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_extensions: allowed_extensions.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.allowed_extensions.iter().cloned())
    }

    /// Whether a file name carries an allowed extension
    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.allowed_extensions.iter().any(|a| a == ext))
    }
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

/// An archive that passed validation, with its page names in archive order
#[derive(Clone, Debug)]
pub struct ValidatedArchive {
    path: PathBuf,
    pages: Vec<String>,
}

impl ValidatedArchive {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    /// Extract every page into `dest`, creating it if needed
    pub fn extract(&self, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)?;
        let mut archive = open(&self.path)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(archive_error)?;
            let Some(name) = entry.enclosed_name() else {
                return Err(Error::invalid_archive(format!(
                    "unsafe entry name {:?}",
                    entry.name()
                )));
            };
            let mut out = File::create(dest.join(name))?;
            io::copy(&mut entry, &mut out)?;
        }

        debug!(
            "Extracted {} pages from {} to {}",
            self.pages.len(),
            self.path.display(),
            dest.display()
        );
        Ok(())
    }
}

fn archive_error(e: ZipError) -> Error {
    Error::invalid_archive(e.to_string())
}

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path)
        .map_err(|e| Error::invalid_archive(format!("cannot open archive: {e}")))?;
    ZipArchive::new(file).map_err(archive_error)
}

/// Validate the archive at `path` without extracting it
pub fn inspect(path: &Path, policy: &ArchivePolicy) -> Result<ValidatedArchive> {
    let mut archive = open(path)?;
    let mut pages = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(archive_error)?;
        let name = entry.name().to_string();

        if entry.is_dir() || name.contains(['/', '\\']) {
            return Err(Error::invalid_archive(FOLDER_PRESENT));
        }
        if !policy.allows(&name) {
            return Err(Error::invalid_archive(UNSUPPORTED_FILE));
        }
        if entry.enclosed_name().is_none() {
            return Err(Error::invalid_archive(format!("unsafe entry name {name:?}")));
        }

        // Decompress to verify the checksum
        io::copy(&mut entry, &mut io::sink())
            .map_err(|e| Error::invalid_archive(format!("corrupt entry {name:?}: {e}")))?;
        pages.push(name);
    }

    Ok(ValidatedArchive {
        path: path.to_path_buf(),
        pages,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    /// Write a zip with the given file entries (and `dir/` entries for names
    /// ending in a slash)
    pub fn write_zip(path: &Path, entries: &[&str]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for name in entries {
            if let Some(dir) = name.strip_suffix('/') {
                zip.add_directory(dir, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(format!("page {name}").as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_pages_keep_archive_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chapter.zip");
        write_zip(&path, &["03.png", "01.jpg", "02.jpeg"]);

        let archive = inspect(&path, &ArchivePolicy::default()).unwrap();
        assert_eq!(archive.pages(), ["03.png", "01.jpg", "02.jpeg"]);
    }

    #[test]
    fn test_directory_entry_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chapter.zip");
        write_zip(&path, &["01.jpg", "extras/"]);

        let err = inspect(&path, &ArchivePolicy::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArchive(ref m) if m == "folder present"));
    }

    #[test]
    fn test_nested_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chapter.zip");
        write_zip(&path, &["extras/01.jpg"]);

        let err = inspect(&path, &ArchivePolicy::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArchive(ref m) if m == "folder present"));
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chapter.zip");
        for bad in ["notes.txt", "01.JPG", "noext", "01.gif"] {
            write_zip(&path, &["01.jpg", bad]);
            let err = inspect(&path, &ArchivePolicy::default()).unwrap_err();
            assert!(
                matches!(err, Error::InvalidArchive(ref m) if m == "unsupported file"),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_not_a_zip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chapter.zip");
        fs::write(&path, b"definitely not a zip").unwrap();

        let err = inspect(&path, &ArchivePolicy::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArchive(_)));
    }

    #[test]
    fn test_extract_writes_pages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chapter.zip");
        write_zip(&path, &["01.jpg", "02.png"]);

        let archive = inspect(&path, &ArchivePolicy::default()).unwrap();
        let dest = dir.path().join("out/1/2");
        archive.extract(&dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("01.jpg")).unwrap(), "page 01.jpg");
        assert!(dest.join("02.png").exists());
    }

    #[test]
    fn test_custom_policy() {
        let policy = ArchivePolicy::new(["webp"]);
        assert!(policy.allows("01.webp"));
        assert!(!policy.allows("01.jpg"));
    }
}
