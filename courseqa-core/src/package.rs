//! Course package extraction and repackaging.
//!
//! A package is a zip archive holding a SCORM manifest, a launch page and
//! any number of markup documents. Extraction always happens into a scratch
//! directory that is removed when the [`ExtractedPackage`] is dropped, so
//! every exit path of a scan or fix releases it.

use std::collections::BTreeSet;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::error::{CourseQaError, Result};

/// Manifest file name expected at the package root.
pub const MANIFEST_FILE: &str = "imsmanifest.xml";
/// Launch page expected at the package root.
pub const LAUNCH_FILE: &str = "index.html";

/// Whether a file name denotes a markup document.
pub fn is_markup(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

/// Parent directory for scratch extraction directories.
#[derive(Debug, Clone, Default)]
pub struct ScratchSpace {
    parent: Option<PathBuf>,
}

impl ScratchSpace {
    /// Use the system temporary directory.
    pub fn system() -> Self {
        Self { parent: None }
    }

    /// Use a specific parent directory.
    pub fn within(parent: impl Into<PathBuf>) -> Self {
        Self {
            parent: Some(parent.into()),
        }
    }

    /// Read `COURSEQA_SCRATCH_DIR`, falling back to the system temp dir.
    pub fn from_env() -> Self {
        match std::env::var("COURSEQA_SCRATCH_DIR") {
            Ok(dir) if !dir.trim().is_empty() => Self::within(dir.trim()),
            _ => Self::system(),
        }
    }

    /// Allocate a fresh directory removed on drop.
    pub fn allocate(&self, prefix: &str) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match &self.parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

/// What the manifest validator sees of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageListing {
    /// Lowercased names of every file entry.
    pub entry_names: BTreeSet<String>,
    /// Manifest contents when the entry exists.
    pub manifest: Option<ManifestText>,
}

/// Manifest contents as read from the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestText {
    /// The manifest decoded as text.
    Text(String),
    /// The manifest exists but could not be read as text.
    Unreadable(String),
}

/// An opened course archive.
pub struct CoursePackage {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl CoursePackage {
    /// Open an archive held in memory.
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        Ok(Self { archive })
    }

    /// Names of every file entry, in archive order.
    pub fn file_names(&self) -> Vec<String> {
        self.archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect()
    }

    /// Entry names and manifest text for validation.
    pub fn listing(&mut self) -> PackageListing {
        let names = self.file_names();
        let entry_names = names
            .iter()
            .map(|name| name.to_ascii_lowercase())
            .collect::<BTreeSet<_>>();
        let manifest_entry = names
            .iter()
            .find(|name| name.eq_ignore_ascii_case(MANIFEST_FILE))
            .cloned();
        let manifest = manifest_entry.map(|name| self.read_manifest(&name));
        PackageListing {
            entry_names,
            manifest,
        }
    }

    fn read_manifest(&mut self, name: &str) -> ManifestText {
        let mut bytes = Vec::new();
        let read = self
            .archive
            .by_name(name)
            .map_err(CourseQaError::from)
            .and_then(|mut file| file.read_to_end(&mut bytes).map_err(CourseQaError::from));
        if let Err(err) = read {
            return ManifestText::Unreadable(err.to_string());
        }
        match String::from_utf8(bytes) {
            Ok(text) => ManifestText::Text(text),
            Err(err) => ManifestText::Unreadable(err.to_string()),
        }
    }

    /// Materialize every entry into a new scratch directory.
    ///
    /// Entries whose names escape the extraction root are rejected rather
    /// than skipped.
    pub fn extract(&mut self, scratch: &ScratchSpace, prefix: &str) -> Result<ExtractedPackage> {
        let dir = scratch.allocate(prefix)?;
        let mut markup_files = Vec::new();

        for index in 0..self.archive.len() {
            let mut file = self.archive.by_index(index)?;
            let name = file.name().to_string();
            let relative = file.enclosed_name().ok_or_else(|| {
                CourseQaError::Archive(format!("entry escapes the package root: {name}"))
            })?;
            let target = dir.path().join(&relative);
            if file.is_dir() {
                std::fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut output = std::fs::File::create(&target)?;
            io::copy(&mut file, &mut output)?;
            if is_markup(&name) {
                markup_files.push(target);
            }
        }

        Ok(ExtractedPackage { dir, markup_files })
    }
}

/// A package materialized on disk. The directory is deleted on drop.
#[derive(Debug)]
pub struct ExtractedPackage {
    dir: TempDir,
    markup_files: Vec<PathBuf>,
}

impl ExtractedPackage {
    /// Extraction root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Markup documents in archive order.
    pub fn markup_files(&self) -> &[PathBuf] {
        &self.markup_files
    }
}

/// Zip every file below `root`, using `/`-separated relative names.
pub fn repackage(root: &Path) -> Result<Vec<u8>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for path in files {
        let relative = path
            .strip_prefix(root)
            .map_err(|err| CourseQaError::Other(err.to_string()))?;
        let name = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        writer.start_file(name, options)?;
        writer.write_all(&std::fs::read(&path)?)?;
    }
    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};

    use zip::write::{SimpleFileOptions, ZipWriter};

    /// Build an in-memory archive from `(name, contents)` pairs.
    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .expect("start entry");
            writer.write_all(contents).expect("write entry");
        }
        writer.finish().expect("finish zip").into_inner()
    }

    /// A package that passes every structural check.
    pub(crate) fn valid_package(index_html: &str) -> Vec<u8> {
        let manifest = r#"<manifest><resources><resource identifier="r1" adlcp:scormtype="sco" href="index.html"/></resources></manifest>"#;
        zip_bytes(&[
            ("imsmanifest.xml", manifest.as_bytes()),
            ("index.html", index_html.as_bytes()),
        ])
    }
}
