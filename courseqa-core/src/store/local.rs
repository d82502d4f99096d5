//! Filesystem object storage.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use super::ObjectStorage;
use crate::error::{CourseQaError, Result};

/// Stores objects as `<root>/<category>/<projectId>/<fileName>`.
///
/// Locators are the `/`-separated path below the root.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    /// Store objects below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Read `COURSEQA_STORAGE_DIR`, defaulting to `./storage`.
    pub fn from_env() -> Self {
        let root = std::env::var("COURSEQA_STORAGE_DIR").unwrap_or_else(|_| "./storage".to_string());
        Self::new(root)
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let relative = Path::new(locator);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if locator.is_empty() || !safe {
            return Err(CourseQaError::Store(format!("invalid object locator: {locator}")));
        }
        Ok(self.root.join(relative))
    }
}

fn check_segment(kind: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(CourseQaError::Store(format!("invalid {kind}: {value}")))
    }
}

impl ObjectStorage for LocalObjectStorage {
    fn read(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.resolve(locator)?;
        std::fs::read(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => CourseQaError::NotFound(format!("object not found: {locator}")),
            _ => CourseQaError::Io(err),
        })
    }

    fn write(
        &self,
        category: &str,
        project_id: &str,
        file_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String> {
        check_segment("category", category)?;
        check_segment("project id", project_id)?;
        check_segment("file name", file_name)?;

        let locator = self.locate(category, project_id, file_name);
        let path = self.resolve(&locator)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        log::debug!("stored {locator} ({content_type}, {} bytes)", bytes.len());
        Ok(locator)
    }

    fn locate(&self, category: &str, project_id: &str, file_name: &str) -> String {
        format!("{category}/{project_id}/{file_name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let root = tempfile::tempdir().expect("root");
        let storage = LocalObjectStorage::new(root.path());

        let locator = storage
            .write("qa", "p1", "fixed.zip", b"zip-bytes", "application/zip")
            .expect("write");
        assert_eq!(locator, "qa/p1/fixed.zip");
        assert_eq!(locator, storage.locate("qa", "p1", "fixed.zip"));
        assert!(root.path().join("qa/p1/fixed.zip").exists());
        assert_eq!(storage.read(&locator).expect("read"), b"zip-bytes".to_vec());
    }

    #[test]
    fn missing_objects_are_not_found() {
        let root = tempfile::tempdir().expect("root");
        let storage = LocalObjectStorage::new(root.path());
        assert!(matches!(
            storage.read("qa/p1/absent.zip"),
            Err(CourseQaError::NotFound(_))
        ));
    }

    #[test]
    fn escaping_locators_and_names_are_rejected() {
        let root = tempfile::tempdir().expect("root");
        let storage = LocalObjectStorage::new(root.path());
        assert!(matches!(storage.read("../secret"), Err(CourseQaError::Store(_))));
        assert!(matches!(storage.read("/etc/passwd"), Err(CourseQaError::Store(_))));
        assert!(matches!(
            storage.write("qa", "..", "x.zip", b"", "application/zip"),
            Err(CourseQaError::Store(_))
        ));
        assert!(matches!(
            storage.write("qa", "p1", "a/b.zip", b"", "application/zip"),
            Err(CourseQaError::Store(_))
        ));
    }
}
