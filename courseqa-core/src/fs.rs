//! Filesystem abstractions used by the scanners and the auto-fixer.

use std::path::Path;

use crate::error::Result;

/// Abstraction over filesystem access for testability.
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem {
    /// Read a file as text, replacing invalid UTF-8 sequences.
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Replace the contents of a file.
    fn write(&self, path: &Path, contents: &str) -> Result<()>;
}

/// Default filesystem implementation backed by `std::fs`.
#[derive(Debug, Default, Clone)]
pub struct StdFileSystem;

impl StdFileSystem {
    /// Create a new standard filesystem adapter.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for StdFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        Ok(std::fs::write(path, contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::StdFileSystem;
    use crate::fs::FileSystem;

    #[test]
    fn std_filesystem_reads_and_writes_files() {
        let root = tempfile::tempdir().expect("create temp dir");
        let lesson = root.path().join("one.html");
        std::fs::write(&lesson, "<h2>Lesson</h2>").expect("write lesson");

        let fs = StdFileSystem::new();
        assert_eq!(fs.read_to_string(&lesson).expect("read file"), "<h2>Lesson</h2>");

        fs.write(&lesson, "<h2>Updated</h2>").expect("write file");
        let contents = fs.read_to_string(&lesson).expect("read file");
        assert_eq!(contents, "<h2>Updated</h2>");
    }

    #[test]
    fn read_to_string_tolerates_invalid_utf8() {
        let root = tempfile::tempdir().expect("create temp dir");
        let path = root.path().join("latin1.html");
        std::fs::write(&path, [b'<', b'p', b'>', 0xE9, b'<']).expect("write bytes");

        let contents = StdFileSystem::new().read_to_string(&path).expect("read");
        assert!(contents.starts_with("<p>"));
        assert!(contents.contains('\u{FFFD}'));
    }
}
