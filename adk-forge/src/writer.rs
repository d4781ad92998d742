//! Writes generated files under the project root.
//!
//! Paths are relative and may not leave the root, lexically or through a
//! symlinked directory. With `overwrite` off an existing file is left alone and
//! reported as [`WriteStatus::Skipped`], which is not an error.

use crate::error::FileWriteError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Characters rejected in generated paths so output stays portable.
const INVALID_PATH_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStatus {
    Created,
    Overwritten,
    /// The file existed and overwrite was off
    Skipped,
}

/// Outcome of a successful write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// Path relative to the project root, `/`-separated
    pub path: String,
    pub absolute: PathBuf,
    pub status: WriteStatus,
    /// Bytes written; zero when skipped
    pub bytes: usize,
}

impl WrittenFile {
    pub fn is_skipped(&self) -> bool {
        self.status == WriteStatus::Skipped
    }
}

/// Writer bound to one project root.
#[derive(Clone)]
pub struct FileWriter {
    root: PathBuf,
    overwrite: bool,
}

impl std::fmt::Debug for FileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWriter")
            .field("root", &self.root)
            .field("overwrite", &self.overwrite)
            .finish()
    }
}

impl FileWriter {
    pub fn new(root: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            root: root.into(),
            overwrite,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Create the project root if it does not exist.
    pub fn ensure_root(&self) -> Result<(), FileWriteError> {
        fs::create_dir_all(&self.root)
            .map_err(|e| FileWriteError::io(self.root.display().to_string(), e))
    }

    /// Write `content` to `path` under the root, creating parent directories.
    pub fn write(&self, path: &str, content: &str) -> Result<WrittenFile, FileWriteError> {
        let relative = validate_relative(path)?;
        let target = self.root.join(&relative);

        self.ensure_root()?;
        self.check_contained(path, &target)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| FileWriteError::io(path, e))?;
        }

        let status = match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_dir() => {
                return Err(FileWriteError::InvalidPath {
                    path: path.to_string(),
                    reason: "a directory already exists at this path".to_string(),
                });
            }
            Ok(_) if !self.overwrite => {
                debug!(path = %path, "File exists; skipping");
                return Ok(WrittenFile {
                    path: path.to_string(),
                    absolute: target,
                    status: WriteStatus::Skipped,
                    bytes: 0,
                });
            }
            Ok(_) => WriteStatus::Overwritten,
            Err(_) => WriteStatus::Created,
        };

        fs::write(&target, content).map_err(|e| FileWriteError::io(path, e))?;
        debug!(path = %path, bytes = content.len(), status = ?status, "Wrote file");

        Ok(WrittenFile {
            path: path.to_string(),
            absolute: target,
            status,
            bytes: content.len(),
        })
    }

    /// Read a file under the root, if it exists and is text.
    pub fn read(&self, path: &str) -> Option<String> {
        let relative = validate_relative(path).ok()?;
        let target = self.root.join(relative);
        self.check_contained(path, &target).ok()?;
        fs::read_to_string(target).ok()
    }

    /// The nearest existing ancestor must canonicalize inside the root.
    fn check_contained(&self, path: &str, target: &Path) -> Result<(), FileWriteError> {
        let root = self
            .root
            .canonicalize()
            .map_err(|e| FileWriteError::io(self.root.display().to_string(), e))?;
        if let Some(ancestor) = target.ancestors().skip(1).find(|p| p.exists()) {
            let resolved = ancestor
                .canonicalize()
                .map_err(|e| FileWriteError::io(path, e))?;
            if !resolved.starts_with(&root) {
                return Err(FileWriteError::OutsideRoot {
                    path: path.to_string(),
                });
            }
        }
        // A symlinked file could still point elsewhere.
        if let Ok(meta) = fs::symlink_metadata(target) {
            if meta.file_type().is_symlink() {
                let resolved = target.canonicalize().map_err(|e| FileWriteError::io(path, e))?;
                if !resolved.starts_with(&root) {
                    return Err(FileWriteError::OutsideRoot {
                        path: path.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Write one file with a throwaway writer.
pub fn write_file(
    root: impl AsRef<Path>,
    path: &str,
    content: &str,
    overwrite: bool,
) -> Result<WrittenFile, FileWriteError> {
    FileWriter::new(root.as_ref(), overwrite).write(path, content)
}

/// Check a relative path lexically.
fn validate_relative(path: &str) -> Result<PathBuf, FileWriteError> {
    let invalid = |reason: &str| FileWriteError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.chars().any(|c| c.is_control()) {
        return Err(invalid("path contains control characters"));
    }
    if path.contains(INVALID_PATH_CHARS) {
        return Err(invalid("path contains one of < > : \" | ? *"));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(FileWriteError::OutsideRoot {
            path: path.to_string(),
        });
    }

    let mut normal = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FileWriteError::OutsideRoot {
                    path: path.to_string(),
                });
            }
        }
    }
    if path.split(['/', '\\']).any(|part| part == "..") {
        return Err(FileWriteError::OutsideRoot {
            path: path.to_string(),
        });
    }
    if normal == 0 {
        return Err(invalid("path has no file name"));
    }

    Ok(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let writer = FileWriter::new(dir.path(), false);
        let written = writer.write("assets/css/site.css", "body{}").unwrap();

        assert_eq!(written.status, WriteStatus::Created);
        assert_eq!(written.bytes, 6);
        assert_eq!(
            fs::read_to_string(dir.path().join("assets/css/site.css")).unwrap(),
            "body{}"
        );
    }

    #[test]
    fn test_skip_then_overwrite() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.txt", "one", false).unwrap();

        let skipped = write_file(dir.path(), "a.txt", "two", false).unwrap();
        assert!(skipped.is_skipped());
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one");

        let replaced = write_file(dir.path(), "a.txt", "three", true).unwrap();
        assert_eq!(replaced.status, WriteStatus::Overwritten);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "three");
    }

    #[test]
    fn test_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project-code");
        write_file(&root, "index.html", "<p/>", false).unwrap();
        assert!(root.join("index.html").is_file());
    }

    #[test]
    fn test_rejects_traversal_and_absolute() {
        let dir = TempDir::new().unwrap();
        for path in ["../escape.txt", "a/../../b.txt", "/etc/passwd", "\\win.txt"] {
            let err = write_file(dir.path(), path, "x", true).unwrap_err();
            assert!(
                matches!(err, FileWriteError::OutsideRoot { .. }),
                "{path} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_rejects_invalid_paths() {
        let dir = TempDir::new().unwrap();
        for path in ["", "  ", "a?b.txt", "bad\nname", ".", "./"] {
            let err = write_file(dir.path(), path, "x", true).unwrap_err();
            assert!(matches!(err, FileWriteError::InvalidPath { .. }), "{path:?}: {err:?}");
        }
    }

    #[test]
    fn test_directory_target_is_error() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("css")).unwrap();
        let err = write_file(dir.path(), "css", "x", true).unwrap_err();
        assert!(matches!(err, FileWriteError::InvalidPath { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlinked_directory_escape() {
        let outside = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = write_file(dir.path(), "link/x.txt", "x", true).unwrap_err();
        assert!(matches!(err, FileWriteError::OutsideRoot { .. }));
        assert!(!outside.path().join("x.txt").exists());
    }

    #[test]
    fn test_read() {
        let dir = TempDir::new().unwrap();
        let writer = FileWriter::new(dir.path(), false);
        assert_eq!(writer.read("index.html"), None);
        writer.write("index.html", "<p/>").unwrap();
        assert_eq!(writer.read("index.html").as_deref(), Some("<p/>"));
        assert_eq!(writer.read("../index.html"), None);
    }
}
