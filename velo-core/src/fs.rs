//! File system access used by the content pipeline.
//!
//! Everything that touches disk goes through [`FileStore`], so missing files
//! can be told apart from real I/O failures (permissions, full disks).

use chrono::{DateTime, Local, NaiveDateTime};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum FileStoreError {
    #[error("Not found: {0:?}")]
    NotFound(PathBuf),

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileStoreError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            FileStoreError::NotFound(path.to_path_buf())
        } else {
            FileStoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FileStoreError::NotFound(_))
    }
}

pub type FileResult<T> = Result<T, FileStoreError>;

/// Outcome of [`FileStore::clear_directory`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub removed: usize,
    pub failed: Vec<PathBuf>,
}

/// Storage operations needed to read content and write the site
pub trait FileStore: Send + Sync {
    fn read_text(&self, path: &Path) -> FileResult<String>;

    /// Write `content`, creating parent directories as needed.
    fn write_text(&self, path: &Path, content: &str) -> FileResult<()>;

    /// Copy `src` to `dst`. Returns `false` when `dst` exists and
    /// `overwrite` is off.
    fn copy_file(&self, src: &Path, dst: &Path, overwrite: bool) -> FileResult<bool>;

    fn ensure_directory_exists(&self, path: &Path) -> FileResult<()>;

    /// Files under `dir` whose extension matches `extension`
    /// (case-insensitive), sorted by path.
    fn list_files(&self, dir: &Path, extension: &str, recursive: bool) -> FileResult<Vec<PathBuf>>;

    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` exists and is a regular file
    fn is_file(&self, path: &Path) -> bool;

    fn last_modified(&self, path: &Path) -> FileResult<NaiveDateTime>;

    /// Delete everything inside `path`, carrying on past entries that
    /// cannot be removed.
    fn clear_directory(&self, path: &Path) -> FileResult<ClearReport>;
}

/// [`FileStore`] backed by the local file system
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }
}

impl FileStore for LocalFileStore {
    fn read_text(&self, path: &Path) -> FileResult<String> {
        fs::read_to_string(path).map_err(|e| FileStoreError::from_io(path, e))
    }

    fn write_text(&self, path: &Path, content: &str) -> FileResult<()> {
        if let Some(parent) = path.parent() {
            self.ensure_directory_exists(parent)?;
        }
        fs::write(path, content).map_err(|e| FileStoreError::from_io(path, e))
    }

    fn copy_file(&self, src: &Path, dst: &Path, overwrite: bool) -> FileResult<bool> {
        if !src.is_file() {
            return Err(FileStoreError::NotFound(src.to_path_buf()));
        }
        if !overwrite && dst.exists() {
            return Ok(false);
        }
        if let Some(parent) = dst.parent() {
            self.ensure_directory_exists(parent)?;
        }
        fs::copy(src, dst).map_err(|e| FileStoreError::from_io(src, e))?;
        tracing::debug!("Copied {:?} -> {:?}", src, dst);
        Ok(true)
    }

    fn ensure_directory_exists(&self, path: &Path) -> FileResult<()> {
        if path.as_os_str().is_empty() || path.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(path).map_err(|e| FileStoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn list_files(&self, dir: &Path, extension: &str, recursive: bool) -> FileResult<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(FileStoreError::NotFound(dir.to_path_buf()));
        }

        let walker = WalkDir::new(dir).max_depth(if recursive { usize::MAX } else { 1 });
        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("Skipping unreadable entry under {:?}: {}", dir, err);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(extension))
                .unwrap_or(false);
            if matches {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn last_modified(&self, path: &Path) -> FileResult<NaiveDateTime> {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| FileStoreError::from_io(path, e))?;
        Ok(DateTime::<Local>::from(modified).naive_local())
    }

    fn clear_directory(&self, path: &Path) -> FileResult<ClearReport> {
        let entries = fs::read_dir(path).map_err(|e| FileStoreError::from_io(path, e))?;
        let mut report = ClearReport::default();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("Cannot read entry in {:?}: {}", path, err);
                    continue;
                }
            };
            let entry_path = entry.path();
            let result = match entry.file_type() {
                Ok(t) if t.is_dir() => fs::remove_dir_all(&entry_path),
                _ => fs::remove_file(&entry_path),
            };
            match result {
                Ok(()) => {
                    tracing::debug!("Removed {:?}", entry_path);
                    report.removed += 1;
                }
                Err(err) => {
                    tracing::warn!("Cannot remove {:?}: {}", entry_path, err);
                    report.failed.push(entry_path);
                }
            }
        }

        Ok(report)
    }
}
