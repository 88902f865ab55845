//! Per-job sandboxed storage.
//!
//! Every byte the crawler materialises lands under one job-owned root
//! directory. Writes are checked twice: the joined path must stay inside
//! the sandbox (a traversal attempt means a bug upstream and is fatal), and
//! the running total must stay under the configured aggregate ceiling.
//! Overwrites subtract the previous length first, so the total tracks real
//! disk usage rather than cumulative write volume.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

/// Storage failure; both variants besides `Io` indicate conditions the
/// engine treats as fatal.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("path '{0}' escapes the storage sandbox")]
    Traversal(String),
    #[error(
        "writing {attempted} bytes would exceed the size ceiling ({current}/{ceiling} bytes used)"
    )]
    SizeCeiling {
        attempted: u64,
        current: u64,
        ceiling: u64,
    },
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read-only snapshot of what storage holds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub files_written: usize,
    pub total_bytes: u64,
    pub directories: usize,
}

/// Sandboxed byte store rooted at a per-job directory.
pub struct Storage {
    root: PathBuf,
    max_total_size: u64,
    /// Relative path -> byte length of the last write.
    files: Mutex<BTreeMap<String, u64>>,
}

impl Storage {
    /// Create the sandbox directory and an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn init(root: PathBuf, max_total_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            max_total_size,
            files: Mutex::new(BTreeMap::new()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write bytes under a sandbox-relative path, creating parents.
    ///
    /// Last writer wins when the same path is written twice; the registry
    /// guarantees one path per canonical URL so this only happens during
    /// the rewrite pass, which intentionally replaces crawl-time bytes.
    ///
    /// # Errors
    ///
    /// [`StorageError::Traversal`] if the path escapes the sandbox,
    /// [`StorageError::SizeCeiling`] if the aggregate ceiling would be
    /// exceeded, or an I/O error.
    pub async fn write(&self, rel: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let abs = self.resolve(rel)?;

        {
            let files = self.files.lock();
            let existing = files.get(rel).copied().unwrap_or(0);
            let current: u64 = files.values().sum();
            let projected = current - existing + bytes.len() as u64;
            if projected > self.max_total_size {
                return Err(StorageError::SizeCeiling {
                    attempted: bytes.len() as u64,
                    current,
                    ceiling: self.max_total_size,
                });
            }
        }

        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&abs, bytes).await?;

        self.files.lock().insert(rel.to_string(), bytes.len() as u64);
        log::debug!("stored {} bytes at {rel}", bytes.len());
        Ok(())
    }

    /// Read a file back from the sandbox.
    ///
    /// # Errors
    ///
    /// Traversal or I/O errors.
    pub async fn read(&self, rel: &str) -> Result<Vec<u8>, StorageError> {
        let abs = self.resolve(rel)?;
        Ok(fs::read(&abs).await?)
    }

    /// Recursively list every file under the sandbox, as sorted
    /// forward-slash relative paths.
    ///
    /// # Errors
    ///
    /// I/O errors during the walk.
    pub async fn list_files(&self) -> Result<Vec<String>, StorageError> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let kind = entry.file_type().await?;
                if kind.is_dir() {
                    stack.push(path);
                } else if kind.is_file()
                    && let Ok(rel) = path.strip_prefix(&self.root)
                {
                    out.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        out.sort();
        Ok(out)
    }

    /// Current snapshot: file count, byte total, and distinct directories.
    #[must_use]
    pub fn stats(&self) -> StorageStats {
        let files = self.files.lock();
        let directories: std::collections::HashSet<&str> = files
            .keys()
            .filter_map(|rel| rel.rsplit_once('/').map(|(dir, _)| dir))
            .collect();
        StorageStats {
            files_written: files.len(),
            total_bytes: files.values().sum(),
            directories: directories.len(),
        }
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.files.lock().values().sum()
    }

    /// Remove the entire sandbox.
    ///
    /// # Errors
    ///
    /// I/O errors from the removal.
    pub async fn cleanup(&self) -> Result<(), StorageError> {
        fs::remove_dir_all(&self.root).await?;
        self.files.lock().clear();
        Ok(())
    }

    /// Join a relative path onto the root, refusing anything that would
    /// step outside it. A failure here is a bug in path derivation, not a
    /// recoverable condition.
    fn resolve(&self, rel: &str) -> Result<PathBuf, StorageError> {
        let rel_path = Path::new(rel);
        if rel_path.is_absolute() {
            return Err(StorageError::Traversal(rel.to_string()));
        }

        let mut joined = self.root.clone();
        for component in rel_path.components() {
            match component {
                Component::Normal(segment) => joined.push(segment),
                Component::CurDir => {}
                _ => return Err(StorageError::Traversal(rel.to_string())),
            }
        }

        // String-prefix check after normalisation, belt to the braces above.
        if !joined.starts_with(&self.root) {
            return Err(StorageError::Traversal(rel.to_string()));
        }
        Ok(joined)
    }
}
