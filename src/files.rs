//! Attachment storage.
//!
//! [`FileStore`] stands in for the hosted drive: upload bytes, get back a
//! shareable link.

use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("file name '{0}' is empty after sanitizing")]
    BadName(String),

    #[error("could not store {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file store lock poisoned")]
    Poisoned,
}

pub trait FileStore: Send + Sync {
    /// Store `bytes` under `name` and return a link to it
    fn upload(&self, name: &str, content_type: &str, bytes: &[u8]) -> Result<String, FileError>;
}

/// Base name of `name` with everything but letters, digits, `.`, `-` and
/// `_` replaced by `_`.
///
/// ```
/// use gutap::files::sanitize_name;
///
/// assert_eq!(sanitize_name("GU0003_my plan (v2).pdf"), "GU0003_my_plan__v2_.pdf");
/// assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
/// ```
pub fn sanitize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// Files written to a local directory and served under `/files/`
pub struct LocalFileStore {
    dir: PathBuf,
    public_base: String,
}

impl LocalFileStore {
    pub fn new(dir: impl Into<PathBuf>, public_base: &str) -> Result<Self, FileError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| FileError::Io {
            name: dir.display().to_string(),
            source,
        })?;
        Ok(LocalFileStore {
            dir,
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }
}

impl FileStore for LocalFileStore {
    fn upload(&self, name: &str, content_type: &str, bytes: &[u8]) -> Result<String, FileError> {
        let safe = sanitize_name(name);
        if safe.is_empty() {
            return Err(FileError::BadName(name.to_string()));
        }
        fs::write(self.dir.join(&safe), bytes).map_err(|source| FileError::Io {
            name: safe.clone(),
            source,
        })?;
        info!("stored {} ({}, {} bytes)", safe, content_type, bytes.len());
        Ok(format!("{}/files/{}", self.public_base, safe))
    }
}

/// Uploads kept in memory, for tests and the demo store
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type and bytes of a stored file
    pub fn get(&self, name: &str) -> Option<(String, Vec<u8>)> {
        self.files.lock().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl FileStore for MemoryFileStore {
    fn upload(&self, name: &str, content_type: &str, bytes: &[u8]) -> Result<String, FileError> {
        let safe = sanitize_name(name);
        if safe.is_empty() {
            return Err(FileError::BadName(name.to_string()));
        }
        let mut files = self.files.lock().map_err(|_| FileError::Poisoned)?;
        files.insert(safe.clone(), (content_type.to_string(), bytes.to_vec()));
        Ok(format!("memory://{}", safe))
    }
}
