//! Write-once storage of sealed premium content.

use crate::cipher::EncryptedContent;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Longest accepted content id.
pub const MAX_CONTENT_ID_LEN: usize = 128;

/// File extension used by [`FileContentStore`].
const CONTENT_FILE_EXTENSION: &str = "msgpack";

/// Check that a content id is 1-128 characters of `[A-Za-z0-9_-]`.
///
/// Ids become file names, so nothing else is allowed.
///
/// # Errors
///
/// Returns `MalformedInput` otherwise.
pub fn validate_content_id(content_id: &str) -> Result<()> {
    let valid = !content_id.is_empty()
        && content_id.len() <= MAX_CONTENT_ID_LEN
        && content_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(Error::MalformedInput(format!(
            "invalid content id {content_id:?}"
        )))
    }
}

/// What is kept for one published item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContent {
    /// Sealed premium text.
    pub encrypted: EncryptedContent,
    /// Free teaser with payment instructions, rendered at publish time.
    pub preview: String,
}

/// Maps content ids to sealed content. Each id can be written once.
pub trait ContentStore: Send + Sync {
    /// Store `content` under `content_id`.
    ///
    /// # Errors
    ///
    /// Returns `ContentExists` if the id is taken, or a storage error.
    fn put(&self, content_id: &str, content: StoredContent) -> Result<()>;

    /// Fetch the content stored under `content_id`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backing store cannot be read.
    fn get(&self, content_id: &str) -> Result<Option<StoredContent>>;
}

/// In-memory content store.
#[derive(Default)]
pub struct MemoryContentStore {
    items: RwLock<HashMap<String, StoredContent>>,
}

impl MemoryContentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&self, content_id: &str, content: StoredContent) -> Result<()> {
        validate_content_id(content_id)?;
        let mut items = self.items.write();
        if items.contains_key(content_id) {
            return Err(Error::ContentExists(content_id.to_string()));
        }
        items.insert(content_id.to_string(), content);
        Ok(())
    }

    fn get(&self, content_id: &str) -> Result<Option<StoredContent>> {
        Ok(self.items.read().get(content_id).cloned())
    }
}

/// Content store keeping one MessagePack file per item.
///
/// Files are created with `create_new`, so an id can never be overwritten,
/// even by another process sharing the directory.
#[derive(Debug, Clone)]
pub struct FileContentStore {
    root: PathBuf,
}

impl FileContentStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("Content store at {}", root.display());
        Ok(Self { root })
    }

    /// Directory holding the content files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, content_id: &str) -> PathBuf {
        self.root
            .join(format!("{content_id}.{CONTENT_FILE_EXTENSION}"))
    }
}

impl ContentStore for FileContentStore {
    fn put(&self, content_id: &str, content: StoredContent) -> Result<()> {
        validate_content_id(content_id)?;
        let bytes = rmp_serde::to_vec_named(&content)
            .map_err(|e| Error::Serialization(format!("Failed to encode content: {e}")))?;

        let path = self.path_for(content_id);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::ContentExists(content_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&bytes)?;
        file.sync_all()?;

        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn get(&self, content_id: &str) -> Result<Option<StoredContent>> {
        validate_content_id(content_id)?;
        let path = self.path_for(content_id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        rmp_serde::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::Storage(format!("Corrupt content file {}: {e}", path.display())))
    }
}
