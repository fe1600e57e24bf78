//! Capability boundary to container implementations.
//!
//! The core never parses container formats. It sequences the lifecycle of
//! an [`Archive`] (open exactly once, close exactly once) and routes
//! query/read calls to it; everything else is the implementation's
//! business. Implementations plug in through [`ArchiveOpener`].

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::identity::{ArchiveKey, EntryPath};

/// MIME type used for directory entries.
pub const MIME_TYPE_DIRECTORY: &str = "inode/directory";

/// Metadata for one entry in a container's document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    /// Path of the entry inside the container.
    pub path: EntryPath,
    /// Name shown to users.
    pub display_name: String,
    /// MIME type of the entry ([`MIME_TYPE_DIRECTORY`] for directories).
    pub mime_type: String,
    /// Uncompressed size in bytes; zero for directories.
    pub size: u64,
}

impl DocumentEntry {
    /// Whether this entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.mime_type == MIME_TYPE_DIRECTORY
    }
}

/// Error opening a container.
///
/// Captured in the handle's FAILED state and surfaced to every query until
/// the handle is evicted. The message is display text, not something to
/// branch on.
#[derive(Debug, Error)]
#[error("failed to open archive: {message}")]
pub struct OpenError {
    message: String,
}

impl OpenError {
    /// Create an open error from display text.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The display text.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for OpenError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// Error closing a container. Logged by the core, never propagated.
#[derive(Debug, Error)]
#[error("failed to close archive: {message}")]
pub struct CloseError {
    message: String,
}

impl CloseError {
    /// Create a close error from display text.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CloseError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// Errors raised by a ready container's query/read operations.
///
/// These pass through the core to callers verbatim.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// No entry exists at the given path.
    #[error("no entry at {0}")]
    EntryNotFound(EntryPath),

    /// A listing was requested on a non-directory entry.
    #[error("{0} is not a directory")]
    NotADirectory(EntryPath),

    /// A read was requested on a directory entry.
    #[error("{0} is a directory")]
    IsADirectory(EntryPath),

    /// The underlying storage failed.
    #[error("archive read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One successfully opened container exposing a document tree.
pub trait Archive: Send + Sync + std::fmt::Debug {
    /// Look up a single entry.
    fn entry(&self, path: &EntryPath) -> Result<DocumentEntry, ArchiveError>;

    /// List the direct children of a directory entry.
    fn children(&self, path: &EntryPath) -> Result<Vec<DocumentEntry>, ArchiveError>;

    /// Read the full contents of a file entry.
    fn read(&self, path: &EntryPath) -> Result<Bytes, ArchiveError>;

    /// Release the underlying file or stream handle.
    ///
    /// Called exactly once, after the last holder of the container has
    /// released it.
    fn close(&self) -> BoxFuture<'_, Result<(), CloseError>>;
}

/// Factory that materializes containers.
pub trait ArchiveOpener: Send + Sync {
    /// Open the container identified by `key`.
    ///
    /// Runs on a background task. The core imposes no timeout and never
    /// cancels an in-flight open; implementations own both concerns.
    fn open(&self, key: ArchiveKey) -> BoxFuture<'_, Result<Arc<dyn Archive>, OpenError>>;
}
