//! In-memory archive fixture.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::archive::{
    Archive, ArchiveError, CloseError, DocumentEntry, MIME_TYPE_DIRECTORY,
};
use crate::identity::EntryPath;

/// Default MIME type for files added without an explicit one.
const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

#[derive(Debug)]
struct Node {
    entry: DocumentEntry,
    /// `None` for directories.
    content: Option<Bytes>,
}

/// An in-memory document tree implementing [`Archive`].
///
/// Tracks whether and how often it has been closed, so lifecycle tests can
/// assert the close-exactly-once contract.
#[derive(Debug)]
pub struct MemoryArchive {
    nodes: BTreeMap<String, Node>,
    fail_close: Option<String>,
    closed: AtomicBool,
    close_count: AtomicUsize,
}

impl MemoryArchive {
    /// Start building an archive.
    pub fn builder() -> MemoryArchiveBuilder {
        MemoryArchiveBuilder {
            nodes: BTreeMap::new(),
            fail_close: None,
        }
    }

    /// Whether [`Archive::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// How many times [`Archive::close`] has run.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::Acquire)
    }

    fn node(&self, path: &EntryPath) -> Result<&Node, ArchiveError> {
        self.nodes
            .get(path.as_str())
            .ok_or_else(|| ArchiveError::EntryNotFound(path.clone()))
    }
}

impl Archive for MemoryArchive {
    fn entry(&self, path: &EntryPath) -> Result<DocumentEntry, ArchiveError> {
        if path.is_root() {
            return Ok(root_entry());
        }
        Ok(self.node(path)?.entry.clone())
    }

    fn children(&self, path: &EntryPath) -> Result<Vec<DocumentEntry>, ArchiveError> {
        let parent = if path.is_root() {
            ""
        } else {
            let node = self.node(path)?;
            if node.content.is_some() {
                return Err(ArchiveError::NotADirectory(path.clone()));
            }
            path.as_str()
        };
        Ok(self
            .nodes
            .values()
            .filter(|node| parent_of(node.entry.path.as_str()) == parent)
            .map(|node| node.entry.clone())
            .collect())
    }

    fn read(&self, path: &EntryPath) -> Result<Bytes, ArchiveError> {
        if path.is_root() {
            return Err(ArchiveError::IsADirectory(path.clone()));
        }
        match &self.node(path)?.content {
            Some(content) => Ok(content.clone()),
            None => Err(ArchiveError::IsADirectory(path.clone())),
        }
    }

    fn close(&self) -> BoxFuture<'_, Result<(), CloseError>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            self.close_count.fetch_add(1, Ordering::AcqRel);
            match &self.fail_close {
                Some(message) => Err(CloseError::new(message.clone())),
                None => Ok(()),
            }
        })
    }
}

/// Builder for [`MemoryArchive`]. Parent directories are created
/// implicitly.
pub struct MemoryArchiveBuilder {
    nodes: BTreeMap<String, Node>,
    fail_close: Option<String>,
}

impl MemoryArchiveBuilder {
    /// Add a file with the default MIME type.
    pub fn file(self, path: &str, content: &[u8]) -> Self {
        self.file_with_type(path, content, DEFAULT_FILE_TYPE)
    }

    /// Add a file with an explicit MIME type.
    pub fn file_with_type(mut self, path: &str, content: &[u8], mime_type: &str) -> Self {
        let path = normalize(path);
        self.ensure_parents(&path);
        let entry = make_entry(&path, mime_type, content.len() as u64);
        self.nodes.insert(
            path,
            Node {
                entry,
                content: Some(Bytes::copy_from_slice(content)),
            },
        );
        self
    }

    /// Add an (empty) directory.
    pub fn dir(mut self, path: &str) -> Self {
        let path = normalize(path);
        self.ensure_parents(&path);
        self.insert_dir(&path);
        self
    }

    /// Make [`Archive::close`] fail with `message`.
    pub fn fail_close(mut self, message: &str) -> Self {
        self.fail_close = Some(message.to_owned());
        self
    }

    /// Finish building.
    pub fn build(self) -> Arc<MemoryArchive> {
        Arc::new(MemoryArchive {
            nodes: self.nodes,
            fail_close: self.fail_close,
            closed: AtomicBool::new(false),
            close_count: AtomicUsize::new(0),
        })
    }

    fn ensure_parents(&mut self, path: &str) {
        let mut parent = parent_of(path).to_owned();
        while !parent.is_empty() {
            self.insert_dir(&parent);
            parent = parent_of(&parent).to_owned();
        }
    }

    fn insert_dir(&mut self, path: &str) {
        // A file at this path wins; directories never overwrite it.
        if self.nodes.contains_key(path) {
            return;
        }
        let entry = make_entry(path, MIME_TYPE_DIRECTORY, 0);
        self.nodes.insert(
            path.to_owned(),
            Node {
                entry,
                content: None,
            },
        );
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

/// Parent path with no trailing slash; `""` for direct children of the
/// root.
fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "",
        Some(index) => &path[..index],
    }
}

fn make_entry(path: &str, mime_type: &str, size: u64) -> DocumentEntry {
    let display_name = path.rsplit('/').next().unwrap_or(path).to_owned();
    DocumentEntry {
        path: EntryPath::new(path),
        display_name,
        mime_type: mime_type.to_owned(),
        size,
    }
}

fn root_entry() -> DocumentEntry {
    DocumentEntry {
        path: EntryPath::root(),
        display_name: "/".to_owned(),
        mime_type: MIME_TYPE_DIRECTORY.to_owned(),
        size: 0,
    }
}
