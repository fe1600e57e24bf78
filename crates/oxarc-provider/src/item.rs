//! Row and listing types returned by the provider surface.

use oxarc_core::{ArchiveIdentity, DocumentEntry};

/// One document, as surfaced to the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    /// Opaque identifier of the document.
    pub document_id: String,
    /// Name shown to users.
    pub display_name: String,
    /// MIME type (`inode/directory` for directories).
    pub mime_type: String,
    /// Size in bytes; zero for directories.
    pub size: u64,
}

impl DocumentRow {
    /// Build a row for `entry`, addressed under the same container as
    /// `identity`.
    pub(crate) fn from_entry(identity: &ArchiveIdentity, entry: DocumentEntry) -> Self {
        let document_id =
            ArchiveIdentity::new(identity.source().clone(), identity.mode(), entry.path).encode();
        Self {
            document_id,
            display_name: entry.display_name,
            mime_type: entry.mime_type,
            size: entry.size,
        }
    }
}

/// Result of a child-listing query.
///
/// While the backing container is still opening, `documents` is empty and
/// `loading` is set: the host shows its progress indicator and re-issues
/// the query once a change notification arrives for `notification_id`.
/// When the open failed, `error` carries display text instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDocuments {
    /// The listed documents; empty while loading or failed.
    pub documents: Vec<DocumentRow>,
    /// The container is still opening.
    pub loading: bool,
    /// Display text for a failed open.
    pub error: Option<String>,
    /// Root document id of the archive; change notifications for this
    /// listing are keyed by it.
    pub notification_id: String,
}
