//! The document-provider facade over the archive registry.
//!
//! Translates handle status into host-visible signals: a still-opening
//! container comes back as a loading listing, a failed open as an error
//! listing, and a ready container's query results pass through verbatim.
//! Hosts bracket each logical usage session with
//! [`acquire_archive`](ArchivesProvider::acquire_archive) /
//! [`release_archive`](ArchivesProvider::release_archive).

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use oxarc_core::{
    AccessMode, ArchiveIdentity, ArchiveKey, ArchiveRegistry, EntryPath, HandleStatus,
    IdentityError, MIME_TYPE_DIRECTORY, RegistryError, StatusObserver, SubscriptionId,
};

use crate::item::{ChildDocuments, DocumentRow};

/// Container MIME types this provider mounts.
pub const SUPPORTED_ARCHIVE_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/java-archive",
    "application/epub+zip",
];

/// Display text for listings whose container failed to open and carried no
/// detail.
const GENERIC_LOAD_FAILURE: &str = "archive loading failed";

/// Errors surfaced by provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The document identifier could not be decoded.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The registry rejected the operation.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Host-side sink for change notifications.
pub trait ChangeNotifier: Send + Sync {
    /// The listing under `document_id` may have changed and should be
    /// re-queried.
    fn notify_change(&self, document_id: &str);
}

/// Document-provider facade backed by an [`ArchiveRegistry`].
pub struct ArchivesProvider {
    registry: Arc<ArchiveRegistry>,
}

impl ArchivesProvider {
    /// Create a facade over `registry`.
    pub fn new(registry: Arc<ArchiveRegistry>) -> Self {
        Self { registry }
    }

    /// The backing registry.
    pub fn registry(&self) -> &Arc<ArchiveRegistry> {
        &self.registry
    }

    /// Whether `mime_type` is a container format this provider mounts.
    pub fn is_supported_archive_type(mime_type: &str) -> bool {
        SUPPORTED_ARCHIVE_TYPES.contains(&mime_type)
    }

    /// Canonical root document id for the container at `source`.
    pub fn root_document_id(source: &Url, mode: AccessMode) -> String {
        ArchiveIdentity::new(source.clone(), mode, EntryPath::root()).encode()
    }

    /// Acquire a usage session on the archive behind `document_id`.
    ///
    /// The archive stays open until the matching
    /// [`release_archive`](Self::release_archive).
    #[instrument(level = "debug", skip(self))]
    pub fn acquire_archive(&self, document_id: &str) -> Result<(), ProviderError> {
        self.registry.acquire(document_id)?;
        Ok(())
    }

    /// Release a usage session on the archive behind `document_id`.
    #[instrument(level = "debug", skip(self))]
    pub fn release_archive(&self, document_id: &str) -> Result<(), ProviderError> {
        self.registry.release(document_id)?;
        Ok(())
    }

    /// Lifecycle status of the archive behind `document_id`.
    pub fn archive_status(&self, document_id: &str) -> Result<HandleStatus, ProviderError> {
        Ok(self.registry.status(document_id)?)
    }

    /// List the children of a directory document.
    ///
    /// Never fails on a still-opening or failed container: those states
    /// come back as an empty listing with `loading` set or the failure
    /// text attached, so hosts render a spinner or an error banner and
    /// re-query on notification.
    pub fn query_children(&self, document_id: &str) -> Result<ChildDocuments, ProviderError> {
        let identity = ArchiveIdentity::decode(document_id)?;
        let notification_id = Self::root_document_id(identity.source(), identity.mode());
        let listed = self
            .registry
            .with_archive(document_id, |archive| archive.children(identity.path()));
        match listed {
            Ok(entries) => Ok(ChildDocuments {
                documents: entries
                    .into_iter()
                    .map(|entry| DocumentRow::from_entry(&identity, entry))
                    .collect(),
                loading: false,
                error: None,
                notification_id,
            }),
            Err(RegistryError::NotReady(not_ready)) => {
                if not_ready.status == HandleStatus::Failed {
                    let error = not_ready
                        .failure
                        .map_or_else(|| GENERIC_LOAD_FAILURE.to_owned(), |f| f.to_string());
                    Ok(ChildDocuments {
                        documents: Vec::new(),
                        loading: false,
                        error: Some(error),
                        notification_id,
                    })
                } else {
                    Ok(ChildDocuments {
                        documents: Vec::new(),
                        loading: true,
                        error: None,
                        notification_id,
                    })
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Metadata row for a single document.
    ///
    /// The container root is synthesized from the source URL, so it can be
    /// rendered before the open completes, without any acquire at all.
    pub fn query_document(&self, document_id: &str) -> Result<DocumentRow, ProviderError> {
        let identity = ArchiveIdentity::decode(document_id)?;
        if identity.path().is_root() {
            return Ok(DocumentRow {
                document_id: identity.encode(),
                display_name: identity.key().display_name(),
                mime_type: MIME_TYPE_DIRECTORY.to_owned(),
                size: 0,
            });
        }
        let entry = self
            .registry
            .with_archive(document_id, |archive| archive.entry(identity.path()))?;
        Ok(DocumentRow::from_entry(&identity, entry))
    }

    /// MIME type of a document. Directory for the container root, without
    /// consulting the handle.
    pub fn document_type(&self, document_id: &str) -> Result<String, ProviderError> {
        let identity = ArchiveIdentity::decode(document_id)?;
        if identity.path().is_root() {
            return Ok(MIME_TYPE_DIRECTORY.to_owned());
        }
        let entry = self
            .registry
            .with_archive(document_id, |archive| archive.entry(identity.path()))?;
        Ok(entry.mime_type)
    }

    /// Full contents of a file document.
    pub fn read_document(&self, document_id: &str) -> Result<Bytes, ProviderError> {
        let identity = ArchiveIdentity::decode(document_id)?;
        Ok(self
            .registry
            .with_archive(document_id, |archive| archive.read(identity.path()))?)
    }

    /// Whether `document_id` sits at or below `parent_document_id` in the
    /// same container.
    pub fn is_child_document(
        &self,
        parent_document_id: &str,
        document_id: &str,
    ) -> Result<bool, ProviderError> {
        let parent = ArchiveIdentity::decode(parent_document_id)?;
        let child = ArchiveIdentity::decode(document_id)?;
        Ok(parent.key() == child.key() && parent.path().contains(child.path()))
    }

    /// Bridge status transitions to the host's change-notification
    /// channel.
    ///
    /// Every transition of any handle produces one notification keyed by
    /// the archive's root document id.
    pub fn subscribe_notifications(&self, notifier: Arc<dyn ChangeNotifier>) -> SubscriptionId {
        self.registry.subscribe(Arc::new(NotificationBridge { notifier }))
    }

    /// Remove a notification registration. Returns whether it existed.
    pub fn unsubscribe_notifications(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }
}

struct NotificationBridge {
    notifier: Arc<dyn ChangeNotifier>,
}

impl StatusObserver for NotificationBridge {
    fn status_changed(&self, key: &ArchiveKey, _status: HandleStatus) {
        let document_id = ArchivesProvider::root_document_id(&key.source, key.mode);
        self.notifier.notify_change(&document_id);
    }
}
