//! The keyed, concurrency-safe store of archive handles.
//!
//! The registry maps each [`ArchiveKey`] to at most one live
//! [`ArchiveHandle`]. One mutex guards the map's structural operations
//! (find-or-create, refcount changes, the remove-on-zero decision), so no
//! two callers ever observe inconsistent refcount-vs-presence state.
//! The potentially slow container open and close run as background tasks
//! outside the lock, so unrelated keys never wait on each other.
//!
//! Removal happens in the same critical section that observes the
//! refcount reach zero: a concurrent acquire can never re-attach to a
//! handle already committed to closing; it creates a fresh one instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle as RuntimeHandle;
use tracing::{debug, instrument, warn};

use crate::archive::{Archive, ArchiveError, ArchiveOpener};
use crate::events::{ObserverSet, StatusObserver, SubscriptionId};
use crate::handle::{ArchiveHandle, CloseAction, HandleStatus, NotReady, OpenCompletion};
use crate::identity::{ArchiveIdentity, ArchiveKey, IdentityError};

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The document identifier could not be decoded.
    #[error("malformed document identifier: {0}")]
    MalformedIdentifier(#[from] IdentityError),

    /// A release or lookup arrived without a matching prior acquire.
    #[error("archive not acquired: {key}")]
    NotAcquired {
        /// The key the operation addressed.
        key: ArchiveKey,
    },

    /// A release underflowed the holder count.
    #[error("release without matching acquire: {key}")]
    ImbalancedRelease {
        /// The key the operation addressed.
        key: ArchiveKey,
    },

    /// The container is not ready to serve queries.
    #[error(transparent)]
    NotReady(#[from] NotReady),

    /// An error raised by the ready container, passed through verbatim.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Keyed, reference-counted store of archive handles.
///
/// Callers bracket each logical usage session with
/// [`acquire`](Self::acquire) / [`release`](Self::release); every other
/// operation looks the handle up by identifier and branches on its
/// status. The registry assumes balanced acquire/release pairs.
pub struct ArchiveRegistry {
    handles: Mutex<HashMap<ArchiveKey, Arc<ArchiveHandle>>>,
    opener: Arc<dyn ArchiveOpener>,
    observers: Arc<ObserverSet>,
    /// Runtime the background open/close tasks are spawned on.
    runtime: RuntimeHandle,
}

impl ArchiveRegistry {
    /// Create a registry spawning its background work on the current
    /// tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics outside a runtime context; use
    /// [`with_runtime`](Self::with_runtime) from synchronous setups.
    pub fn new(opener: Arc<dyn ArchiveOpener>) -> Arc<Self> {
        Self::with_runtime(opener, RuntimeHandle::current())
    }

    /// Create a registry spawning its background work on `runtime`.
    pub fn with_runtime(opener: Arc<dyn ArchiveOpener>, runtime: RuntimeHandle) -> Arc<Self> {
        Arc::new(Self {
            handles: Mutex::new(HashMap::new()),
            opener,
            observers: Arc::new(ObserverSet::new()),
            runtime,
        })
    }

    /// Acquire the container behind `document_id`.
    ///
    /// Finds or creates the handle for the decoded key and increments its
    /// holder count; a new handle starts its container open in the
    /// background. Concurrent acquires on an unestablished key join the
    /// single in-flight open. Only identifier decoding can fail.
    #[instrument(level = "debug", skip(self))]
    pub fn acquire(&self, document_id: &str) -> Result<ArchiveKey, RegistryError> {
        let identity = ArchiveIdentity::decode(document_id)?;
        let key = identity.key();
        let created = {
            let mut handles = self.handles.lock();
            match handles.get(&key) {
                Some(handle) => {
                    handle.acquire();
                    None
                }
                None => {
                    let handle = ArchiveHandle::new(key.clone(), Arc::clone(&self.observers));
                    handle.acquire();
                    handles.insert(key.clone(), Arc::clone(&handle));
                    Some(handle)
                }
            }
        };
        if let Some(handle) = created {
            debug!(%key, "opening archive");
            self.observers.emit(&key, HandleStatus::Opening);
            self.spawn_open(handle);
        }
        Ok(key)
    }

    /// Release one acquisition of `document_id`.
    ///
    /// When the holder count reaches zero the handle leaves the registry
    /// in the same critical section, and the container close starts
    /// outside it. A release while the open is still in flight defers the
    /// close until the open completes.
    #[instrument(level = "debug", skip(self))]
    pub fn release(&self, document_id: &str) -> Result<(), RegistryError> {
        let identity = ArchiveIdentity::decode(document_id)?;
        let key = identity.key();
        let evicted = {
            let mut handles = self.handles.lock();
            let handle = handles
                .get(&key)
                .ok_or_else(|| RegistryError::NotAcquired { key: key.clone() })?;
            let remaining = handle
                .release()
                .ok_or_else(|| RegistryError::ImbalancedRelease { key: key.clone() })?;
            if remaining == 0 {
                handles.remove(&key)
            } else {
                None
            }
        };
        if let Some(handle) = evicted {
            debug!(%key, "last holder released, evicting handle");
            match handle.begin_close() {
                CloseAction::CloseNow(archive) => {
                    self.runtime.spawn(close_archive(handle, archive));
                }
                CloseAction::DeferredToOpen => {
                    debug!(%key, "open in flight, close deferred");
                }
                CloseAction::NothingToClose => {}
            }
        }
        Ok(())
    }

    /// Look up the live handle behind `document_id`.
    pub fn lookup(&self, document_id: &str) -> Result<Arc<ArchiveHandle>, RegistryError> {
        let identity = ArchiveIdentity::decode(document_id)?;
        self.lookup_key(&identity.key())
    }

    /// Look up the live handle for a pre-decoded key.
    pub fn lookup_key(&self, key: &ArchiveKey) -> Result<Arc<ArchiveHandle>, RegistryError> {
        self.handles
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::NotAcquired { key: key.clone() })
    }

    /// Status of the handle behind `document_id`.
    pub fn status(&self, document_id: &str) -> Result<HandleStatus, RegistryError> {
        Ok(self.lookup(document_id)?.status())
    }

    /// Run `f` against the ready container behind `document_id`.
    ///
    /// Fails with [`RegistryError::NotReady`] while the container is still
    /// opening or its open failed; the container's own result passes
    /// through verbatim.
    pub fn with_archive<T>(
        &self,
        document_id: &str,
        f: impl FnOnce(&dyn Archive) -> Result<T, ArchiveError>,
    ) -> Result<T, RegistryError> {
        let handle = self.lookup(document_id)?;
        let archive = handle.archive()?;
        Ok(f(archive.as_ref())?)
    }

    /// Register an observer for every handle's status transitions.
    pub fn subscribe(&self, observer: Arc<dyn StatusObserver>) -> SubscriptionId {
        self.observers.insert(None, observer)
    }

    /// Register an observer for a single key's status transitions.
    pub fn subscribe_key(
        &self,
        key: ArchiveKey,
        observer: Arc<dyn StatusObserver>,
    ) -> SubscriptionId {
        self.observers.insert(Some(key), observer)
    }

    /// Remove an observer registration. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.remove(id)
    }

    /// Number of live handles. Diagnostic only.
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// Whether no handles are live.
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    fn spawn_open(&self, handle: Arc<ArchiveHandle>) {
        let opener = Arc::clone(&self.opener);
        self.runtime.spawn(async move {
            let result = opener.open(handle.key().clone()).await;
            match &result {
                Ok(_) => debug!(key = %handle.key(), "archive opened"),
                Err(error) => warn!(key = %handle.key(), %error, "archive open failed"),
            }
            if let OpenCompletion::CloseNow(archive) = handle.complete_open(result) {
                // The last holder left while the open was in flight.
                close_archive(handle, archive).await;
            }
        });
    }
}

impl fmt::Debug for ArchiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveRegistry")
            .field("handles", &self.len())
            .finish_non_exhaustive()
    }
}

async fn close_archive(handle: Arc<ArchiveHandle>, archive: Arc<dyn Archive>) {
    if let Err(error) = archive.close().await {
        // No caller waits on close; log and move on.
        warn!(key = %handle.key(), %error, "archive close failed");
    }
    handle.finish_close();
}
