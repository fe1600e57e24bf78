//! The per-container handle: one asynchronously-opened archive plus the
//! reference count that decides its lifetime.
//!
//! A handle moves through five states:
//!
//! ```text
//! OPENING ──ok──▶ OPENED ──refs=0──▶ CLOSING ──▶ CLOSED
//!    │
//!    └──err──▶ FAILED ──refs=0──▶ CLOSING ──▶ CLOSED
//! ```
//!
//! The one subtle interleaving lives here: when the last holder releases
//! while the open is still in flight, teardown is deferred. The open runs
//! to completion, the handle passes through OPENED (or FAILED) without
//! ever serving a query, and only then is the container closed.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;

use crate::archive::{Archive, OpenError};
use crate::events::ObserverSet;
use crate::identity::ArchiveKey;

/// Externally visible lifecycle status of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    /// The container open is in progress.
    Opening,
    /// The container is ready; queries delegate to it.
    Opened,
    /// The open failed; queries surface the captured failure.
    Failed,
    /// The container close is in progress.
    Closing,
    /// Terminal. The handle has left the registry.
    Closed,
}

impl HandleStatus {
    /// Lowercase name for logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleStatus::Opening => "opening",
            HandleStatus::Opened => "opened",
            HandleStatus::Failed => "failed",
            HandleStatus::Closing => "closing",
            HandleStatus::Closed => "closed",
        }
    }

    /// Whether this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandleStatus::Closed)
    }
}

impl fmt::Display for HandleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query reached a handle whose container is not ready.
#[derive(Debug, Clone, Error)]
#[error("archive is not ready (status: {status})")]
pub struct NotReady {
    /// Status observed at query time.
    pub status: HandleStatus,
    /// Captured open failure when `status` is [`HandleStatus::Failed`].
    pub failure: Option<Arc<OpenError>>,
}

/// Internal state, carrying the data attached to each status.
enum HandleState {
    Opening {
        /// Set when the last holder released while the open was still in
        /// flight; the open task performs the close on completion.
        close_requested: bool,
    },
    Opened {
        archive: Arc<dyn Archive>,
    },
    Failed {
        error: Arc<OpenError>,
    },
    Closing,
    Closed,
}

impl HandleState {
    fn status(&self) -> HandleStatus {
        match self {
            HandleState::Opening { .. } => HandleStatus::Opening,
            HandleState::Opened { .. } => HandleStatus::Opened,
            HandleState::Failed { .. } => HandleStatus::Failed,
            HandleState::Closing => HandleStatus::Closing,
            HandleState::Closed => HandleStatus::Closed,
        }
    }
}

/// Follow-up work owed by the open task after recording its result.
pub(crate) enum OpenCompletion {
    /// The handle keeps serving; nothing further to do.
    Settled,
    /// The last holder left mid-open; close the container now.
    CloseNow(Arc<dyn Archive>),
}

/// Follow-up work owed by the registry after evicting a zero-ref handle.
pub(crate) enum CloseAction {
    /// The open is still in flight; it performs the close on completion.
    DeferredToOpen,
    /// Close the container now.
    CloseNow(Arc<dyn Archive>),
    /// No container was materialized; teardown already completed.
    NothingToClose,
}

/// State machine wrapping one container's asynchronous lifecycle plus its
/// reference count.
///
/// Handles are created and evicted by the registry; external code observes
/// them through [`status`](Self::status), [`subscribe`](Self::subscribe)
/// and [`archive`](Self::archive). The reference count is mutated only
/// inside the registry's critical section.
pub struct ArchiveHandle {
    key: ArchiveKey,
    /// Holder count. Mutated only under the registry lock.
    refs: AtomicU32,
    state: Mutex<HandleState>,
    status_tx: watch::Sender<HandleStatus>,
    events: Arc<ObserverSet>,
}

impl ArchiveHandle {
    pub(crate) fn new(key: ArchiveKey, events: Arc<ObserverSet>) -> Arc<Self> {
        let (status_tx, _) = watch::channel(HandleStatus::Opening);
        Arc::new(Self {
            key,
            refs: AtomicU32::new(0),
            state: Mutex::new(HandleState::Opening {
                close_requested: false,
            }),
            status_tx,
            events,
        })
    }

    /// The key this handle is registered under.
    pub fn key(&self) -> &ArchiveKey {
        &self.key
    }

    /// Current lifecycle status.
    pub fn status(&self) -> HandleStatus {
        self.state.lock().status()
    }

    /// Current holder count. Diagnostic only; races with concurrent
    /// acquire/release.
    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Captured open failure, if the handle is FAILED.
    pub fn failure(&self) -> Option<Arc<OpenError>> {
        match &*self.state.lock() {
            HandleState::Failed { error } => Some(Arc::clone(error)),
            _ => None,
        }
    }

    /// Subscribe to status transitions.
    ///
    /// The receiver starts at the current status and yields each later
    /// transition; intermediate values may coalesce under load, so use the
    /// registry's observer registration to record exact sequences.
    pub fn subscribe(&self) -> watch::Receiver<HandleStatus> {
        self.status_tx.subscribe()
    }

    /// Wait until the open settles, returning the first non-OPENING status.
    pub async fn wait_until_settled(&self) -> HandleStatus {
        let mut rx = self.subscribe();
        match rx.wait_for(|status| *status != HandleStatus::Opening).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        }
    }

    /// The ready container.
    ///
    /// Fails with [`NotReady`] in every state but OPENED; on FAILED the
    /// captured failure detail is attached.
    pub fn archive(&self) -> Result<Arc<dyn Archive>, NotReady> {
        match &*self.state.lock() {
            HandleState::Opened { archive } => Ok(Arc::clone(archive)),
            HandleState::Failed { error } => Err(NotReady {
                status: HandleStatus::Failed,
                failure: Some(Arc::clone(error)),
            }),
            state => Err(NotReady {
                status: state.status(),
                failure: None,
            }),
        }
    }

    /// Increment the holder count. Caller holds the registry lock.
    pub(crate) fn acquire(&self) -> u32 {
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the holder count, returning the remaining count, or
    /// `None` when the count is already zero. Caller holds the registry
    /// lock.
    pub(crate) fn release(&self) -> Option<u32> {
        let current = self.refs.load(Ordering::Acquire);
        if current == 0 {
            return None;
        }
        self.refs.store(current - 1, Ordering::Release);
        Some(current - 1)
    }

    /// Record the result of the background open and return the follow-up
    /// work the open task owes.
    pub(crate) fn complete_open(
        &self,
        result: Result<Arc<dyn Archive>, OpenError>,
    ) -> OpenCompletion {
        let mut state = self.state.lock();
        let close_requested = match &*state {
            HandleState::Opening { close_requested } => *close_requested,
            // An open completes exactly once; anything else is a stray task.
            _ => return OpenCompletion::Settled,
        };
        match result {
            Ok(archive) => {
                *state = HandleState::Opened {
                    archive: Arc::clone(&archive),
                };
                drop(state);
                self.publish(HandleStatus::Opened);
                if close_requested {
                    *self.state.lock() = HandleState::Closing;
                    self.publish(HandleStatus::Closing);
                    OpenCompletion::CloseNow(archive)
                } else {
                    OpenCompletion::Settled
                }
            }
            Err(error) => {
                *state = HandleState::Failed {
                    error: Arc::new(error),
                };
                drop(state);
                self.publish(HandleStatus::Failed);
                if close_requested {
                    self.finish_noop_close();
                }
                OpenCompletion::Settled
            }
        }
    }

    /// Start teardown after the last holder leaves. The caller has already
    /// removed the handle from the registry.
    ///
    /// Returns the container to close if one was materialized; a handle
    /// still mid-open defers the close to the open task.
    pub(crate) fn begin_close(&self) -> CloseAction {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, HandleState::Closing) {
            HandleState::Opening { .. } => {
                *state = HandleState::Opening {
                    close_requested: true,
                };
                CloseAction::DeferredToOpen
            }
            HandleState::Opened { archive } => {
                drop(state);
                self.publish(HandleStatus::Closing);
                CloseAction::CloseNow(archive)
            }
            HandleState::Failed { .. } => {
                drop(state);
                self.finish_noop_close();
                CloseAction::NothingToClose
            }
            previous @ (HandleState::Closing | HandleState::Closed) => {
                *state = previous;
                CloseAction::NothingToClose
            }
        }
    }

    /// Mark the close finished. Called once the container close (or its
    /// no-op stand-in) has run.
    pub(crate) fn finish_close(&self) {
        *self.state.lock() = HandleState::Closed;
        self.publish(HandleStatus::Closed);
    }

    /// CLOSING then CLOSED without any close work. The state lock must not
    /// be held.
    fn finish_noop_close(&self) {
        *self.state.lock() = HandleState::Closing;
        self.publish(HandleStatus::Closing);
        self.finish_close();
    }

    fn publish(&self, status: HandleStatus) {
        self.events.emit(&self.key, status);
        self.status_tx.send_replace(status);
    }
}

impl fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveHandle")
            .field("key", &self.key)
            .field("status", &self.status())
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StatusObserver;
    use crate::identity::AccessMode;
    use crate::testing::MemoryArchive;
    use url::Url;

    struct Recorder {
        seen: Mutex<Vec<HandleStatus>>,
    }

    impl StatusObserver for Recorder {
        fn status_changed(&self, _key: &ArchiveKey, status: HandleStatus) {
            self.seen.lock().push(status);
        }
    }

    fn new_handle() -> (Arc<ArchiveHandle>, Arc<Recorder>) {
        let events = Arc::new(ObserverSet::new());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        events.insert(None, recorder.clone());
        let key = ArchiveKey::new(
            Url::parse("file:///data/sample.zip").unwrap(),
            AccessMode::Read,
        );
        (ArchiveHandle::new(key, events), recorder)
    }

    #[test]
    fn new_handle_is_opening_with_zero_refs() {
        let (handle, _) = new_handle();
        assert_eq!(handle.status(), HandleStatus::Opening);
        assert_eq!(handle.ref_count(), 0);
        assert!(handle.failure().is_none());
    }

    #[test]
    fn acquire_and_release_track_holders() {
        let (handle, _) = new_handle();
        assert_eq!(handle.acquire(), 1);
        assert_eq!(handle.acquire(), 2);
        assert_eq!(handle.release(), Some(1));
        assert_eq!(handle.release(), Some(0));
        assert_eq!(handle.release(), None);
    }

    #[test]
    fn successful_open_serves_archive() {
        let (handle, recorder) = new_handle();
        let archive: Arc<dyn Archive> = MemoryArchive::builder().build();
        assert!(matches!(
            handle.complete_open(Ok(archive)),
            OpenCompletion::Settled
        ));
        assert_eq!(handle.status(), HandleStatus::Opened);
        assert!(handle.archive().is_ok());
        assert_eq!(recorder.seen.lock().as_slice(), &[HandleStatus::Opened]);
    }

    #[test]
    fn failed_open_captures_stable_detail() {
        let (handle, _) = new_handle();
        handle.complete_open(Err(OpenError::new("bad magic")));
        assert_eq!(handle.status(), HandleStatus::Failed);

        let first = handle.archive().err().unwrap();
        let second = handle.archive().err().unwrap();
        assert_eq!(first.status, HandleStatus::Failed);
        assert_eq!(
            first.failure.as_ref().unwrap().message(),
            second.failure.as_ref().unwrap().message()
        );
        assert!(Arc::ptr_eq(
            first.failure.as_ref().unwrap(),
            second.failure.as_ref().unwrap()
        ));
    }

    #[test]
    fn close_from_opened_returns_container() {
        let (handle, recorder) = new_handle();
        let archive: Arc<dyn Archive> = MemoryArchive::builder().build();
        handle.complete_open(Ok(archive.clone()));

        let CloseAction::CloseNow(to_close) = handle.begin_close() else {
            panic!("expected a container to close");
        };
        assert_eq!(handle.status(), HandleStatus::Closing);
        drop(to_close);
        handle.finish_close();
        assert_eq!(handle.status(), HandleStatus::Closed);
        assert_eq!(
            recorder.seen.lock().as_slice(),
            &[
                HandleStatus::Opened,
                HandleStatus::Closing,
                HandleStatus::Closed
            ]
        );
    }

    #[test]
    fn close_from_failed_needs_no_work() {
        let (handle, recorder) = new_handle();
        handle.complete_open(Err(OpenError::new("bad magic")));
        assert!(matches!(handle.begin_close(), CloseAction::NothingToClose));
        assert_eq!(handle.status(), HandleStatus::Closed);
        assert_eq!(
            recorder.seen.lock().as_slice(),
            &[
                HandleStatus::Failed,
                HandleStatus::Closing,
                HandleStatus::Closed
            ]
        );
    }

    #[test]
    fn close_during_open_is_deferred() {
        let (handle, recorder) = new_handle();
        assert!(matches!(handle.begin_close(), CloseAction::DeferredToOpen));
        assert_eq!(handle.status(), HandleStatus::Opening);

        let archive: Arc<dyn Archive> = MemoryArchive::builder().build();
        let OpenCompletion::CloseNow(to_close) = handle.complete_open(Ok(archive.clone())) else {
            panic!("deferred close should surface on open completion");
        };
        drop(to_close);
        handle.finish_close();

        // The container passed through OPENED before closing.
        assert_eq!(
            recorder.seen.lock().as_slice(),
            &[
                HandleStatus::Opened,
                HandleStatus::Closing,
                HandleStatus::Closed
            ]
        );
    }

    #[test]
    fn deferred_close_after_failed_open_completes_teardown() {
        let (handle, recorder) = new_handle();
        handle.begin_close();
        assert!(matches!(
            handle.complete_open(Err(OpenError::new("bad magic"))),
            OpenCompletion::Settled
        ));
        assert_eq!(handle.status(), HandleStatus::Closed);
        assert_eq!(
            recorder.seen.lock().as_slice(),
            &[
                HandleStatus::Failed,
                HandleStatus::Closing,
                HandleStatus::Closed
            ]
        );
    }
}
