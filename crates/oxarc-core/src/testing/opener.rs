//! Scripted opener fixture.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::archive::{Archive, ArchiveOpener, OpenError};
use crate::identity::ArchiveKey;
use crate::testing::MemoryArchive;

enum Outcome {
    /// Yield this archive; a fresh empty one per open when unset.
    Succeed(Option<Arc<MemoryArchive>>),
    Fail(String),
}

/// An opener whose completion the test controls.
///
/// Every open call increments a counter, parks on the gate while
/// [`hold`](Self::hold) is in effect, and then yields the scripted
/// outcome. Call `hold` before the first acquire for deterministic
/// interleaving tests.
pub struct ScriptedOpener {
    outcome: Outcome,
    /// `true` while opens must park.
    gate: watch::Sender<bool>,
    open_calls: AtomicUsize,
}

impl ScriptedOpener {
    /// Opens succeed with a fresh empty archive each time.
    pub fn new() -> Arc<Self> {
        Self::build(Outcome::Succeed(None))
    }

    /// Opens succeed with `archive` each time.
    pub fn with_archive(archive: Arc<MemoryArchive>) -> Arc<Self> {
        Self::build(Outcome::Succeed(Some(archive)))
    }

    /// Opens fail with `message` each time.
    pub fn failing(message: &str) -> Arc<Self> {
        Self::build(Outcome::Fail(message.to_owned()))
    }

    fn build(outcome: Outcome) -> Arc<Self> {
        let (gate, _) = watch::channel(false);
        Arc::new(Self {
            outcome,
            gate,
            open_calls: AtomicUsize::new(0),
        })
    }

    /// Park subsequent (and pending) opens until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(true);
    }

    /// Let parked opens complete.
    pub fn release(&self) {
        self.gate.send_replace(false);
    }

    /// How many opens have started.
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::Acquire)
    }
}

impl ArchiveOpener for ScriptedOpener {
    fn open(&self, _key: ArchiveKey) -> BoxFuture<'_, Result<Arc<dyn Archive>, OpenError>> {
        self.open_calls.fetch_add(1, Ordering::AcqRel);
        Box::pin(async move {
            let mut gate = self.gate.subscribe();
            // wait_for fails only when the sender is dropped, and we own it.
            let _ = gate.wait_for(|held| !held).await;
            match &self.outcome {
                Outcome::Succeed(Some(archive)) => Ok(Arc::clone(archive) as Arc<dyn Archive>),
                Outcome::Succeed(None) => Ok(MemoryArchive::builder().build() as Arc<dyn Archive>),
                Outcome::Fail(message) => Err(OpenError::new(message.clone())),
            }
        })
    }
}
