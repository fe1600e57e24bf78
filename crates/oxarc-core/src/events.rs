//! Status-change observation.
//!
//! Every handle transition is announced to registered observers, keyed by
//! the handle's [`ArchiveKey`], so that listing operations already in
//! flight against a still-opening container can be re-issued once it
//! settles.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::handle::HandleStatus;
use crate::identity::ArchiveKey;

/// Callback invoked after every handle status transition.
///
/// Callbacks run on whichever thread or task performed the transition and
/// should return quickly.
pub trait StatusObserver: Send + Sync {
    /// Called with the key of the handle and the status it just entered.
    fn status_changed(&self, key: &ArchiveKey, status: HandleStatus);
}

/// Token identifying one observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    /// Restricts delivery to a single key when set.
    key: Option<ArchiveKey>,
    observer: Arc<dyn StatusObserver>,
}

/// Concurrent observer table. Ids are assigned from an atomic counter and
/// never reused.
pub(crate) struct ObserverSet {
    registrations: DashMap<u64, Registration>,
    next_id: AtomicU64,
}

impl ObserverSet {
    pub(crate) fn new() -> Self {
        Self {
            registrations: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn insert(
        &self,
        key: Option<ArchiveKey>,
        observer: Arc<dyn StatusObserver>,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registrations.insert(id, Registration { key, observer });
        SubscriptionId(id)
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        self.registrations.remove(&id.0).is_some()
    }

    /// Deliver `status` for `key` to every matching observer.
    pub(crate) fn emit(&self, key: &ArchiveKey, status: HandleStatus) {
        // Collect first: callbacks may re-enter subscribe/unsubscribe.
        let observers: Vec<Arc<dyn StatusObserver>> = self
            .registrations
            .iter()
            .filter(|entry| entry.value().key.as_ref().is_none_or(|k| k == key))
            .map(|entry| Arc::clone(&entry.value().observer))
            .collect();
        for observer in observers {
            observer.status_changed(key, status);
        }
    }
}
