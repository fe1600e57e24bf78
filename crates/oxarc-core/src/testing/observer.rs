//! Recording observer fixture.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::StatusObserver;
use crate::handle::HandleStatus;
use crate::identity::ArchiveKey;

/// Observer that records every emission for later assertions.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(ArchiveKey, HandleStatus)>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every recorded (key, status) pair, in emission order.
    pub fn events(&self) -> Vec<(ArchiveKey, HandleStatus)> {
        self.events.lock().clone()
    }

    /// Every recorded status, in emission order.
    pub fn statuses(&self) -> Vec<HandleStatus> {
        self.events.lock().iter().map(|(_, status)| *status).collect()
    }

    /// Recorded statuses for a single key, in emission order.
    pub fn statuses_for(&self, key: &ArchiveKey) -> Vec<HandleStatus> {
        self.events
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, status)| *status)
            .collect()
    }
}

impl StatusObserver for RecordingObserver {
    fn status_changed(&self, key: &ArchiveKey, status: HandleStatus) {
        self.events.lock().push((key.clone(), status));
    }
}
