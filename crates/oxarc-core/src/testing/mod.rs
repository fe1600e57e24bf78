//! Test fixtures for exercising the registry without a real container
//! format.
//!
//! - [`MemoryArchive`]: an in-memory document tree with close tracking
//! - [`ScriptedOpener`]: an opener whose completion the test controls
//! - [`RecordingObserver`]: records every status emission for assertions
//!
//! These are used by this crate's own test suites and exported for
//! consumers that need to exercise acquire/release flows against a
//! deterministic container.
//!
//! # Example
//!
//! ```ignore
//! let archive = MemoryArchive::builder()
//!     .file("/docs/readme.txt", b"hello")
//!     .build();
//! let opener = ScriptedOpener::with_archive(archive.clone());
//! opener.hold();
//!
//! let registry = ArchiveRegistry::new(opener.clone());
//! registry.acquire(id)?;            // open parks on the gate
//! opener.release();                 // open completes
//! ```

mod archive;
mod observer;
mod opener;

pub use archive::{MemoryArchive, MemoryArchiveBuilder};
pub use observer::RecordingObserver;
pub use opener::ScriptedOpener;
