//! Reference-counted lifecycle management for shared archive containers.
//!
//! Many independent callers of an archive-backed document provider want to
//! browse the same container (a zip-like file identified by source URL and
//! access mode) at once. Opening a container is slow, so it should happen
//! once; closing it under a caller still using it would be worse. This
//! crate manages exactly that: *when* a container is opened, *how many*
//! holders reference it, and *when* it is safe to discard. Container
//! formats themselves live behind the [`Archive`] / [`ArchiveOpener`]
//! boundary and are none of this crate's business.
//!
//! # Architecture
//!
//! - [`identity`]: the document-id codec, `<source>::<mode>::<path>`
//!   triples and the [`ArchiveKey`] used for deduplication
//! - [`archive`]: the capability traits a container implementation plugs
//!   in through
//! - [`handle`]: the per-container state machine (OPENING → OPENED or
//!   FAILED → CLOSING → CLOSED) plus its reference count
//! - [`registry`]: the keyed map owning handle creation, acquire/release
//!   bookkeeping and eviction
//! - [`events`]: status-change observation for hosts that re-issue
//!   in-flight listings
//! - [`testing`]: in-memory fixtures for exercising the lifecycle
//!
//! # Concurrency
//!
//! Registry operations are callable from any thread or task and never
//! block beyond one short critical section. Container opens and closes run
//! as background tasks on the tokio runtime captured at registry
//! construction. An open, once started, always runs to completion; a
//! release that zeroes the holder count mid-open defers the close until
//! the open settles.
//!
//! # Example
//!
//! ```ignore
//! let registry = ArchiveRegistry::new(Arc::new(ZipOpener::default()));
//! let id = "file:///data/sample.zip::r::/";
//!
//! registry.acquire(id)?;
//! match registry.with_archive(id, |archive| archive.children(&EntryPath::root())) {
//!     Ok(entries) => render(entries),
//!     Err(RegistryError::NotReady(state)) => show_spinner_or_error(state),
//!     Err(other) => return Err(other.into()),
//! }
//! registry.release(id)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod error;
pub mod events;
pub mod handle;
pub mod identity;
pub mod registry;
pub mod testing;

pub use archive::{
    Archive, ArchiveError, ArchiveOpener, CloseError, DocumentEntry, MIME_TYPE_DIRECTORY,
    OpenError,
};
pub use events::{StatusObserver, SubscriptionId};
pub use handle::{ArchiveHandle, HandleStatus, NotReady};
pub use identity::{AccessMode, ArchiveIdentity, ArchiveKey, EntryPath, IdentityError};
pub use registry::{ArchiveRegistry, RegistryError};
