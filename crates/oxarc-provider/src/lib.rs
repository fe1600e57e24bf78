//! Archive-backed document provider facade.
//!
//! `oxarc-provider` adapts the archive registry in [`oxarc_core`] to the
//! surface a document-provider host expects: acquire/release entry points
//! bracketing each usage session, listing and read operations that
//! degrade to loading/error signals while a container is not ready, and
//! change notifications that tell the host when to re-issue a listing.
//!
//! The container root is special-cased throughout: its row and MIME type
//! are synthesized from the source URL so hosts can render the archive
//! node before (or without) the container ever opening.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod item;
mod provider;

pub use item::{ChildDocuments, DocumentRow};
pub use provider::{
    ArchivesProvider, ChangeNotifier, ProviderError, SUPPORTED_ARCHIVE_TYPES,
};
