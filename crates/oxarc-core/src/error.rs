//! Error types for the core crate.
//!
//! Errors are defined in the module that owns them; this module re-exports
//! them in one place.

pub use crate::archive::{ArchiveError, CloseError, OpenError};
pub use crate::handle::NotReady;
pub use crate::identity::IdentityError;
pub use crate::registry::RegistryError;
