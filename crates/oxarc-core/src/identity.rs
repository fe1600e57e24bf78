//! Document identifiers for archive entries.
//!
//! A document id encodes the triple (source URL, access mode, entry path)
//! as `<source>::<mode>::<path>`. The (source, mode) pair, the
//! [`ArchiveKey`], deduplicates opened containers; the entry path
//! addresses one entry inside a container and never participates in
//! keying.
//!
//! Decoding is strict over its own encoding and partial over arbitrary
//! input: the id is split on its last two `::` delimiters, so source URLs
//! containing `::` (IPv6 literals) survive, while entry paths containing
//! `::` do not round-trip.

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::Url;

/// Delimiter between the three segments of a document id.
const DELIMITER: &str = "::";

/// Errors produced while decoding a document identifier.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identifier does not contain both `::` delimiters.
    #[error("document id is missing a `::` delimiter: {0:?}")]
    MissingDelimiter(String),

    /// The source segment is not a parseable URL.
    #[error("document id has an invalid source url: {0}")]
    InvalidSource(#[from] url::ParseError),

    /// The access-mode segment is not a known mode string.
    #[error("unknown access mode: {0:?}")]
    InvalidAccessMode(String),
}

/// Access mode requested for a container.
///
/// Together with the source URL this forms the deduplication key: a
/// read-only and a read-write view of the same file are distinct
/// containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Read-only access.
    Read,
    /// Read-write access.
    ReadWrite,
}

impl AccessMode {
    /// Convert to the wire string used inside document ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::ReadWrite => "rw",
        }
    }
}

impl FromStr for AccessMode {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(AccessMode::Read),
            "rw" => Ok(AccessMode::ReadWrite),
            other => Err(IdentityError::InvalidAccessMode(other.to_owned())),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path of an entry inside an opened container.
///
/// `/` is the container root. Beyond that, paths are opaque to the core;
/// the archive implementation decides their meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPath(String);

impl EntryPath {
    /// Create a path from its string form.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The container root.
    pub fn root() -> Self {
        Self("/".to_owned())
    }

    /// Whether this path addresses the container root.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The string form of the path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.0
            .rsplit('/')
            .find(|segment| !segment.is_empty())
    }

    /// Whether `other` sits at or below this path.
    pub fn contains(&self, other: &EntryPath) -> bool {
        if self.is_root() {
            return true;
        }
        let base = self.0.strip_suffix('/').unwrap_or(&self.0);
        match other.0.strip_prefix(base) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deduplication key for opened containers: (source URL, access mode).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveKey {
    /// Location of the container file.
    pub source: Url,
    /// Mode the container is opened with.
    pub mode: AccessMode,
}

impl ArchiveKey {
    /// Create a key from its parts.
    pub fn new(source: Url, mode: AccessMode) -> Self {
        Self { source, mode }
    }

    /// User-facing name for the container, derived from the source URL's
    /// final path segment.
    pub fn display_name(&self) -> String {
        self.source
            .path_segments()
            .and_then(|segments| segments.rev().find(|segment| !segment.is_empty()))
            .map_or_else(
                || self.source.to_string(),
                |segment| percent_decode_str(segment).decode_utf8_lossy().into_owned(),
            )
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source, self.mode)
    }
}

/// Decoded form of a document identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveIdentity {
    source: Url,
    mode: AccessMode,
    path: EntryPath,
}

impl ArchiveIdentity {
    /// Create an identity from its parts.
    pub fn new(source: Url, mode: AccessMode, path: EntryPath) -> Self {
        Self { source, mode, path }
    }

    /// Decode a document id into its (source, mode, path) triple.
    pub fn decode(document_id: &str) -> Result<Self, IdentityError> {
        let mut segments = document_id.rsplitn(3, DELIMITER);
        let (Some(path), Some(mode), Some(source)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(IdentityError::MissingDelimiter(document_id.to_owned()));
        };
        Ok(Self {
            source: Url::parse(source)?,
            mode: mode.parse()?,
            path: EntryPath::new(path),
        })
    }

    /// Encode the identity back into a document id.
    ///
    /// This is the left inverse of [`decode`](Self::decode) over decode's
    /// own image. Identities constructed by hand with an entry path
    /// containing `::` produce ids that do not round-trip.
    pub fn encode(&self) -> String {
        format!(
            "{}{DELIMITER}{}{DELIMITER}{}",
            self.source,
            self.mode.as_str(),
            self.path
        )
    }

    /// The container deduplication key.
    pub fn key(&self) -> ArchiveKey {
        ArchiveKey::new(self.source.clone(), self.mode)
    }

    /// Location of the container file.
    pub fn source(&self) -> &Url {
        &self.source
    }

    /// Mode the container is opened with.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Path of the addressed entry inside the container.
    pub fn path(&self) -> &EntryPath {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_splits_three_segments() {
        let identity = ArchiveIdentity::decode("file:///data/sample.zip::r::/dir/a.txt").unwrap();
        assert_eq!(identity.source().as_str(), "file:///data/sample.zip");
        assert_eq!(identity.mode(), AccessMode::Read);
        assert_eq!(identity.path().as_str(), "/dir/a.txt");
    }

    #[test]
    fn decode_survives_ipv6_source() {
        let identity = ArchiveIdentity::decode("http://[::1]/backup.zip::rw::/").unwrap();
        assert_eq!(identity.source().host_str(), Some("[::1]"));
        assert_eq!(identity.mode(), AccessMode::ReadWrite);
        assert!(identity.path().is_root());
    }

    #[test]
    fn decode_rejects_missing_delimiters() {
        assert!(matches!(
            ArchiveIdentity::decode("file:///sample.zip"),
            Err(IdentityError::MissingDelimiter(_))
        ));
        assert!(matches!(
            ArchiveIdentity::decode("file:///sample.zip::r"),
            Err(IdentityError::MissingDelimiter(_))
        ));
    }

    #[test]
    fn decode_rejects_unknown_mode() {
        assert!(matches!(
            ArchiveIdentity::decode("file:///sample.zip::rwx::/"),
            Err(IdentityError::InvalidAccessMode(_))
        ));
    }

    #[test]
    fn decode_rejects_bad_source() {
        assert!(matches!(
            ArchiveIdentity::decode("not a url::r::/"),
            Err(IdentityError::InvalidSource(_))
        ));
    }

    #[test]
    fn encode_is_left_inverse_of_decode() {
        let id = "file:///data/sample.zip::rw::/nested/file.bin";
        let identity = ArchiveIdentity::decode(id).unwrap();
        assert_eq!(identity.encode(), id);
        assert_eq!(ArchiveIdentity::decode(&identity.encode()).unwrap(), identity);
    }

    #[test]
    fn key_ignores_entry_path() {
        let a = ArchiveIdentity::decode("file:///sample.zip::r::/a").unwrap();
        let b = ArchiveIdentity::decode("file:///sample.zip::r::/b").unwrap();
        let c = ArchiveIdentity::decode("file:///sample.zip::rw::/a").unwrap();
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn display_name_decodes_final_segment() {
        let key = ArchiveIdentity::decode("file:///tmp/photos%20backup.zip::r::/")
            .unwrap()
            .key();
        assert_eq!(key.display_name(), "photos backup.zip");
    }

    #[test]
    fn entry_path_containment() {
        let root = EntryPath::root();
        let dir = EntryPath::new("/docs");
        let file = EntryPath::new("/docs/readme.txt");
        let sibling = EntryPath::new("/docs2/readme.txt");

        assert!(root.contains(&dir));
        assert!(root.contains(&file));
        assert!(dir.contains(&file));
        assert!(dir.contains(&dir));
        assert!(!dir.contains(&sibling));
        assert!(!file.contains(&dir));
    }

    #[test]
    fn entry_path_file_name() {
        assert_eq!(EntryPath::new("/docs/readme.txt").file_name(), Some("readme.txt"));
        assert_eq!(EntryPath::new("/docs/").file_name(), Some("docs"));
        assert_eq!(EntryPath::root().file_name(), None);
    }

    #[test]
    fn access_mode_round_trips() {
        for mode in [AccessMode::Read, AccessMode::ReadWrite] {
            assert_eq!(mode.as_str().parse::<AccessMode>().unwrap(), mode);
        }
    }
}
