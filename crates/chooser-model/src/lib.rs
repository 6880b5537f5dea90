#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! Value types shared across the message-selection core: the identity of a
//! single partitioned input stream (`Ssp`), its offsets, and the envelope a
//! selector is asked to choose between.

use std::fmt::{self, Display, Formatter};

/// (system, stream, partition) triple identifying one ordered log of
/// envelopes. Value-equal, hashable, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ssp {
    /// Name of the messaging system owning this stream (e.g. a Kafka
    /// cluster alias).
    pub system: String,
    /// Name of the stream (topic) within `system`.
    pub stream: String,
    /// Partition index within `stream`.
    pub partition: u32,
}

impl Ssp {
    /// Creates a new stream-partition identity.
    pub fn new(system: impl Into<String>, stream: impl Into<String>, partition: u32) -> Self {
        Self {
            system: system.into(),
            stream: stream.into(),
            partition,
        }
    }
}

impl Display for Ssp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.system, self.stream, self.partition)
    }
}

/// An opaque offset. Its only defined operation is equality against another
/// offset (see the data model's comparability note); ordering within an SSP
/// is given by arrival order, not by offset value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Offset(pub String);

impl Offset {
    /// Wraps a raw offset string.
    pub fn new(offset: impl Into<String>) -> Self {
        Self(offset.into())
    }
}

impl Display for Offset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Offset {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Offset {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The position a consumer declares at `register` time: either a concrete
/// last-read offset, or the sentinel meaning "this stream has never been
/// read" (empty stream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartingOffset {
    /// The consumer last read up to and including this offset.
    Offset(Offset),
    /// The stream has no prior reads (registration sentinel).
    Empty,
}

impl StartingOffset {
    /// Returns the wrapped offset, if any.
    pub fn offset(&self) -> Option<&Offset> {
        match self {
            StartingOffset::Offset(offset) => Some(offset),
            StartingOffset::Empty => None,
        }
    }
}

/// A single message carrying its stream-partition identity, an opaque key
/// and message payload, and the offset it was produced at.
///
/// `K` and `M` are left generic: the selector core never inspects key or
/// message contents, only routes by `ssp` and compares `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<K, M> {
    /// The stream-partition this envelope was produced on.
    pub ssp: Ssp,
    /// Opaque partitioning/ordering key.
    pub key: K,
    /// Opaque message payload.
    pub message: M,
    /// Offset of this envelope within `ssp`.
    pub offset: Offset,
}

impl<K, M> Envelope<K, M> {
    /// Creates a new envelope.
    pub fn new(ssp: Ssp, key: K, message: M, offset: Offset) -> Self {
        Self {
            ssp,
            key,
            message,
            offset,
        }
    }
}

/// Errors shared by every selector-core crate that must reject an
/// operation referring to an SSP outside its known set.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// An `update` (or similar) arrived for an SSP that was never
    /// registered. Minimal conformance is to log and drop; strict
    /// implementations may surface this instead.
    #[error("update for unregistered stream-partition: {ssp}")]
    UnregisteredSsp {
        /// The offending stream-partition.
        ssp: Ssp,
    },
}
