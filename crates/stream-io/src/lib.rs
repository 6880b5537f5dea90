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

//! Abstract interfaces to the messaging system driver, consumed by the task
//! loop (the consumer) and by composition (the admin metadata client), but
//! never by the selectors themselves: selectors are pure in-memory state
//! machines driven through `register`/`update`/`choose`, and everything that
//! actually talks to a broker lives behind the traits here.

use std::collections::HashMap;

use async_trait::async_trait;
use chooser_model::{Envelope, Offset, Ssp, StartingOffset};

/// Errors raised by a consumer or admin implementation.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The underlying driver failed to connect, poll, or fetch metadata.
    #[error("stream I/O error (system: {system}, reason: {reason})")]
    Driver {
        /// The messaging system that failed.
        system: String,
        /// The driver-reported failure reason.
        reason: String,
    },

    /// Admin metadata was requested for a stream the driver does not know.
    #[error("unknown stream (system: {system}, stream: {stream})")]
    UnknownStream {
        /// The messaging system queried.
        system: String,
        /// The stream name that could not be resolved.
        stream: String,
    },
}

/// Per-partition offset landmarks as reported by an admin client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMetadata {
    /// The oldest retained offset in the partition.
    pub oldest_offset: Offset,
    /// The newest offset already written to the partition.
    pub newest_offset: Offset,
    /// The offset a new message would be assigned next.
    pub upcoming_offset: Offset,
}

/// A driver-backed source of envelopes for one or more registered streams.
///
/// The task loop owns the only live `Consumer`; it calls `register` once per
/// SSP before the first `poll`, then alternates `poll` with handing the
/// yielded envelopes to a selector's `update`, resuming `poll` whenever
/// `choose` returns `None`.
#[async_trait]
pub trait Consumer<K, M>: Send {
    /// Declares interest in `ssp`, to be delivered starting just after
    /// `starting_offset`.
    async fn register(&mut self, ssp: Ssp, starting_offset: StartingOffset) -> Result<(), Error>;

    /// Starts delivery for all registered streams.
    async fn start(&mut self) -> Result<(), Error>;

    /// Stops delivery and releases any underlying connection.
    async fn stop(&mut self) -> Result<(), Error>;

    /// Blocks until at least one envelope is available, or the consumer is
    /// stopped, then returns whatever has accumulated since the last call.
    async fn poll(&mut self) -> Result<Vec<Envelope<K, M>>, Error>;
}

/// A driver-backed source of stream/partition metadata, consulted only at
/// composition time to resolve bootstrap targets.
#[async_trait]
pub trait Admin: Send {
    /// Returns oldest/newest/upcoming offsets for every partition of each
    /// named stream.
    async fn get_system_stream_metadata(
        &mut self,
        stream_names: &[String],
    ) -> Result<HashMap<String, HashMap<u32, PartitionMetadata>>, Error>;

    /// Resolves, for each requested SSP, the offset immediately after the
    /// one given.
    async fn get_offsets_after(&mut self, offsets: &HashMap<Ssp, Offset>) -> Result<HashMap<Ssp, Offset>, Error>;
}
