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

//! Replays the coordinator stream into a bootstrapped configuration
//! snapshot.
//!
//! The coordinator stream is an ordered, append-only log of `SetConfig` /
//! `Delete` records; replaying it from its earliest offset to the head
//! offset observed at replay start yields a key/value map equivalent to
//! whatever the log's producers have, collectively, last written for each
//! key. Replay is idempotent: replaying the same log twice, or replaying a
//! log containing redundant writes to the same key, always converges to the
//! same snapshot.

use std::collections::{BTreeMap, HashMap};

use chooser_model::{Offset, Ssp, StartingOffset};
use selector::bootstrapping::{ExactOffsetMatch, OffsetReached};
use serde::Deserialize;
use stream_io::{Admin, Consumer};

/// Errors raised while replaying the coordinator log.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The underlying consumer or admin client failed.
    #[error("coordinator stream I/O error: {0}")]
    StreamIo(#[from] stream_io::Error),

    /// A record's key or value bytes were not valid coordinator-message
    /// JSON.
    #[error("undecodable coordinator record: {reason}")]
    UndecodableRecord {
        /// Human-readable decode failure.
        reason: String,
    },

    /// `config` was called before replay reached the head offset captured
    /// at bootstrap start.
    #[error("coordinator log reader has not finished bootstrapping")]
    NotBootstrapped,
}

/// The sorted-field key of a coordinator message: `{key, type, version}`.
///
/// Deserializes like any other fixed-field struct — field order on the wire
/// never matters for that direction. Serializing is the direction that must
/// be canonical: [`Self::to_canonical_bytes`] goes through a
/// `BTreeMap<&str, Value>` rather than deriving `Serialize` on this struct
/// directly, because a derived impl would emit fields in declaration order
/// (`version, type, key`) and two producers populating them in a different
/// order would not serialize identically. `BTreeMap`'s iteration order is
/// its key order, and `serde_json` preserves that on the wire, so every
/// producer converges on the same alphabetical byte string: `key` before
/// `type` before `version`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoordinatorMessageKey {
    /// Wire format version of this record.
    pub version: i64,
    /// Record type; only `"SetConfig"` is replayed, others are ignored.
    #[serde(rename = "type")]
    pub message_type: String,
    /// The configuration key this record sets or deletes.
    pub key: String,
}

impl CoordinatorMessageKey {
    /// Creates a `SetConfig`-typed key for `key` at wire version 1.
    pub fn set_config(key: impl Into<String>) -> Self {
        Self {
            version: 1,
            message_type: "SetConfig".to_string(),
            key: key.into(),
        }
    }

    /// Serializes to canonical, sort-ordered JSON bytes.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut sorted: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
        let _ = sorted.insert("key", serde_json::Value::String(self.key.clone()));
        let _ = sorted.insert("type", serde_json::Value::String(self.message_type.clone()));
        let _ = sorted.insert("version", serde_json::Value::from(self.version));
        serde_json::to_vec(&sorted).map_err(|error| Error::UndecodableRecord { reason: error.to_string() })
    }

    /// Parses canonical JSON bytes back into a key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|error| Error::UndecodableRecord { reason: error.to_string() })
    }
}

/// A decoded `SetConfig` / `Delete` record: `value: None` is a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorMessage {
    /// The record's canonical key.
    pub key: CoordinatorMessageKey,
    /// The record's value mapping, or `None` for a delete.
    pub value: Option<serde_json::Value>,
}

impl CoordinatorMessage {
    fn decode(key_bytes: &[u8], value_bytes: Option<&[u8]>) -> Result<Self, Error> {
        let key = CoordinatorMessageKey::from_bytes(key_bytes)?;
        let value = value_bytes
            .map(serde_json::from_slice)
            .transpose()
            .map_err(|error| Error::UndecodableRecord { reason: error.to_string() })?;
        Ok(Self { key, value })
    }
}

/// Replays a coordinator stream into a key/value snapshot.
///
/// `C` is the raw consumer of coordinator records, keyed by JSON key bytes
/// with an optional JSON value payload; `A` is the admin client used once,
/// at bootstrap, to capture the head offset replay must reach. A custom
/// [`OffsetReached`] strategy may be supplied for systems whose offsets
/// support more than exact equality.
pub struct CoordinatorLogReader<C, A> {
    consumer: C,
    admin: A,
    ssp: Ssp,
    snapshot: HashMap<String, serde_json::Value>,
    bootstrapped: bool,
    offset_reached: Box<dyn OffsetReached>,
}

impl<C, A> CoordinatorLogReader<C, A>
where
    C: Consumer<Vec<u8>, Option<Vec<u8>>>,
    A: Admin,
{
    /// Creates a reader for the coordinator stream-partition `ssp`, using
    /// exact offset equality to detect "replay has reached the head".
    pub fn new(consumer: C, admin: A, ssp: Ssp) -> Self {
        Self::with_offset_reached(consumer, admin, ssp, Box::new(ExactOffsetMatch))
    }

    /// As [`Self::new`], but with a caller-supplied "reached head" strategy.
    pub fn with_offset_reached(consumer: C, admin: A, ssp: Ssp, offset_reached: Box<dyn OffsetReached>) -> Self {
        Self {
            consumer,
            admin,
            ssp,
            snapshot: HashMap::new(),
            bootstrapped: false,
            offset_reached,
        }
    }

    /// Returns `true` once replay has reached the head offset captured at
    /// the start of [`Self::bootstrap`].
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Replays the coordinator stream from its earliest offset to the head
    /// offset observed at the start of this call, materializing the
    /// configuration snapshot. Calling this again re-bootstraps from
    /// scratch against a freshly observed head.
    pub async fn bootstrap(&mut self) -> Result<(), Error> {
        let metadata = self
            .admin
            .get_system_stream_metadata(std::slice::from_ref(&self.ssp.stream))
            .await?;
        let head = metadata
            .get(&self.ssp.stream)
            .and_then(|partitions| partitions.get(&self.ssp.partition))
            .map(|partition| partition.newest_offset.clone());

        self.snapshot.clear();
        self.bootstrapped = false;

        self.consumer.register(self.ssp.clone(), StartingOffset::Empty).await?;
        self.consumer.start().await?;

        let Some(head) = head else {
            // An empty stream has no newest offset: nothing to replay.
            self.bootstrapped = true;
            return Ok(());
        };

        loop {
            let envelopes = self.consumer.poll().await?;
            if envelopes.is_empty() {
                continue;
            }
            for envelope in envelopes {
                self.apply(&envelope.key, envelope.message.as_deref())?;
                if self.offset_reached.reached(&head, &envelope.offset) {
                    self.bootstrapped = true;
                }
            }
            if self.bootstrapped {
                break;
            }
        }

        self.consumer.stop().await?;
        tracing::debug!(ssp = %self.ssp, keys = self.snapshot.len(), "coordinator log bootstrap complete");
        Ok(())
    }

    fn apply(&mut self, key_bytes: &[u8], value_bytes: Option<&[u8]>) -> Result<(), Error> {
        let message = CoordinatorMessage::decode(key_bytes, value_bytes)?;
        if message.key.message_type != "SetConfig" {
            return Ok(());
        }
        match message.value {
            Some(value) => {
                let _ = self.snapshot.insert(message.key.key, value);
            }
            None => {
                let _ = self.snapshot.remove(&message.key.key);
            }
        }
        Ok(())
    }

    /// Returns the replayed configuration snapshot, or
    /// [`Error::NotBootstrapped`] if [`Self::bootstrap`] has not yet
    /// completed.
    pub fn config(&self) -> Result<&HashMap<String, serde_json::Value>, Error> {
        if !self.bootstrapped {
            return Err(Error::NotBootstrapped);
        }
        Ok(&self.snapshot)
    }
}

/// Builds the canonical `{version, type, key}` key bytes alone, without a
/// full reader, for producers writing coordinator records.
pub fn canonical_key_bytes(key: impl Into<String>) -> Result<Vec<u8>, Error> {
    CoordinatorMessageKey::set_config(key).to_canonical_bytes()
}
