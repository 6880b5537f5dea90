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

//! Definition of the `MessageSelector` trait and the selectors that
//! implement it: [`round_robin::RoundRobinSelector`],
//! [`batching::BatchingSelector`], [`tiered_priority::TieredPrioritySelector`]
//! and [`bootstrapping::BootstrappingSelector`].
//!
//! Selectors compose by delegation, never by inheritance: an outer selector
//! owns its inner selector as a `Box<dyn MessageSelector<K, M>>` and forwards
//! (possibly transformed) `register`/`update`/`choose` calls to it. A
//! selector instance belongs to exactly one task thread; none of its
//! operations may block or suspend.

use chooser_model::{Envelope, Ssp, StartingOffset};

pub mod batching;
pub mod bootstrapping;
pub mod round_robin;
pub mod tiered_priority;

/// Errors raised while constructing or operating a selector.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A batching selector was constructed with a non-positive batch size.
    #[error("batch size must be a positive integer, got {batch_size}")]
    InvalidBatchSize {
        /// The rejected batch size.
        batch_size: usize,
    },

    /// A tiered-priority selector was constructed without a tier selector
    /// for its own declared default tier.
    #[error("no inner selector registered for default tier {default_tier}")]
    MissingDefaultTier {
        /// The default tier that has no corresponding inner selector.
        default_tier: i64,
    },
}

/// The uniform contract implemented by every selector in the chooser stack.
///
/// `K` and `M` are the envelope's opaque key and message types; selectors
/// never inspect them, only move them.
///
/// Universal invariants (see the component design for per-selector
/// invariants on top of these):
/// - **Non-loss**: every envelope passed to `update` is eventually returned
///   by `choose`, unless `stop` is called first.
/// - **No duplication**: no envelope is ever returned twice.
/// - **Purity of choice**: `choose` only inspects internal state; calling it
///   when empty is safe and returns `None`.
pub trait MessageSelector<K, M>: Send {
    /// Declares that the consumer is about to deliver envelopes for `ssp`,
    /// starting just after `starting_offset`. Must be called once per SSP
    /// before any `update`/`choose` referring to it.
    fn register(&mut self, ssp: Ssp, starting_offset: StartingOffset);

    /// Deposits an envelope. Must not block. The caller guarantees
    /// `envelope.ssp` was already registered.
    fn update(&mut self, envelope: Envelope<K, M>);

    /// Returns the next envelope to process, or `None` if the selector
    /// currently has no acceptable choice. Must not block. A returned
    /// envelope is removed from the selector's internal state.
    fn choose(&mut self) -> Option<Envelope<K, M>>;

    /// Lifecycle hook invoked when the task starts. Recursively invoked
    /// through the selector stack. Default: no-op.
    fn start(&mut self) {}

    /// Lifecycle hook invoked when the task stops. Recursively invoked
    /// through the selector stack. After `stop` returns, no further
    /// `choose` results are defined and any pending envelopes are
    /// discarded. Default: no-op.
    fn stop(&mut self) {}
}
