#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results,
    variant_size_differences
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! `task-chooser` is the message-selection core of a distributed
//! stream-processing task: the subsystem that decides which input envelope,
//! among many partitioned input streams, a task processes next.
//!
//! A selector stack is built by [`compose::compose`] from a
//! [`compose::ChooserConfig`] and composes up to three orthogonal policies
//! around a [`selector::round_robin::RoundRobinSelector`] baseline:
//!
//! - [`selector::tiered_priority::TieredPrioritySelector`] — strict priority
//!   across streams.
//! - [`selector::batching::BatchingSelector`] — affinity to the
//!   last-chosen stream-partition up to a batch size.
//! - [`selector::bootstrapping::BootstrappingSelector`] — gates delivery
//!   until designated streams have caught up to a target offset.
//!
//! [`coordinator_log::CoordinatorLogReader`] separately replays the
//! coordinator stream's ordered `SetConfig`/`Delete` log into the
//! configuration snapshot a [`compose::ChooserConfig`] is typically parsed
//! from. [`stream_io`] defines the abstract consumer and admin interfaces
//! both of the above are driven through; this crate never talks to a
//! messaging system directly.

pub use chooser_model;
pub use compose;
pub use coordinator_log;
pub use selector;
pub use stream_io;
