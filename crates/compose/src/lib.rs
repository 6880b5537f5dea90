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

//! Reads chooser configuration and assembles a selector stack from it:
//! `Bootstrap(Batching(Priority(RoundRobin)))`, with each layer present only
//! if its configuration section is non-empty.

use std::collections::{BTreeMap, HashMap, HashSet};

use chooser_model::{Offset, Ssp};
use selector::{batching::BatchingSelector, bootstrapping::BootstrappingSelector, round_robin::RoundRobinSelector, tiered_priority::TieredPrioritySelector, MessageSelector};
use serde::Deserialize;
use stream_io::Admin;
use validator::Validate;

/// The tier assigned to a stream with no explicit `priorities` entry.
pub const DEFAULT_TIER: i64 = 0;

/// The tier assigned to a bootstrap stream with no explicit `priorities`
/// override.
pub const BOOTSTRAP_TIER: i64 = i64::MAX;

/// Errors raised while composing a selector stack from configuration.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A layer's own constructor rejected its configuration.
    #[error("selector configuration rejected: {0}")]
    Selector(#[from] selector::Error),

    /// The admin client failed while resolving bootstrap targets.
    #[error("stream I/O error while resolving bootstrap targets: {0}")]
    StreamIo(#[from] stream_io::Error),

    /// A bootstrap-flagged stream-partition has no corresponding entry in
    /// the admin interface's metadata response. Fatal at composition time.
    #[error("bootstrap stream '{system}.{stream}' partition {partition} could not be resolved through the admin interface")]
    UnresolvedBootstrapStream {
        /// The messaging system the stream belongs to.
        system: String,
        /// The unresolved stream name.
        stream: String,
        /// The unresolved partition index.
        partition: u32,
    },
}

/// Recognized `task.chooser.*` configuration, as replayed from the
/// coordinator log or supplied directly.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ChooserConfig {
    /// `task.chooser.batch.size` — enables the batching layer with this
    /// size when present.
    #[validate(range(min = 1))]
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// `task.chooser.priorities.<system>.<stream>` — explicit tier
    /// assignment per stream, keyed system → stream → tier.
    #[serde(default)]
    pub priorities: HashMap<String, HashMap<String, i64>>,

    /// `task.chooser.bootstrap.<system>.<stream>` — marks a stream as a
    /// bootstrap stream, keyed system → stream → flag.
    #[serde(default)]
    pub bootstrap: HashMap<String, HashMap<String, bool>>,
}

/// Produces a fresh tie-breaker selector instance for one priority tier.
///
/// Called once per distinct tier present in the composed configuration, so
/// every tier gets its own independent selector state.
pub trait SelectorFactory<K, M>: Send {
    /// Creates a new, empty selector instance.
    fn create(&self) -> Box<dyn MessageSelector<K, M>>;
}

/// The default factory: every tier gets a plain [`RoundRobinSelector`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobinFactory;

impl<K, M> SelectorFactory<K, M> for RoundRobinFactory
where
    K: Send + 'static,
    M: Send + 'static,
{
    fn create(&self) -> Box<dyn MessageSelector<K, M>> {
        Box::new(RoundRobinSelector::new())
    }
}

fn resolve_stream_tiers(config: &ChooserConfig, registered_ssps: &[Ssp]) -> (HashMap<String, i64>, HashSet<(String, String)>) {
    let mut stream_tier: HashMap<String, i64> = HashMap::new();
    for ssp in registered_ssps {
        let _ = stream_tier.entry(ssp.stream.clone()).or_insert(DEFAULT_TIER);
    }

    let mut bootstrap_streams = HashSet::new();
    for (system, streams) in &config.bootstrap {
        for (stream, &flagged) in streams {
            if flagged {
                let _ = stream_tier.insert(stream.clone(), BOOTSTRAP_TIER);
                let _ = bootstrap_streams.insert((system.clone(), stream.clone()));
            }
        }
    }

    for streams in config.priorities.values() {
        for (stream, &tier) in streams {
            let _ = stream_tier.insert(stream.clone(), tier);
        }
    }

    (stream_tier, bootstrap_streams)
}

async fn resolve_bootstrap_targets<A: Admin>(
    bootstrap_streams: &HashSet<(String, String)>,
    registered_ssps: &[Ssp],
    admin: &mut A,
) -> Result<HashMap<Ssp, Offset>, Error> {
    let mut targets = HashMap::new();
    if bootstrap_streams.is_empty() {
        return Ok(targets);
    }

    let stream_names: Vec<String> = bootstrap_streams.iter().map(|(_, stream)| stream.clone()).collect();
    let metadata = admin.get_system_stream_metadata(&stream_names).await?;

    for ssp in registered_ssps {
        if !bootstrap_streams.contains(&(ssp.system.clone(), ssp.stream.clone())) {
            continue;
        }
        let partition = metadata
            .get(&ssp.stream)
            .and_then(|partitions| partitions.get(&ssp.partition))
            .ok_or_else(|| Error::UnresolvedBootstrapStream {
                system: ssp.system.clone(),
                stream: ssp.stream.clone(),
                partition: ssp.partition,
            })?;
        let _ = targets.insert(ssp.clone(), partition.newest_offset.clone());
    }

    Ok(targets)
}

/// Assembles a selector stack from `config`, one tie-breaker per distinct
/// priority tier produced by `factory`, and (if any bootstrap stream is
/// configured) bootstrap targets resolved through `admin`.
///
/// `registered_ssps` is the full set of stream-partitions the task will
/// register interest in; it determines which streams receive the default
/// tier and which bootstrap-flagged streams need admin resolution.
pub async fn compose<K, M, F, A>(
    config: &ChooserConfig,
    registered_ssps: &[Ssp],
    factory: &F,
    admin: &mut A,
) -> Result<Box<dyn MessageSelector<K, M>>, Error>
where
    K: Send + 'static,
    M: Send + 'static,
    F: SelectorFactory<K, M> + ?Sized,
    A: Admin,
{
    let (stream_tier, bootstrap_streams) = resolve_stream_tiers(config, registered_ssps);
    let bootstrap_targets = resolve_bootstrap_targets(&bootstrap_streams, registered_ssps, admin).await?;

    let mut distinct_tiers: HashSet<i64> = stream_tier.values().copied().collect();
    let _ = distinct_tiers.insert(DEFAULT_TIER);

    let mut tiers: BTreeMap<i64, Box<dyn MessageSelector<K, M>>> = BTreeMap::new();
    for tier in distinct_tiers {
        let _ = tiers.insert(tier, factory.create());
    }

    let build_priority_layer = tiers.len() > 1 || !bootstrap_targets.is_empty();
    let mut stack: Box<dyn MessageSelector<K, M>> = if build_priority_layer {
        Box::new(TieredPrioritySelector::new(tiers, stream_tier, DEFAULT_TIER)?)
    } else {
        tiers
            .remove(&DEFAULT_TIER)
            .expect("distinct_tiers always contains DEFAULT_TIER")
    };

    if let Some(batch_size) = config.batch_size {
        stack = Box::new(BatchingSelector::new(stack, batch_size)?);
        tracing::debug!(batch_size, "composed batching layer");
    }

    if !bootstrap_targets.is_empty() {
        tracing::debug!(targets = bootstrap_targets.len(), "composed bootstrapping layer");
        stack = Box::new(BootstrappingSelector::new(stack, bootstrap_targets));
    }

    Ok(stack)
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chooser_model::{Envelope, StartingOffset};
    use stream_io::PartitionMetadata;

    use super::*;

    struct FakeAdmin {
        metadata: HashMap<String, HashMap<u32, PartitionMetadata>>,
    }

    #[async_trait]
    impl Admin for FakeAdmin {
        async fn get_system_stream_metadata(
            &mut self,
            stream_names: &[String],
        ) -> Result<HashMap<String, HashMap<u32, PartitionMetadata>>, stream_io::Error> {
            Ok(stream_names
                .iter()
                .filter_map(|name| self.metadata.get(name).map(|meta| (name.clone(), meta.clone())))
                .collect())
        }

        async fn get_offsets_after(
            &mut self,
            _offsets: &HashMap<Ssp, Offset>,
        ) -> Result<HashMap<Ssp, Offset>, stream_io::Error> {
            Ok(HashMap::new())
        }
    }

    fn envelope(ssp: Ssp, offset: &str) -> Envelope<&'static str, &'static str> {
        Envelope::new(ssp, "key", "msg", Offset::new(offset))
    }

    #[tokio::test]
    async fn no_configuration_yields_bare_round_robin() {
        let config = ChooserConfig::default();
        let registered = vec![Ssp::new("kafka", "orders", 0)];
        let mut admin = FakeAdmin { metadata: HashMap::new() };
        let mut stack = compose::<&str, &str, _, _>(&config, &registered, &RoundRobinFactory, &mut admin)
            .await
            .unwrap();

        stack.register(registered[0].clone(), StartingOffset::Empty);
        stack.update(envelope(registered[0].clone(), "1"));
        assert_eq!(stack.choose().unwrap().offset, Offset::new("1"));
    }

    #[tokio::test]
    async fn explicit_priority_outranks_bootstrap_default() {
        let mut priorities = HashMap::new();
        let mut streams = HashMap::new();
        let _ = streams.insert("orders".to_string(), 0_i64);
        let _ = priorities.insert("kafka".to_string(), streams);

        let mut bootstrap = HashMap::new();
        let mut bootstrap_streams = HashMap::new();
        let _ = bootstrap_streams.insert("orders".to_string(), true);
        let _ = bootstrap.insert("kafka".to_string(), bootstrap_streams);

        let config = ChooserConfig {
            batch_size: None,
            priorities,
            bootstrap,
        };

        let ssp = Ssp::new("kafka", "orders", 0);
        let mut partitions = HashMap::new();
        let _ = partitions.insert(
            0,
            PartitionMetadata {
                oldest_offset: Offset::new("0"),
                newest_offset: Offset::new("5"),
                upcoming_offset: Offset::new("6"),
            },
        );
        let mut metadata = HashMap::new();
        let _ = metadata.insert("orders".to_string(), partitions);
        let mut admin = FakeAdmin { metadata };

        let registered = vec![ssp.clone()];
        let mut stack = compose::<&str, &str, _, _>(&config, &registered, &RoundRobinFactory, &mut admin)
            .await
            .unwrap();

        // The explicit priority pins "orders" back to tier 0, but the
        // stream is still a bootstrap target (offset "5"), so the gate
        // should still hold until an envelope at that offset is chosen.
        stack.register(ssp.clone(), StartingOffset::Empty);
        stack.update(envelope(ssp.clone(), "5"));
        assert_eq!(stack.choose().unwrap().offset, Offset::new("5"));
    }

    #[tokio::test]
    async fn unresolved_bootstrap_stream_is_fatal() {
        let mut bootstrap = HashMap::new();
        let mut bootstrap_streams = HashMap::new();
        let _ = bootstrap_streams.insert("orders".to_string(), true);
        let _ = bootstrap.insert("kafka".to_string(), bootstrap_streams);
        let config = ChooserConfig {
            batch_size: None,
            priorities: HashMap::new(),
            bootstrap,
        };

        let registered = vec![Ssp::new("kafka", "orders", 0)];
        let mut admin = FakeAdmin { metadata: HashMap::new() };
        let error = compose::<&str, &str, _, _>(&config, &registered, &RoundRobinFactory, &mut admin)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::UnresolvedBootstrapStream { .. }));
    }

    #[tokio::test]
    async fn batch_size_enables_batching_layer() {
        let config = ChooserConfig {
            batch_size: Some(2),
            priorities: HashMap::new(),
            bootstrap: HashMap::new(),
        };
        let ssp = Ssp::new("kafka", "orders", 0);
        let registered = vec![ssp.clone()];
        let mut admin = FakeAdmin { metadata: HashMap::new() };
        let mut stack = compose::<&str, &str, _, _>(&config, &registered, &RoundRobinFactory, &mut admin)
            .await
            .unwrap();

        stack.register(ssp.clone(), StartingOffset::Empty);
        for offset in ["1", "2", "3"] {
            stack.update(envelope(ssp.clone(), offset));
        }
        assert_eq!(stack.choose().unwrap().offset, Offset::new("1"));
        assert_eq!(stack.choose().unwrap().offset, Offset::new("2"));
        assert_eq!(stack.choose().unwrap().offset, Offset::new("3"));
        assert!(stack.choose().is_none());
    }
}
