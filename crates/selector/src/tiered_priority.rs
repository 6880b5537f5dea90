//! A selector that routes envelopes into priority tiers, each with its own
//! inner tie-breaker selector, and always prefers the highest non-empty
//! tier.

use std::collections::{BTreeMap, HashMap};

use chooser_model::{Envelope, Ssp, StartingOffset};

use crate::{Error, MessageSelector};

/// Routes envelopes by their stream's configured tier (higher tiers are
/// preferred) into one of several inner selectors, one per tier. Streams
/// absent from the tier map fall back to `default_tier`, whose inner
/// selector therefore doubles as "the default selector for streams not
/// present in the priority map".
///
/// Tiers are stored in a `BTreeMap` keyed by tier (not a class hierarchy,
/// per the composition design), so `choose` iterates tiers in descending
/// order in O(number of tiers), bounded by configuration.
pub struct TieredPrioritySelector<K, M> {
    stream_tier: HashMap<String, i64>,
    tiers: BTreeMap<i64, Box<dyn MessageSelector<K, M>>>,
    default_tier: i64,
}

impl<K, M> TieredPrioritySelector<K, M> {
    /// Builds a tiered selector from a map of fresh per-tier inner
    /// selectors, the stream → tier assignment, and the tier to fall back
    /// to for streams absent from that assignment. Fails if `tiers` has no
    /// entry for `default_tier`.
    pub fn new(
        tiers: BTreeMap<i64, Box<dyn MessageSelector<K, M>>>,
        stream_tier: HashMap<String, i64>,
        default_tier: i64,
    ) -> Result<Self, Error> {
        if !tiers.contains_key(&default_tier) {
            return Err(Error::MissingDefaultTier { default_tier });
        }
        Ok(Self {
            stream_tier,
            tiers,
            default_tier,
        })
    }

    fn resolved_tier(&self, stream: &str) -> i64 {
        let tier = *self.stream_tier.get(stream).unwrap_or(&self.default_tier);
        if self.tiers.contains_key(&tier) {
            tier
        } else {
            self.default_tier
        }
    }
}

impl<K, M> MessageSelector<K, M> for TieredPrioritySelector<K, M>
where
    K: Send,
    M: Send,
{
    fn register(&mut self, ssp: Ssp, starting_offset: StartingOffset) {
        let tier = self.resolved_tier(&ssp.stream);
        if let Some(selector) = self.tiers.get_mut(&tier) {
            selector.register(ssp, starting_offset);
        }
    }

    fn update(&mut self, envelope: Envelope<K, M>) {
        let tier = self.resolved_tier(&envelope.ssp.stream);
        if let Some(selector) = self.tiers.get_mut(&tier) {
            selector.update(envelope);
        }
    }

    fn choose(&mut self) -> Option<Envelope<K, M>> {
        // BTreeMap iterates in ascending key order; reverse it so the
        // highest tier is inspected first.
        for (tier, selector) in self.tiers.iter_mut().rev() {
            if let Some(envelope) = selector.choose() {
                tracing::trace!(tier, ssp = %envelope.ssp, "chose envelope from tier");
                return Some(envelope);
            }
        }
        None
    }

    fn start(&mut self) {
        for selector in self.tiers.values_mut() {
            selector.start();
        }
    }

    fn stop(&mut self) {
        for selector in self.tiers.values_mut() {
            selector.stop();
        }
    }
}
