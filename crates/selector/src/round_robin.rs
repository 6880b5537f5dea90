//! The baseline tie-breaker selector: a plain FIFO.

use std::collections::{HashSet, VecDeque};

use chooser_model::{Envelope, Ssp, StartingOffset};

use crate::MessageSelector;

/// Returns envelopes in the exact order they were deposited via `update`,
/// regardless of which SSP they belong to. Every outer selector in this
/// crate relies on this arrival-order fairness as its own tie-breaker.
///
/// Being the innermost selector in every stack this crate composes, it is
/// also the last line of defense against the `ProtocolError` case: an
/// `update` for an SSP that was never `register`ed is logged and dropped
/// rather than silently folded into arrival order.
#[derive(Debug)]
pub struct RoundRobinSelector<K, M> {
    queue: VecDeque<Envelope<K, M>>,
    registered: HashSet<Ssp>,
}

impl<K, M> Default for RoundRobinSelector<K, M> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            registered: HashSet::new(),
        }
    }
}

impl<K, M> RoundRobinSelector<K, M> {
    /// Creates an empty round-robin selector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, M> MessageSelector<K, M> for RoundRobinSelector<K, M>
where
    K: Send,
    M: Send,
{
    fn register(&mut self, ssp: Ssp, _starting_offset: StartingOffset) {
        let _ = self.registered.insert(ssp);
    }

    fn update(&mut self, envelope: Envelope<K, M>) {
        if !self.registered.contains(&envelope.ssp) {
            let error = chooser_model::Error::UnregisteredSsp { ssp: envelope.ssp.clone() };
            tracing::warn!(error = %error, "dropping update");
            return;
        }
        self.queue.push_back(envelope);
    }

    fn choose(&mut self) -> Option<Envelope<K, M>> {
        self.queue.pop_front()
    }

    fn stop(&mut self) {
        let dropped = self.queue.len();
        if dropped > 0 {
            tracing::trace!(dropped, "round-robin selector stopped with pending envelopes");
        }
        self.queue.clear();
    }
}

#[cfg(test)]
mod test {
    use chooser_model::{Offset, Ssp, StartingOffset};

    use super::*;

    fn ssp(partition: u32) -> Ssp {
        Ssp::new("kafka", "orders", partition)
    }

    fn envelope(ssp: Ssp, offset: &str) -> Envelope<&'static str, &'static str> {
        Envelope::new(ssp, "key", "msg", Offset::new(offset))
    }

    #[test]
    fn fifo_order_across_ssps() {
        let mut selector = RoundRobinSelector::new();
        selector.register(ssp(0), StartingOffset::Empty);
        selector.register(ssp(1), StartingOffset::Empty);

        selector.update(envelope(ssp(0), "1"));
        selector.update(envelope(ssp(1), "1"));
        selector.update(envelope(ssp(0), "2"));

        assert_eq!(selector.choose().unwrap().offset, Offset::new("1"));
        // first (1) belongs to ssp(0); next in arrival order is ssp(1)'s envelope.
        assert_eq!(selector.choose().unwrap().ssp, ssp(1));
        assert_eq!(selector.choose().unwrap().ssp, ssp(0));
        assert!(selector.choose().is_none());
    }

    #[test]
    fn choose_on_empty_is_none() {
        let mut selector: RoundRobinSelector<&str, &str> = RoundRobinSelector::new();
        assert!(selector.choose().is_none());
    }

    #[test]
    fn stop_discards_pending_envelopes() {
        let mut selector = RoundRobinSelector::new();
        selector.register(ssp(0), StartingOffset::Empty);
        selector.update(envelope(ssp(0), "1"));
        selector.stop();
        assert!(selector.choose().is_none());
    }

    #[test]
    fn update_for_unregistered_ssp_is_dropped() {
        let mut selector = RoundRobinSelector::new();
        selector.register(ssp(0), StartingOffset::Empty);
        selector.update(envelope(ssp(1), "1")); // never registered
        assert!(selector.choose().is_none());
    }
}
