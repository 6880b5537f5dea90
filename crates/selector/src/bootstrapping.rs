//! A gate that forces coverage of designated bootstrap SSPs up to a target
//! offset before the inner selector is allowed to make progress.

use std::collections::{HashMap, HashSet};

use chooser_model::{Envelope, Offset, Ssp, StartingOffset};

use crate::MessageSelector;

/// Decides whether an observed offset means an SSP has caught up to its
/// bootstrap target.
///
/// The data model restricts `Offset` to equality comparison, so the default
/// [`ExactOffsetMatch`] is exact-equality-only; systems whose offsets are
/// actually numeric/monotonic may supply a comparator that also accepts
/// offsets past the target, guarding against producers that keep writing to
/// a bootstrap stream between target capture and replay completion.
pub trait OffsetReached: Send {
    /// Returns `true` if `candidate` means the SSP has reached `target`.
    fn reached(&self, target: &Offset, candidate: &Offset) -> bool;
}

/// Caught up only on byte-exact equality with the recorded target offset.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactOffsetMatch;

impl OffsetReached for ExactOffsetMatch {
    fn reached(&self, target: &Offset, candidate: &Offset) -> bool {
        target == candidate
    }
}

/// Gates `choose` until every SSP named in `bootstrap_targets` has been
/// observed at least once since the previous successful `choose`, and marks
/// an SSP caught up once its chosen envelope reaches the recorded target.
///
/// `register` and `update` always forward to the inner selector; only
/// `choose` withholds a result, so bootstrap gating never reorders or
/// delays what the inner selector sees, only what the caller receives.
pub struct BootstrappingSelector<K, M> {
    inner: Box<dyn MessageSelector<K, M>>,
    targets: HashMap<Ssp, Offset>,
    lagging: HashSet<Ssp>,
    updated_since_last_choose: HashSet<Ssp>,
    offset_reached: Box<dyn OffsetReached>,
}

impl<K, M> BootstrappingSelector<K, M> {
    /// Wraps `inner` with bootstrap gating for `bootstrap_targets`, using
    /// exact offset equality to decide "caught up".
    pub fn new(inner: Box<dyn MessageSelector<K, M>>, bootstrap_targets: HashMap<Ssp, Offset>) -> Self {
        Self::with_offset_reached(inner, bootstrap_targets, Box::new(ExactOffsetMatch))
    }

    /// As [`Self::new`], but with a caller-supplied "caught up" strategy.
    pub fn with_offset_reached(
        inner: Box<dyn MessageSelector<K, M>>,
        bootstrap_targets: HashMap<Ssp, Offset>,
        offset_reached: Box<dyn OffsetReached>,
    ) -> Self {
        let lagging = bootstrap_targets.keys().cloned().collect();
        Self {
            inner,
            targets: bootstrap_targets,
            lagging,
            updated_since_last_choose: HashSet::new(),
            offset_reached,
        }
    }

    /// Returns `true` while any bootstrap SSP has not yet reached its
    /// target offset.
    pub fn is_bootstrapping(&self) -> bool {
        !self.lagging.is_empty()
    }

    fn mark_caught_up_if_reached(&mut self, ssp: &Ssp, offset: &Offset) {
        if let Some(target) = self.targets.get(ssp) {
            if self.offset_reached.reached(target, offset) {
                let _ = self.lagging.remove(ssp);
                let _ = self.updated_since_last_choose.remove(ssp);
                tracing::debug!(ssp = %ssp, "bootstrap stream caught up");
            }
        }
    }
}

impl<K, M> MessageSelector<K, M> for BootstrappingSelector<K, M>
where
    K: Send,
    M: Send,
{
    fn register(&mut self, ssp: Ssp, starting_offset: StartingOffset) {
        if let Some(offset) = starting_offset.offset() {
            self.mark_caught_up_if_reached(&ssp, offset);
        }
        self.inner.register(ssp, starting_offset);
    }

    fn update(&mut self, envelope: Envelope<K, M>) {
        let _ = self.updated_since_last_choose.insert(envelope.ssp.clone());
        self.inner.update(envelope);
    }

    fn choose(&mut self) -> Option<Envelope<K, M>> {
        if !self.lagging.is_empty() {
            let gated = self
                .lagging
                .iter()
                .any(|ssp| !self.updated_since_last_choose.contains(ssp));
            if gated {
                tracing::trace!(lagging = self.lagging.len(), "bootstrap gate engaged");
                return None;
            }
        }

        let envelope = self.inner.choose()?;
        let _ = self.updated_since_last_choose.remove(&envelope.ssp);
        self.mark_caught_up_if_reached(&envelope.ssp, &envelope.offset);
        Some(envelope)
    }

    fn start(&mut self) {
        self.inner.start();
    }

    fn stop(&mut self) {
        self.inner.stop();
        self.lagging.clear();
        self.updated_since_last_choose.clear();
    }
}

#[cfg(test)]
mod test {
    use chooser_model::StartingOffset;

    use super::*;
    use crate::round_robin::RoundRobinSelector;

    fn ssp(stream: &str) -> Ssp {
        Ssp::new("kafka", stream, 0)
    }

    fn envelope(ssp: Ssp, offset: &str) -> Envelope<&'static str, &'static str> {
        Envelope::new(ssp, "key", "msg", Offset::new(offset))
    }

    fn inner() -> Box<RoundRobinSelector<&'static str, &'static str>> {
        Box::new(RoundRobinSelector::new())
    }

    /// S1 — Bootstrap caught up at registration.
    #[test]
    fn caught_up_at_registration_never_gates() {
        let mut targets = HashMap::new();
        let _ = targets.insert(ssp("a"), Offset::new("123"));
        let mut selector = BootstrappingSelector::new(inner(), targets);

        selector.register(ssp("a"), StartingOffset::Offset(Offset::new("123")));
        selector.register(ssp("b"), StartingOffset::Empty);
        assert!(!selector.is_bootstrapping());

        selector.update(envelope(ssp("b"), "1"));
        assert_eq!(selector.choose().unwrap().offset, Offset::new("1"));
        assert!(selector.choose().is_none());
    }

    /// S2 — Bootstrap lags then catches up.
    #[test]
    fn lagging_then_catching_up() {
        let mut targets = HashMap::new();
        let _ = targets.insert(ssp("a"), Offset::new("123"));
        let mut selector = BootstrappingSelector::new(inner(), targets);

        selector.register(ssp("a"), StartingOffset::Offset(Offset::new("1")));
        selector.register(ssp("b"), StartingOffset::Empty);

        selector.update(envelope(ssp("b"), "b1"));
        assert!(selector.choose().is_none(), "a has not been updated yet");

        selector.update(envelope(ssp("a"), "4"));
        assert_eq!(selector.choose().unwrap().offset, Offset::new("b1"));
        assert_eq!(selector.choose().unwrap().offset, Offset::new("4"));
        assert!(selector.choose().is_none());
        assert!(selector.is_bootstrapping(), "4 != 123, a still lags");

        selector.update(envelope(ssp("b"), "b2"));
        assert!(selector.choose().is_none(), "a still lags and has not been re-updated");

        selector.update(envelope(ssp("a"), "123"));
        assert_eq!(selector.choose().unwrap().offset, Offset::new("b2"));
        assert_eq!(selector.choose().unwrap().offset, Offset::new("123"));
        assert!(!selector.is_bootstrapping());
    }

    /// S3 — Two bootstrap streams both gate until each has been updated.
    #[test]
    fn two_bootstrap_streams_both_gate() {
        let mut targets = HashMap::new();
        let _ = targets.insert(ssp("a"), Offset::new("123"));
        let _ = targets.insert(ssp("b"), Offset::new("321"));
        let mut selector = BootstrappingSelector::new(inner(), targets);

        selector.register(ssp("a"), StartingOffset::Offset(Offset::new("1")));
        selector.register(ssp("b"), StartingOffset::Offset(Offset::new("1")));
        selector.register(ssp("c"), StartingOffset::Empty);

        selector.update(envelope(ssp("a"), "a1"));
        selector.update(envelope(ssp("c"), "c1"));
        assert!(selector.choose().is_none(), "b has not been updated");

        selector.update(envelope(ssp("b"), "b1"));
        // Inner round-robin arrival order: a1, c1, b1.
        assert_eq!(selector.choose().unwrap().offset, Offset::new("a1"));
    }

    #[test]
    fn stop_clears_bootstrap_state() {
        let mut targets = HashMap::new();
        let _ = targets.insert(ssp("a"), Offset::new("123"));
        let mut selector = BootstrappingSelector::new(inner(), targets);
        selector.register(ssp("a"), StartingOffset::Offset(Offset::new("1")));
        selector.stop();
        assert!(!selector.is_bootstrapping());
        assert!(selector.choose().is_none());
    }
}
