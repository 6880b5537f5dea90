//! A selector that holds affinity to the last-chosen SSP up to a batch
//! size, falling back to an inner selector whenever the batch run ends.

use std::collections::{HashMap, VecDeque};

use chooser_model::{Envelope, Ssp, StartingOffset};

use crate::{Error, MessageSelector};

/// Wraps an inner selector with batch affinity: once `choose` returns an
/// envelope for SSP `s`, up to `batch_size - 1` further consecutive calls
/// prefer envelopes already buffered for `s` before the inner selector is
/// consulted again.
///
/// `update` forwards an envelope straight to the inner selector *unless*
/// its SSP is the SSP of the batch currently in progress, in which case it
/// is withheld in a local per-SSP buffer instead — while a batch run is
/// active, the inner selector must not see intra-batch envelopes for that
/// SSP, or it would reorder them relative to the rest of its own policy.
/// Every other SSP's envelopes flow straight through to the inner selector,
/// so the outer batching layer never disturbs the fairness the inner
/// selector provides between non-batching SSPs.
///
/// The `batch_size` cap holds regardless of where a repeat of the active
/// SSP comes from: once the cap is hit, `choose` also withholds further
/// same-SSP envelopes surfaced by the inner selector itself (e.g. ones that
/// arrived via `update` before this batch started and were already queued
/// there), not only ones buffered locally after the run began. A repeat is
/// only let through past the cap if probing the inner selector for a
/// competing SSP turns up nothing at all — the monopoly exception.
///
/// A batch run ends either because its buffer ran dry, because the inner
/// selector has nothing else to offer for it, or because a different SSP
/// was found while probing past the cap. In the last two cases the buffer
/// may still hold envelopes withheld from the inner selector while the run
/// was active; those are flushed back into the inner selector at the
/// moment the run ends, so they rejoin normal rotation instead of being
/// silently dropped.
pub struct BatchingSelector<K, M> {
    inner: Box<dyn MessageSelector<K, M>>,
    batch_size: usize,
    buffers: HashMap<Ssp, VecDeque<Envelope<K, M>>>,
    current_batch_ssp: Option<Ssp>,
    current_batch_count: usize,
}

impl<K, M> BatchingSelector<K, M> {
    /// Wraps `inner` with batch affinity of up to `batch_size` consecutive
    /// envelopes per SSP. Returns [`Error::InvalidBatchSize`] if
    /// `batch_size` is zero.
    pub fn new(inner: Box<dyn MessageSelector<K, M>>, batch_size: usize) -> Result<Self, Error> {
        if batch_size == 0 {
            return Err(Error::InvalidBatchSize { batch_size });
        }
        Ok(Self {
            inner,
            batch_size,
            buffers: HashMap::new(),
            current_batch_ssp: None,
            current_batch_count: 0,
        })
    }
}

impl<K, M> MessageSelector<K, M> for BatchingSelector<K, M>
where
    K: Send,
    M: Send,
{
    fn register(&mut self, ssp: Ssp, starting_offset: StartingOffset) {
        self.inner.register(ssp, starting_offset);
    }

    fn update(&mut self, envelope: Envelope<K, M>) {
        if self.current_batch_ssp.as_ref() == Some(&envelope.ssp) {
            self.buffers.entry(envelope.ssp.clone()).or_default().push_back(envelope);
        } else {
            self.inner.update(envelope);
        }
    }

    fn choose(&mut self) -> Option<Envelope<K, M>> {
        loop {
            if let Some(ssp) = self.current_batch_ssp.clone() {
                if self.current_batch_count < self.batch_size {
                    if let Some(envelope) = self.buffers.get_mut(&ssp).and_then(VecDeque::pop_front) {
                        self.current_batch_count += 1;
                        return Some(envelope);
                    }
                }
            }

            let Some(envelope) = self.inner.choose() else {
                // Inner is exhausted. If the active batch SSP still holds
                // envelopes that were withheld past `batch_size`, nothing
                // else is competing for a slot — the monopoly exception
                // applies and the run may keep going past the cap.
                if let Some(ssp) = self.current_batch_ssp.clone() {
                    if let Some(envelope) = self.buffers.get_mut(&ssp).and_then(VecDeque::pop_front) {
                        self.current_batch_count += 1;
                        return Some(envelope);
                    }
                }
                return None;
            };

            if self.current_batch_ssp.as_ref() == Some(&envelope.ssp) {
                if self.current_batch_count < self.batch_size {
                    self.current_batch_count += 1;
                    return Some(envelope);
                }
                // The cap is already reached for this run. This envelope
                // cannot extend it unless no other SSP has anything
                // pending — withhold it and keep probing the inner
                // selector for a competing SSP.
                tracing::trace!(ssp = %envelope.ssp, count = self.current_batch_count, "batch cap reached, withholding repeat");
                self.buffers.entry(envelope.ssp.clone()).or_default().push_back(envelope);
                continue;
            }

            // A different SSP won out: flush whatever the outgoing batch
            // still withheld back into the inner selector so it rejoins
            // normal rotation, then start a fresh run on the new SSP.
            if let Some(old_ssp) = self.current_batch_ssp.take() {
                tracing::trace!(ssp = %old_ssp, count = self.current_batch_count, "batch run ended, consulting inner selector");
                if let Some(remaining) = self.buffers.remove(&old_ssp) {
                    for held in remaining {
                        self.inner.update(held);
                    }
                }
            }
            self.current_batch_ssp = Some(envelope.ssp.clone());
            self.current_batch_count = 1;
            return Some(envelope);
        }
    }

    fn start(&mut self) {
        self.inner.start();
    }

    fn stop(&mut self) {
        self.inner.stop();
        self.buffers.clear();
        self.current_batch_ssp = None;
        self.current_batch_count = 0;
    }
}
