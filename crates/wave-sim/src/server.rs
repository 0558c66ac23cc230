//! The sequencing server: the single total order every client converges to.

use anyhow::{Context, Result, bail};
use wave_core::algebra::OpAlgebra;
use wave_core::delta::TransformedWaveletDelta;
use wave_core::model::{HashedVersion, ParticipantId, WaveletId};
use wave_core::op::{AggregateOperation, WaveletOp};
use wave_core::revision::RevisionScope;
use wave_core::tracker::DeltaTracker;

/// Transforms submitted client deltas past everything sequenced since their
/// base version, then applies them.
#[derive(Debug, Clone)]
pub struct SequencingServer {
    tracker: DeltaTracker,
    history: Vec<TransformedWaveletDelta>,
    clock: i64,
}

impl SequencingServer {
    #[must_use]
    pub fn new(wavelet: WaveletId) -> Self {
        Self {
            tracker: DeltaTracker::new(wavelet, RevisionScope::Wavelet),
            history: Vec::new(),
            clock: 1_700_000_000_000,
        }
    }

    #[must_use]
    pub const fn tracker(&self) -> &DeltaTracker {
        &self.tracker
    }

    #[must_use]
    pub fn history(&self) -> &[TransformedWaveletDelta] {
        &self.history
    }

    #[must_use]
    pub const fn version(&self) -> &HashedVersion {
        self.tracker.version()
    }

    /// Sequence `ops` written by `author` against `applied_at`.
    ///
    /// # Errors
    ///
    /// Fails on an unknown base version or ops that do not transform; both
    /// mean a client or the algebra is broken.
    pub fn submit(
        &mut self,
        author: &ParticipantId,
        applied_at: HashedVersion,
        ops: &[WaveletOp],
    ) -> Result<TransformedWaveletDelta> {
        let start = self.base_index(applied_at)?;
        let mut op = AggregateOperation::from_ops(ops).context("client ops do not compose")?;
        for concurrent in &self.history[start..] {
            let theirs = concurrent.aggregate()?;
            op = AggregateOperation::transform(&op, &theirs)
                .with_context(|| {
                    format!(
                        "transforming {author}'s delta past version {}",
                        concurrent.resulting
                    )
                })?
                .0;
        }

        self.clock += 1;
        let delta = TransformedWaveletDelta::sequence(
            author.clone(),
            *self.version(),
            self.clock,
            op.to_wavelet_ops(),
        );
        self.tracker.apply(&delta)?;
        tracing::debug!(
            author = %author,
            applied_at = applied_at.version,
            resulting = delta.resulting.version,
            transformed_past = self.history.len() - start,
            "delta sequenced"
        );
        self.history.push(delta.clone());
        Ok(delta)
    }

    fn base_index(&self, applied_at: HashedVersion) -> Result<usize> {
        if applied_at == *self.version() {
            return Ok(self.history.len());
        }
        match self.history.iter().position(|d| d.applied_at == applied_at) {
            Some(index) => Ok(index),
            None => bail!("unknown base version {applied_at}"),
        }
    }
}
