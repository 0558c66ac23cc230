//! Forward tracking of confirmed deltas.
//!
//! [`DeltaTracker`] owns three derived views of one wavelet's confirmed
//! history and feeds every delta to all of them in one step:
//!
//! - the live [`WaveletState`],
//! - the [`WaveletContributions`] overlays,
//! - the [`RevisionLog`].

use crate::contrib::WaveletContributions;
use crate::delta::TransformedWaveletDelta;
use crate::model::{HashedVersion, WaveletId};
use crate::op::AggregateOperation;
use crate::revision::{Revision, RevisionLog, RevisionScope};
use crate::state::{ApplyError, WaveletState};

#[derive(Debug, Clone)]
pub struct DeltaTracker {
    state: WaveletState,
    contributions: WaveletContributions,
    revisions: RevisionLog,
}

impl DeltaTracker {
    /// Tracking from an empty wavelet.
    #[must_use]
    pub fn new(wavelet: WaveletId, scope: RevisionScope) -> Self {
        Self {
            state: WaveletState::new(wavelet.clone()),
            contributions: WaveletContributions::new(wavelet),
            revisions: RevisionLog::new(scope),
        }
    }

    /// Resume from a snapshot and a persisted contributions record.
    ///
    /// `deltas_since` may start anywhere at or below the snapshot version; the
    /// contributions replay only what they have not seen. Revisions start
    /// fresh at the snapshot.
    ///
    /// # Errors
    ///
    /// Fails when the contributions cannot be brought to the snapshot
    /// version.
    pub fn restore<'a, I>(
        state: WaveletState,
        mut contributions: WaveletContributions,
        deltas_since: I,
        scope: RevisionScope,
    ) -> Result<Self, ApplyError>
    where
        I: IntoIterator<Item = &'a TransformedWaveletDelta>,
    {
        let target = *state.version();
        contributions.catch_up(
            deltas_since
                .into_iter()
                .take_while(|d| d.resulting.version <= target.version),
        )?;
        if contributions.version().version != target.version {
            return Err(ApplyError::VersionGap {
                current: contributions.version().version,
                applied_at: target.version,
            });
        }
        Ok(Self {
            state,
            contributions,
            revisions: RevisionLog::new(scope),
        })
    }

    #[must_use]
    pub const fn state(&self) -> &WaveletState {
        &self.state
    }

    #[must_use]
    pub const fn contributions(&self) -> &WaveletContributions {
        &self.contributions
    }

    #[must_use]
    pub const fn revisions(&self) -> &RevisionLog {
        &self.revisions
    }

    #[must_use]
    pub const fn version(&self) -> &HashedVersion {
        self.state.version()
    }

    /// Apply one confirmed delta.
    ///
    /// Returns the revision the delta finalized, if any.
    ///
    /// # Errors
    ///
    /// Version gaps and ops that do not apply are fatal. The tracker must not
    /// be used after an error.
    #[tracing::instrument(skip_all, fields(wavelet = %self.state.id(), version = delta.resulting.version))]
    pub fn apply(
        &mut self,
        delta: &TransformedWaveletDelta,
    ) -> Result<Option<Revision<AggregateOperation>>, ApplyError> {
        self.state.apply_delta(delta)?;
        self.contributions.apply(delta)?;
        let finalized = self.revisions.push(delta)?;
        tracing::debug!(author = %delta.author, ops = delta.ops.len(), "delta tracked");
        Ok(finalized)
    }

    /// Close the open revision, for example when the session ends.
    pub fn finish(&mut self) -> Option<Revision<AggregateOperation>> {
        self.revisions.finish()
    }
}
