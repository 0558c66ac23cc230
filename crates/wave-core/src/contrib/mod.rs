//! Per-author contribution tracking for a whole wavelet.
//!
//! [`WaveletContributions`] keeps one [`AnnotationOverlay`] per document and
//! the version it has seen. It serializes as a plain snapshot so a storage
//! collaborator can persist it and later [`catch_up`](WaveletContributions::catch_up)
//! with the deltas applied since.

pub mod overlay;

pub use overlay::{AnnotationOverlay, ContributionRange, Span};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::delta::TransformedWaveletDelta;
use crate::model::{DocumentId, HashedVersion, WaveletId};
use crate::op::WaveletOp;
use crate::state::{ApplyError, WaveletState, check_continuity};

/// Authorship overlays for every document of a wavelet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveletContributions {
    wavelet: WaveletId,
    version: HashedVersion,
    #[serde(default)]
    documents: BTreeMap<DocumentId, AnnotationOverlay>,
}

impl WaveletContributions {
    /// Tracking from the wavelet's first version.
    #[must_use]
    pub fn new(wavelet: WaveletId) -> Self {
        Self {
            version: HashedVersion::initial(&wavelet),
            wavelet,
            documents: BTreeMap::new(),
        }
    }

    /// Tracking from a snapshot whose history is unknown: every existing
    /// item is unattributed.
    #[must_use]
    pub fn unattributed(state: &WaveletState) -> Self {
        Self {
            wavelet: state.id().clone(),
            version: *state.version(),
            documents: state
                .documents()
                .iter()
                .map(|(id, doc)| (id.clone(), AnnotationOverlay::new(doc.len(), None)))
                .collect(),
        }
    }

    #[must_use]
    pub const fn wavelet(&self) -> &WaveletId {
        &self.wavelet
    }

    #[must_use]
    pub const fn version(&self) -> &HashedVersion {
        &self.version
    }

    #[must_use]
    pub fn overlay(&self, document: &DocumentId) -> Option<&AnnotationOverlay> {
        self.documents.get(document)
    }

    pub fn overlays(&self) -> impl Iterator<Item = (&DocumentId, &AnnotationOverlay)> {
        self.documents.iter()
    }

    /// Attributed ranges of one document, empty if it was never touched.
    #[must_use]
    pub fn ranges(&self, document: &DocumentId) -> Vec<ContributionRange> {
        self.documents
            .get(document)
            .map(AnnotationOverlay::ranges)
            .unwrap_or_default()
    }

    /// Paint one delta.
    ///
    /// # Errors
    ///
    /// Out-of-order deltas and ops that do not fit an overlay are fatal.
    pub fn apply(&mut self, delta: &TransformedWaveletDelta) -> Result<(), ApplyError> {
        check_continuity(&self.version, delta)?;
        for op in &delta.ops {
            if let WaveletOp::Document { document, op } = op {
                self.documents
                    .entry(document.clone())
                    .or_default()
                    .apply(op, &delta.author)?;
            }
        }
        self.version = delta.resulting;
        Ok(())
    }

    /// Replay the deltas this snapshot has not seen yet.
    ///
    /// Deltas at or below the stored version are skipped; the rest must be
    /// contiguous. Returns how many deltas were applied.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::VersionGap`] when the first unseen delta does not
    /// start at the stored version.
    pub fn catch_up<'a, I>(&mut self, deltas: I) -> Result<usize, ApplyError>
    where
        I: IntoIterator<Item = &'a TransformedWaveletDelta>,
    {
        let mut applied = 0;
        for delta in deltas {
            if delta.resulting.version <= self.version.version {
                continue;
            }
            self.apply(delta)?;
            applied += 1;
        }
        if applied > 0 {
            tracing::debug!(
                wavelet = %self.wavelet,
                applied,
                version = self.version.version,
                "contributions caught up"
            );
        }
        Ok(applied)
    }
}
