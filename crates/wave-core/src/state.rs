//! Live wavelet state: participants, documents and version.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::algebra::OpError;
use crate::delta::TransformedWaveletDelta;
use crate::doc::Document;
use crate::error::ErrorCode;
use crate::model::{DocumentId, HashedVersion, ParticipantId, WaveletId};
use crate::op::{AggregateOperation, WaveletOp};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failure to apply a confirmed delta. Every variant is fatal for the wavelet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("delta applied at version {applied_at} but state is at {current}")]
    VersionGap { current: u64, applied_at: u64 },

    #[error("history hash mismatch at version {version}")]
    HashMismatch { version: u64 },

    #[error("acknowledgement for version {version} with nothing in flight")]
    UnexpectedAck { version: u64 },

    #[error(transparent)]
    Op(#[from] OpError),
}

impl ApplyError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::VersionGap { .. } | Self::HashMismatch { .. } => ErrorCode::VersionGap,
            Self::UnexpectedAck { .. } => ErrorCode::InternalUnexpected,
            Self::Op(e) => e.code(),
        }
    }
}

/// Check that `delta` continues from `current`.
///
/// Hashes are compared only when both sides carry one.
pub(crate) fn check_continuity(
    current: &HashedVersion,
    delta: &TransformedWaveletDelta,
) -> Result<(), ApplyError> {
    if delta.applied_at.version != current.version {
        return Err(ApplyError::VersionGap {
            current: current.version,
            applied_at: delta.applied_at.version,
        });
    }
    let unsigned = |v: &HashedVersion| v.hash == [0; 32];
    if !unsigned(current) && !unsigned(&delta.applied_at) && delta.applied_at.hash != current.hash
    {
        return Err(ApplyError::HashMismatch {
            version: current.version,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A wavelet's participants and documents at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveletState {
    id: WaveletId,
    version: HashedVersion,
    participants: BTreeSet<ParticipantId>,
    documents: BTreeMap<DocumentId, Document>,
}

impl WaveletState {
    /// An empty wavelet at its initial version.
    #[must_use]
    pub fn new(id: WaveletId) -> Self {
        Self {
            version: HashedVersion::initial(&id),
            id,
            participants: BTreeSet::new(),
            documents: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &WaveletId {
        &self.id
    }

    #[must_use]
    pub const fn version(&self) -> &HashedVersion {
        &self.version
    }

    #[must_use]
    pub const fn participants(&self) -> &BTreeSet<ParticipantId> {
        &self.participants
    }

    #[must_use]
    pub const fn documents(&self) -> &BTreeMap<DocumentId, Document> {
        &self.documents
    }

    #[must_use]
    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.get(id)
    }

    /// Apply one primitive op. Documents spring into existence empty.
    ///
    /// # Errors
    ///
    /// Propagates document op failures.
    pub fn apply_op(&mut self, op: &WaveletOp) -> Result<(), OpError> {
        match op {
            WaveletOp::Document { document, op } => {
                self.documents.entry(document.clone()).or_default().apply(op)
            }
            WaveletOp::AddParticipant { participant } => {
                if !self.participants.insert(participant.clone()) {
                    tracing::debug!(%participant, "participant already present");
                }
                Ok(())
            }
            WaveletOp::RemoveParticipant { participant } => {
                if !self.participants.remove(participant) {
                    tracing::debug!(%participant, "participant already absent");
                }
                Ok(())
            }
        }
    }

    /// Apply every op of an aggregate. The version is not touched.
    ///
    /// # Errors
    ///
    /// Propagates document op failures; the state must then be discarded.
    pub fn apply_aggregate(&mut self, op: &AggregateOperation) -> Result<(), OpError> {
        op.to_wavelet_ops().iter().try_for_each(|op| self.apply_op(op))
    }

    /// Apply a confirmed delta and advance to its resulting version.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::VersionGap`] for an out-of-order delta, or the
    /// first op failure.
    pub fn apply_delta(&mut self, delta: &TransformedWaveletDelta) -> Result<(), ApplyError> {
        check_continuity(&self.version, delta)?;
        for op in &delta.ops {
            self.apply_op(op)?;
        }
        self.version = delta.resulting;
        Ok(())
    }
}
