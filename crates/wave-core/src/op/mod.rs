//! Wavelet-level operations and their aggregates.
//!
//! A [`WaveletOp`] is the primitive unit a delta carries: an edit to one
//! document, or a change to the participant roster. [`AggregateOperation`]
//! bundles any number of them into a single composable unit, and
//! [`AuthoredOperation`] additionally remembers who made each run of edits.

pub mod aggregate;
pub mod authored;

pub use aggregate::AggregateOperation;
pub use authored::{AuthoredOperation, AuthoredSegment};

use serde::{Deserialize, Serialize};

use crate::doc::DocOp;
use crate::model::{DocumentId, ParticipantId};

/// A primitive operation against a wavelet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaveletOp {
    Document { document: DocumentId, op: DocOp },
    AddParticipant { participant: ParticipantId },
    RemoveParticipant { participant: ParticipantId },
}

impl WaveletOp {
    #[must_use]
    pub fn document(document: impl Into<DocumentId>, op: DocOp) -> Self {
        Self::Document {
            document: document.into(),
            op,
        }
    }

    #[must_use]
    pub fn add_participant(participant: impl Into<ParticipantId>) -> Self {
        Self::AddParticipant {
            participant: participant.into(),
        }
    }

    #[must_use]
    pub fn remove_participant(participant: impl Into<ParticipantId>) -> Self {
        Self::RemoveParticipant {
            participant: participant.into(),
        }
    }

    /// The document this op edits, if any.
    #[must_use]
    pub const fn target_document(&self) -> Option<&DocumentId> {
        match self {
            Self::Document { document, .. } => Some(document),
            _ => None,
        }
    }
}

/// A roster change inside an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "participant", rename_all = "snake_case")]
pub enum ParticipantOp {
    Add(ParticipantId),
    Remove(ParticipantId),
}

impl ParticipantOp {
    #[must_use]
    pub const fn participant(&self) -> &ParticipantId {
        match self {
            Self::Add(p) | Self::Remove(p) => p,
        }
    }

    #[must_use]
    pub fn invert(&self) -> Self {
        match self {
            Self::Add(p) => Self::Remove(p.clone()),
            Self::Remove(p) => Self::Add(p.clone()),
        }
    }

    #[must_use]
    pub fn to_wavelet_op(&self) -> WaveletOp {
        match self {
            Self::Add(p) => WaveletOp::AddParticipant {
                participant: p.clone(),
            },
            Self::Remove(p) => WaveletOp::RemoveParticipant {
                participant: p.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wavelet_op_json_is_tagged() {
        let op = WaveletOp::add_participant("bob@example.com");
        let json = serde_json::to_value(&op).expect("serialize");
        assert_eq!(json["type"], "add_participant");
        assert_eq!(json["participant"], "bob@example.com");

        let doc = WaveletOp::document("b+1", DocOp::insert_text(0, "x", 0));
        let back: WaveletOp =
            serde_json::from_value(serde_json::to_value(&doc).expect("serialize"))
                .expect("deserialize");
        assert_eq!(back, doc);
    }
}
