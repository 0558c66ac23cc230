//! The aggregate operation: one composable unit of wavelet change.
//!
//! # Composition
//!
//! | Part | Rule |
//! |---|---|
//! | document ops | one op per document; same-document ops compose through [`DocOp`] |
//! | roster ops | kept in order; `Add(x)` followed by `Remove(x)` annihilates |
//!
//! `Remove(x)` followed by `Add(x)` does **not** annihilate: the roster
//! before and after differs when `x` was present to begin with.
//!
//! # Transform
//!
//! Document ops on a shared document transform through [`DocOp`]; ops on
//! disjoint documents pass through untouched. Identical roster ops made
//! concurrently (two `Add(x)`, or two `Remove(x)`) are dropped from both
//! results so neither side applies them twice.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ParticipantOp, WaveletOp};
use crate::algebra::{OpAlgebra, OpError};
use crate::doc::DocOp;
use crate::model::{DocumentId, ParticipantId};

/// One document's share of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEdit {
    pub document: DocumentId,
    pub op: DocOp,
}

/// Document edits and roster changes bundled into one unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateOperation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    participants: Vec<ParticipantOp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    documents: Vec<DocumentEdit>,
}

impl AggregateOperation {
    /// The empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_doc_op(document: impl Into<DocumentId>, op: DocOp) -> Self {
        Self {
            participants: Vec::new(),
            documents: vec![DocumentEdit {
                document: document.into(),
                op,
            }],
        }
    }

    #[must_use]
    pub fn add_participant(participant: impl Into<ParticipantId>) -> Self {
        Self {
            participants: vec![ParticipantOp::Add(participant.into())],
            documents: Vec::new(),
        }
    }

    #[must_use]
    pub fn remove_participant(participant: impl Into<ParticipantId>) -> Self {
        Self {
            participants: vec![ParticipantOp::Remove(participant.into())],
            documents: Vec::new(),
        }
    }

    /// Lift a single primitive op.
    #[must_use]
    pub fn from_op(op: &WaveletOp) -> Self {
        match op {
            WaveletOp::Document { document, op } => Self::from_doc_op(document.clone(), op.clone()),
            WaveletOp::AddParticipant { participant } => Self::add_participant(participant.clone()),
            WaveletOp::RemoveParticipant { participant } => {
                Self::remove_participant(participant.clone())
            }
        }
    }

    /// Compose a sequence of primitive ops into one aggregate.
    ///
    /// # Errors
    ///
    /// Fails when two ops on the same document do not chain.
    pub fn from_ops(ops: &[WaveletOp]) -> Result<Self, OpError> {
        ops.iter()
            .try_fold(Self::new(), |acc, op| acc.compose(&Self::from_op(op)))
    }

    #[must_use]
    pub fn participants(&self) -> &[ParticipantOp] {
        &self.participants
    }

    pub fn documents(&self) -> impl Iterator<Item = (&DocumentId, &DocOp)> {
        self.documents.iter().map(|e| (&e.document, &e.op))
    }

    #[must_use]
    pub fn doc_op(&self, document: &DocumentId) -> Option<&DocOp> {
        self.documents
            .iter()
            .find(|e| &e.document == document)
            .map(|e| &e.op)
    }

    /// Documents whose content this aggregate changes.
    pub fn touched_documents(&self) -> impl Iterator<Item = &DocumentId> {
        self.documents
            .iter()
            .filter(|e| !e.op.is_identity())
            .map(|e| &e.document)
    }

    /// True when applying the aggregate changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty() && self.documents.iter().all(|e| e.op.is_identity())
    }

    /// Primitive ops that reproduce this aggregate: document edits first,
    /// then roster changes. Identity document ops are omitted.
    #[must_use]
    pub fn to_wavelet_ops(&self) -> Vec<WaveletOp> {
        self.documents
            .iter()
            .filter(|e| !e.op.is_identity())
            .map(|e| WaveletOp::Document {
                document: e.document.clone(),
                op: e.op.clone(),
            })
            .chain(self.participants.iter().map(ParticipantOp::to_wavelet_op))
            .collect()
    }

    fn docs_by_id(&self) -> BTreeMap<&DocumentId, &DocOp> {
        self.documents.iter().map(|e| (&e.document, &e.op)).collect()
    }

    /// Roster ops grouped by participant, preserving per-participant order.
    fn roster_by_participant(&self) -> BTreeMap<&ParticipantId, Vec<&ParticipantOp>> {
        let mut map: BTreeMap<&ParticipantId, Vec<&ParticipantOp>> = BTreeMap::new();
        for op in &self.participants {
            map.entry(op.participant()).or_default().push(op);
        }
        map
    }
}

/// Ops on distinct documents and on distinct participants commute, so only
/// the per-document op and the per-participant sequence are significant.
impl PartialEq for AggregateOperation {
    fn eq(&self, other: &Self) -> bool {
        self.docs_by_id() == other.docs_by_id()
            && self.roster_by_participant() == other.roster_by_participant()
    }
}

impl Eq for AggregateOperation {}

impl OpAlgebra for AggregateOperation {
    fn compose(&self, next: &Self) -> Result<Self, OpError> {
        let mut participants = self.participants.clone();
        for op in &next.participants {
            let last_same = participants
                .iter()
                .rposition(|p| p.participant() == op.participant());
            let prev = last_same.map(|i| (i, participants[i].clone()));
            match (prev, op) {
                (Some((i, ParticipantOp::Add(_))), ParticipantOp::Remove(_)) => {
                    participants.remove(i);
                }
                (Some((_, prev)), op) if prev == *op => {}
                _ => participants.push(op.clone()),
            }
        }

        let mut documents = self.documents.clone();
        for edit in &next.documents {
            match documents.iter_mut().find(|e| e.document == edit.document) {
                Some(existing) => existing.op = existing.op.compose(&edit.op)?,
                None => documents.push(edit.clone()),
            }
        }

        Ok(Self {
            participants,
            documents,
        })
    }

    fn transform(client: &Self, server: &Self) -> Result<(Self, Self), OpError> {
        let (client_participants, server_participants) =
            remove_common(&client.participants, &server.participants);

        let mut client_docs = Vec::with_capacity(client.documents.len());
        let mut server_docs: Vec<DocumentEdit> = Vec::with_capacity(server.documents.len());
        for edit in &client.documents {
            match server.documents.iter().find(|s| s.document == edit.document) {
                Some(theirs) => {
                    let (c, s) = DocOp::transform(&edit.op, &theirs.op)?;
                    client_docs.push(DocumentEdit {
                        document: edit.document.clone(),
                        op: c,
                    });
                    server_docs.push(DocumentEdit {
                        document: edit.document.clone(),
                        op: s,
                    });
                }
                None => client_docs.push(edit.clone()),
            }
        }
        for edit in &server.documents {
            if !client.documents.iter().any(|c| c.document == edit.document) {
                server_docs.push(edit.clone());
            }
        }

        Ok((
            Self {
                participants: client_participants,
                documents: client_docs,
            },
            Self {
                participants: server_participants,
                documents: server_docs,
            },
        ))
    }

    fn invert(&self) -> Self {
        Self {
            participants: self.participants.iter().rev().map(ParticipantOp::invert).collect(),
            documents: self
                .documents
                .iter()
                .rev()
                .map(|e| DocumentEdit {
                    document: e.document.clone(),
                    op: e.op.invert(),
                })
                .collect(),
        }
    }
}

/// Drop roster ops that appear on both sides, matching each at most once.
fn remove_common(
    client: &[ParticipantOp],
    server: &[ParticipantOp],
) -> (Vec<ParticipantOp>, Vec<ParticipantOp>) {
    let mut server_left: Vec<Option<&ParticipantOp>> = server.iter().map(Some).collect();
    let mut client_out = Vec::with_capacity(client.len());
    for op in client {
        match server_left.iter_mut().find(|s| s.is_some_and(|s| s == op)) {
            Some(slot) => *slot = None,
            None => client_out.push(op.clone()),
        }
    }
    let server_out = server_left.into_iter().flatten().cloned().collect();
    (client_out, server_out)
}
