//! Aggregates that remember their authors.
//!
//! Composing a span of history this way keeps who made each part of it.
//! Consecutive segments by the same creator are merged on compose, so a
//! composed history has one segment per author run.

use serde::{Deserialize, Serialize};

use super::{AggregateOperation, WaveletOp};
use crate::algebra::{OpAlgebra, OpError};
use crate::model::ParticipantId;

/// A run of change attributed to one creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoredSegment {
    pub creator: ParticipantId,
    pub op: AggregateOperation,
}

/// An ordered list of creator-tagged aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoredOperation {
    segments: Vec<AuthoredSegment>,
}

impl AuthoredOperation {
    #[must_use]
    pub fn new(creator: impl Into<ParticipantId>, op: AggregateOperation) -> Self {
        Self {
            segments: vec![AuthoredSegment {
                creator: creator.into(),
                op,
            }],
        }
    }

    /// Attribute a batch of primitive ops to `creator`.
    ///
    /// # Errors
    ///
    /// Fails when same-document ops in the batch do not chain.
    pub fn from_ops(creator: impl Into<ParticipantId>, ops: &[WaveletOp]) -> Result<Self, OpError> {
        Ok(Self::new(creator, AggregateOperation::from_ops(ops)?))
    }

    #[must_use]
    pub fn segments(&self) -> &[AuthoredSegment] {
        &self.segments
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.op.is_empty())
    }

    /// The whole change with authorship dropped.
    ///
    /// # Errors
    ///
    /// Propagates composition failures between segments.
    pub fn flatten(&self) -> Result<AggregateOperation, OpError> {
        Ok(AggregateOperation::compose_all(self.segments.iter().map(|s| &s.op))?
            .unwrap_or_default())
    }

    /// Primitive ops per creator, in application order.
    #[must_use]
    pub fn to_wavelet_ops(&self) -> Vec<(ParticipantId, Vec<WaveletOp>)> {
        self.segments
            .iter()
            .map(|s| (s.creator.clone(), s.op.to_wavelet_ops()))
            .filter(|(_, ops)| !ops.is_empty())
            .collect()
    }
}

impl OpAlgebra for AuthoredOperation {
    fn compose(&self, next: &Self) -> Result<Self, OpError> {
        let mut segments: Vec<AuthoredSegment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.iter().chain(&next.segments) {
            match segments.last_mut() {
                Some(last) if last.creator == segment.creator => {
                    last.op = last.op.compose(&segment.op)?;
                }
                _ => segments.push(segment.clone()),
            }
        }
        Ok(Self { segments })
    }

    /// Each server segment is walked through every client segment in turn,
    /// updating the client stream as it goes.
    fn transform(client: &Self, server: &Self) -> Result<(Self, Self), OpError> {
        let mut client_stream = client.segments.clone();
        let mut server_out = Vec::with_capacity(server.segments.len());

        for theirs in &server.segments {
            let mut s = theirs.op.clone();
            for ours in &mut client_stream {
                let (c, s_next) = AggregateOperation::transform(&ours.op, &s)?;
                ours.op = c;
                s = s_next;
            }
            server_out.push(AuthoredSegment {
                creator: theirs.creator.clone(),
                op: s,
            });
        }

        Ok((
            Self {
                segments: client_stream,
            },
            Self {
                segments: server_out,
            },
        ))
    }

    fn invert(&self) -> Self {
        Self {
            segments: self
                .segments
                .iter()
                .rev()
                .map(|s| AuthoredSegment {
                    creator: s.creator.clone(),
                    op: s.op.invert(),
                })
                .collect(),
        }
    }
}
