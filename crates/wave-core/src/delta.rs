//! Server-confirmed deltas.

use serde::{Deserialize, Serialize};

use crate::algebra::OpError;
use crate::doc::{Attributes, Component, DocOp};
use crate::model::{DocumentId, HashedVersion, ParticipantId};
use crate::op::{AggregateOperation, WaveletOp};

/// A delta as sequenced by the server: safe to apply in version order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedWaveletDelta {
    pub author: ParticipantId,
    pub applied_at: HashedVersion,
    pub resulting: HashedVersion,
    /// Milliseconds since the Unix epoch, assigned by the server.
    pub timestamp: i64,
    pub ops: Vec<WaveletOp>,
}

impl TransformedWaveletDelta {
    /// Sequence `ops` at `applied_at`, chaining the resulting hash.
    ///
    /// The version advances by one per op, and by one for a delta whose ops
    /// all transformed away, so every delta gets a distinct version.
    #[must_use]
    pub fn sequence(
        author: ParticipantId,
        applied_at: HashedVersion,
        timestamp: i64,
        ops: Vec<WaveletOp>,
    ) -> Self {
        let payload = hash_payload(&author, timestamp, &ops);
        let advance = u64::try_from(ops.len().max(1)).unwrap_or(u64::MAX);
        let resulting = applied_at.next(advance, &payload);
        Self {
            author,
            applied_at,
            resulting,
            timestamp,
            ops,
        }
    }

    /// All ops composed into one aggregate.
    ///
    /// # Errors
    ///
    /// Fails when two ops on one document do not chain.
    pub fn aggregate(&self) -> Result<AggregateOperation, OpError> {
        AggregateOperation::from_ops(&self.ops)
    }

    /// The ops that edit `document`, in order.
    pub fn doc_ops<'a>(&'a self, document: &'a DocumentId) -> impl Iterator<Item = &'a DocOp> + 'a {
        self.ops.iter().filter_map(move |op| match op {
            WaveletOp::Document { document: d, op } if d == document => Some(op),
            _ => None,
        })
    }

    #[must_use]
    pub fn touches(&self, document: &DocumentId) -> bool {
        self.doc_ops(document).next().is_some()
    }
}

// ---------------------------------------------------------------------------
// Hash payload
// ---------------------------------------------------------------------------

/// Bytes chained into the resulting version. Every variable-length field is
/// length-prefixed and every variant tagged, so distinct deltas never encode
/// to the same bytes.
fn hash_payload(author: &ParticipantId, timestamp: i64, ops: &[WaveletOp]) -> Vec<u8> {
    let mut out = Vec::new();
    put_str(&mut out, author.as_str());
    out.extend_from_slice(&timestamp.to_le_bytes());
    put_len(&mut out, ops.len());
    for op in ops {
        match op {
            WaveletOp::Document { document, op } => {
                out.push(0);
                put_str(&mut out, document.as_str());
                put_len(&mut out, op.components().len());
                for component in op.components() {
                    put_component(&mut out, component);
                }
            }
            WaveletOp::AddParticipant { participant } => {
                out.push(1);
                put_str(&mut out, participant.as_str());
            }
            WaveletOp::RemoveParticipant { participant } => {
                out.push(2);
                put_str(&mut out, participant.as_str());
            }
        }
    }
    out
}

fn put_component(out: &mut Vec<u8>, component: &Component) {
    match component {
        Component::Retain(n) => {
            out.push(0);
            put_len(out, *n);
        }
        Component::Characters(text) => {
            out.push(1);
            put_str(out, text);
        }
        Component::DeleteCharacters(text) => {
            out.push(2);
            put_str(out, text);
        }
        Component::ElementStart { tag, attributes } => {
            out.push(3);
            put_element(out, tag, attributes);
        }
        Component::ElementEnd => out.push(4),
        Component::DeleteElementStart { tag, attributes } => {
            out.push(5);
            put_element(out, tag, attributes);
        }
        Component::DeleteElementEnd => out.push(6),
    }
}

fn put_element(out: &mut Vec<u8>, tag: &str, attributes: &Attributes) {
    put_str(out, tag);
    put_len(out, attributes.len());
    for (key, value) in attributes {
        put_str(out, key);
        put_str(out, value);
    }
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&u64::try_from(len).unwrap_or(u64::MAX).to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}
