//! Forward revision grouping.

use super::{Revision, RevisionScope};
use crate::algebra::{OpAlgebra, OpError};
use crate::delta::TransformedWaveletDelta;
use crate::op::{AggregateOperation, WaveletOp};

/// Groups deltas into revisions as they are applied.
#[derive(Debug, Clone, Default)]
pub struct RevisionLog {
    scope: RevisionScope,
    finalized: Vec<Revision<AggregateOperation>>,
    open: Option<Revision<AggregateOperation>>,
}

impl RevisionLog {
    #[must_use]
    pub fn new(scope: RevisionScope) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn scope(&self) -> &RevisionScope {
        &self.scope
    }

    /// Add the next delta.
    ///
    /// Returns the revision this delta closed, if its author differs from the
    /// open revision's.
    ///
    /// # Errors
    ///
    /// Fails when the delta's ops do not compose with the open revision.
    pub fn push(
        &mut self,
        delta: &TransformedWaveletDelta,
    ) -> Result<Option<Revision<AggregateOperation>>, OpError> {
        let op = match &self.scope {
            RevisionScope::Wavelet => delta.aggregate()?,
            RevisionScope::Document(document) => {
                let ops: Vec<WaveletOp> = delta
                    .ops
                    .iter()
                    .filter(|op| op.target_document() == Some(document))
                    .cloned()
                    .collect();
                if ops.is_empty() {
                    return Ok(None);
                }
                AggregateOperation::from_ops(&ops)?
            }
        };

        if let Some(open) = self.open.as_mut()
            && open.author == delta.author
        {
            open.op = open.op.compose(&op)?;
            open.resulting = delta.resulting;
            open.timestamp = delta.timestamp;
            open.delta_count += 1;
            return Ok(None);
        }

        let next = Revision {
            index: self.finalized.len() + usize::from(self.open.is_some()),
            author: delta.author.clone(),
            applied_at: self.open.as_ref().map_or(delta.applied_at, |r| r.resulting),
            resulting: delta.resulting,
            timestamp: delta.timestamp,
            delta_count: 1,
            op,
        };
        let closed = self.open.replace(next);
        if let Some(revision) = &closed {
            tracing::debug!(
                index = revision.index,
                author = %revision.author,
                from = revision.applied_at.version,
                to = revision.resulting.version,
                "revision finalized"
            );
            self.finalized.push(revision.clone());
        }
        Ok(closed)
    }

    /// Revisions that can no longer grow.
    #[must_use]
    pub fn finalized(&self) -> &[Revision<AggregateOperation>] {
        &self.finalized
    }

    /// The revision still accepting deltas from its author.
    #[must_use]
    pub const fn open(&self) -> Option<&Revision<AggregateOperation>> {
        self.open.as_ref()
    }

    /// Every revision, oldest first, including the open one.
    pub fn revisions(&self) -> impl Iterator<Item = &Revision<AggregateOperation>> {
        self.finalized.iter().chain(self.open.as_ref())
    }

    /// Close the open revision regardless of who writes next.
    pub fn finish(&mut self) -> Option<Revision<AggregateOperation>> {
        let closed = self.open.take()?;
        self.finalized.push(closed.clone());
        Some(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::DocOp;
    use crate::model::{HashedVersion, WaveletId};

    struct Feed {
        version: HashedVersion,
        len: usize,
    }

    impl Feed {
        fn new() -> Self {
            Self {
                version: HashedVersion::initial(&WaveletId::from("w")),
                len: 0,
            }
        }

        fn edit(&mut self, author: &str, document: &str) -> TransformedWaveletDelta {
            let op = DocOp::insert_text(0, "x", self.len);
            self.len += 1;
            let delta = TransformedWaveletDelta::sequence(
                author.into(),
                self.version,
                0,
                vec![WaveletOp::document(document, op)],
            );
            self.version = delta.resulting;
            delta
        }
    }

    #[test]
    fn groups_contiguous_authors() {
        let mut feed = Feed::new();
        let mut log = RevisionLog::new(RevisionScope::Wavelet);
        let authors = ["a", "a", "b", "a", "a", "a"];
        let mut closed = Vec::new();
        for author in authors {
            if let Some(rev) = log.push(&feed.edit(author, "d")).expect("push") {
                closed.push(rev);
            }
        }
        assert_eq!(closed.len(), 2);
        let all: Vec<_> = log.revisions().collect();
        assert_eq!(all.len(), 3);
        assert_eq!(
            all.iter().map(|r| r.delta_count).collect::<Vec<_>>(),
            [2, 1, 3]
        );
        for pair in all.windows(2) {
            assert_ne!(pair[0].author, pair[1].author);
            assert_eq!(pair[0].resulting, pair[1].applied_at);
        }
        assert_eq!(
            all[2].op.doc_op(&"d".into()),
            Some(&DocOp::insert_text(0, "xxx", 3))
        );
    }

    #[test]
    fn document_scope_ignores_other_documents() {
        let mut feed = Feed::new();
        let mut log = RevisionLog::new(RevisionScope::Document("d".into()));
        log.push(&feed.edit("a", "d")).expect("push");
        let mut other = Feed {
            version: feed.version,
            len: 0,
        };
        let foreign = other.edit("b", "e");
        feed.version = foreign.resulting;
        log.push(&foreign).expect("push");
        log.push(&feed.edit("a", "d")).expect("push");
        assert_eq!(log.revisions().count(), 1);
        assert_eq!(log.open().map(|r| r.delta_count), Some(2));
    }
}
