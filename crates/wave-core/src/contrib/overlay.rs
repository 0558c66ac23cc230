//! Per-document authorship overlay.
//!
//! The overlay mirrors a document item for item as run-length spans, each
//! stamped with the participant who inserted those items. Applying a doc op
//! walks the overlay the same way the op walks the document:
//!
//! | Component | Overlay effect |
//! |---|---|
//! | retain | spans kept with their stamps |
//! | insertion | new span stamped with the op's author |
//! | deletion | covered span removed |
//!
//! Spans always partition `[0, len)`: no gaps, no empty spans, and no two
//! adjacent spans with the same stamp.

use serde::{Deserialize, Serialize};

use crate::algebra::OpError;
use crate::doc::{Component, DocOp};
use crate::model::ParticipantId;

/// A run of items sharing one author stamp. `None` marks unattributed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub len: usize,
    pub author: Option<ParticipantId>,
}

/// A half-open range `[start, end)` attributed to one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRange {
    pub start: usize,
    pub end: usize,
    pub author: Option<ParticipantId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationOverlay {
    spans: Vec<Span>,
}

impl AnnotationOverlay {
    /// An overlay for existing content of `len` items, all stamped `author`.
    #[must_use]
    pub fn new(len: usize, author: Option<ParticipantId>) -> Self {
        let mut overlay = Self::default();
        push_span(&mut overlay.spans, len, author.as_ref());
        overlay
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.iter().map(|s| s.len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    #[must_use]
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Paint `op`'s effect with `author`.
    ///
    /// # Errors
    ///
    /// Returns [`OpError::LengthMismatch`] when the op does not fit the
    /// overlay; the overlay is left unchanged.
    pub fn apply(&mut self, op: &DocOp, author: &ParticipantId) -> Result<(), OpError> {
        let len = self.len();
        if op.input_len() != len {
            return Err(OpError::LengthMismatch {
                context: "annotate",
                expected: len,
                actual: op.input_len(),
            });
        }

        let mut cursor = SpanCursor::new(&self.spans);
        let mut out = Vec::with_capacity(self.spans.len() + 2);
        for component in op.components() {
            match component {
                Component::Retain(n) => cursor.take(*n, |span| {
                    push_span(&mut out, span.len, span.author.as_ref());
                }),
                insert if insert.output_len() > 0 => {
                    push_span(&mut out, insert.output_len(), Some(author));
                }
                delete => cursor.take(delete.input_len(), |_| {}),
            }
        }

        self.spans = out;
        Ok(())
    }

    /// Attributed ranges in document order.
    #[must_use]
    pub fn ranges(&self) -> Vec<ContributionRange> {
        let mut start = 0;
        self.spans
            .iter()
            .map(|span| {
                let range = ContributionRange {
                    start,
                    end: start + span.len,
                    author: span.author.clone(),
                };
                start = range.end;
                range
            })
            .collect()
    }

    /// Author of the item at `pos`.
    #[must_use]
    pub fn author_at(&self, pos: usize) -> Option<&ParticipantId> {
        let mut start = 0;
        for span in &self.spans {
            if pos < start + span.len {
                return span.author.as_ref();
            }
            start += span.len;
        }
        None
    }
}

fn push_span(spans: &mut Vec<Span>, len: usize, author: Option<&ParticipantId>) {
    if len == 0 {
        return;
    }
    match spans.last_mut() {
        Some(last) if last.author.as_ref() == author => last.len += len,
        _ => spans.push(Span {
            len,
            author: author.cloned(),
        }),
    }
}

struct SpanCursor<'a> {
    spans: &'a [Span],
    index: usize,
    offset: usize,
}

impl<'a> SpanCursor<'a> {
    const fn new(spans: &'a [Span]) -> Self {
        Self {
            spans,
            index: 0,
            offset: 0,
        }
    }

    /// Walk `n` items, handing each covered piece to `visit`.
    fn take(&mut self, mut n: usize, mut visit: impl FnMut(Span)) {
        while n > 0 {
            let Some(span) = self.spans.get(self.index) else {
                return;
            };
            let step = (span.len - self.offset).min(n);
            visit(Span {
                len: step,
                author: span.author.clone(),
            });
            n -= step;
            self.offset += step;
            if self.offset == span.len {
                self.index += 1;
                self.offset = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::DocOpBuilder;

    fn p(id: &str) -> ParticipantId {
        ParticipantId::from(id)
    }

    #[test]
    fn insert_splits_existing_span() {
        let mut overlay = AnnotationOverlay::new(4, Some(p("a")));
        overlay
            .apply(&DocOp::insert_text(2, "xy", 4), &p("b"))
            .expect("apply");
        let authors: Vec<_> = overlay
            .ranges()
            .into_iter()
            .map(|r| (r.start, r.end, r.author.map(|a| a.to_string())))
            .collect();
        assert_eq!(
            authors,
            [
                (0, 2, Some("a".to_string())),
                (2, 4, Some("b".to_string())),
                (4, 6, Some("a".to_string())),
            ]
        );
    }

    #[test]
    fn delete_removes_stamps_and_remerges() {
        let mut overlay = AnnotationOverlay::new(2, Some(p("a")));
        overlay
            .apply(&DocOp::insert_text(1, "z", 2), &p("b"))
            .expect("insert");
        overlay
            .apply(&DocOp::delete_text(1, "z", 3), &p("c"))
            .expect("delete");
        assert_eq!(overlay.spans(), &[Span { len: 2, author: Some(p("a")) }]);
    }

    #[test]
    fn replace_stamps_new_author() {
        let mut overlay = AnnotationOverlay::new(3, None);
        let op = DocOpBuilder::new()
            .retain(1)
            .delete_characters("b")
            .characters("B")
            .retain(1)
            .build();
        overlay.apply(&op, &p("x")).expect("apply");
        assert_eq!(overlay.author_at(0), None);
        assert_eq!(overlay.author_at(1), Some(&p("x")));
        assert_eq!(overlay.author_at(3), None);
        assert_eq!(overlay.len(), 3);
    }

    #[test]
    fn mismatched_op_is_rejected() {
        let mut overlay = AnnotationOverlay::new(3, None);
        assert!(
            overlay
                .apply(&DocOp::identity(5), &p("x"))
                .is_err()
        );
        assert_eq!(overlay.len(), 3);
    }
}
