//! Checkpointed undo/redo over any [`OpAlgebra`].
//!
//! The manager keeps two stacks of recorded ops. Every entry also remembers
//! the non-undoable ops (remote edits, usually) that arrived after it, so an
//! undo can be transformed forward past everything that happened since:
//!
//! ```text
//! undo stack:   [ e1 | n1a n1b ] [ e2 | n2 ] [ e3 | ]      <- top
//! undo of e3:   invert(e3)
//! undo of e2:   transform(invert(e2), n2) -> (u2, n2')      n2' pushed onto e1
//! ```
//!
//! Checkpoints group consecutive undoable ops into one user-visible step. An
//! undo pops a whole group and composes the per-entry results; the composed
//! op goes onto the redo stack as a single entry. A redo re-enters its result
//! onto the undo stack as a group of its own.
//!
//! Recording a new undoable op clears the redo stack. Checkpoints alone do not.
//!
//! Undo or redo with nothing to revert returns `Ok(None)`.

use crate::algebra::{OpAlgebra, OpError};

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StackEntry<T> {
    op: T,
    non_undoables: Vec<T>,
}

#[derive(Debug, Clone)]
struct UndoStack<T> {
    entries: Vec<StackEntry<T>>,
}

impl<T> Default for UndoStack<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: OpAlgebra> UndoStack<T> {
    fn push(&mut self, op: T) {
        self.entries.push(StackEntry {
            op,
            non_undoables: Vec::new(),
        });
    }

    fn non_undoable_op(&mut self, op: T) {
        if let Some(top) = self.entries.last_mut() {
            top.non_undoables.push(op);
        }
    }

    /// Pop the top entry and return its inverse, transformed past the
    /// non-undoable ops recorded after it, plus those ops transformed past
    /// the inverse.
    fn pop(&mut self) -> Result<Option<(T, Option<T>)>, OpError> {
        let Some(entry) = self.entries.pop() else {
            return Ok(None);
        };
        let inverse = entry.op.invert();
        let Some(trailing) = T::compose_all(&entry.non_undoables)? else {
            return Ok(Some((inverse, None)));
        };
        let (op, trailing) = T::transform(&inverse, &trailing)?;
        if let Some(below) = self.entries.last_mut() {
            below.non_undoables.push(trailing.clone());
        }
        Ok(Some((op, Some(trailing))))
    }

    fn drop_bottom(&mut self, n: usize) {
        let n = n.min(self.entries.len());
        self.entries.drain(..n);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Checkpointer
// ---------------------------------------------------------------------------

/// Partition sizes of the undo stack: closed groups plus the open one.
#[derive(Debug, Clone, Default)]
struct Checkpointer {
    closed: Vec<usize>,
    open: usize,
}

impl Checkpointer {
    fn checkpoint(&mut self) {
        if self.open > 0 {
            self.closed.push(self.open);
            self.open = 0;
        }
    }

    fn increment(&mut self) {
        self.open += 1;
    }

    /// Size of the most recent group, removing it.
    fn release(&mut self) -> usize {
        if self.open > 0 {
            std::mem::take(&mut self.open)
        } else {
            self.closed.pop().unwrap_or(0)
        }
    }

    fn groups(&self) -> usize {
        self.closed.len() + usize::from(self.open > 0)
    }

    fn clear(&mut self) {
        self.closed.clear();
        self.open = 0;
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Undo/redo history for one editing session.
///
/// Not thread-safe: the owner serializes every call.
#[derive(Debug, Clone)]
pub struct UndoManager<T> {
    undo: UndoStack<T>,
    redo: UndoStack<T>,
    checkpointer: Checkpointer,
    max_checkpoints: Option<usize>,
}

impl<T> Default for UndoManager<T> {
    fn default() -> Self {
        Self {
            undo: UndoStack::default(),
            redo: UndoStack::default(),
            checkpointer: Checkpointer::default(),
            max_checkpoints: None,
        }
    }
}

impl<T: OpAlgebra> UndoManager<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max` undo groups; older groups are forgotten.
    #[must_use]
    pub fn with_max_checkpoints(max: Option<usize>) -> Self {
        Self {
            max_checkpoints: max,
            ..Self::default()
        }
    }

    /// Close the current group of undoable ops.
    pub fn checkpoint(&mut self) {
        self.checkpointer.checkpoint();
        self.trim();
    }

    /// Record a locally authored op that a later undo should revert.
    pub fn undoable_op(&mut self, op: T) {
        self.undo.push(op);
        self.checkpointer.increment();
        self.redo.clear();
    }

    /// Record an op that undo must preserve (typically a remote edit).
    pub fn non_undoable_op(&mut self, op: T) {
        self.undo.non_undoable_op(op.clone());
        self.redo.non_undoable_op(op);
    }

    /// Revert the most recent group.
    ///
    /// # Errors
    ///
    /// Returns [`OpError`] if the recorded ops no longer compose or transform;
    /// the history is unusable afterwards.
    pub fn undo(&mut self) -> Result<Option<T>, OpError> {
        Ok(self.undo_plus()?.map(|(op, _)| op))
    }

    /// Reapply the most recently undone group.
    ///
    /// # Errors
    ///
    /// See [`UndoManager::undo`].
    pub fn redo(&mut self) -> Result<Option<T>, OpError> {
        Ok(self.redo_plus()?.map(|(op, _)| op))
    }

    /// Like [`UndoManager::undo`], also returning the non-undoable ops that
    /// followed the reverted group, transformed to apply after the undo.
    ///
    /// # Errors
    ///
    /// See [`UndoManager::undo`].
    pub fn undo_plus(&mut self) -> Result<Option<(T, Option<T>)>, OpError> {
        let group = self.checkpointer.release();
        let mut composed: Option<T> = None;
        let mut trailing = None;
        for _ in 0..group {
            let Some((op, rest)) = self.undo.pop()? else {
                break;
            };
            composed = Some(match composed {
                Some(acc) => acc.compose(&op)?,
                None => op,
            });
            trailing = rest;
        }

        let Some(op) = composed else {
            tracing::debug!("undo requested with empty history");
            return Ok(None);
        };
        tracing::debug!(entries = group, remaining = self.undo.len(), "undo");
        self.redo.push(op.clone());
        Ok(Some((op, trailing)))
    }

    /// Like [`UndoManager::redo`], also returning the transformed trailing
    /// non-undoable ops.
    ///
    /// # Errors
    ///
    /// See [`UndoManager::undo`].
    pub fn redo_plus(&mut self) -> Result<Option<(T, Option<T>)>, OpError> {
        let Some((op, trailing)) = self.redo.pop()? else {
            tracing::debug!("redo requested with empty history");
            return Ok(None);
        };
        self.checkpointer.checkpoint();
        self.undo.push(op.clone());
        self.checkpointer.increment();
        self.checkpointer.checkpoint();
        self.trim();
        tracing::debug!(remaining = self.redo.len(), "redo");
        Ok(Some((op, trailing)))
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.undo.len() > 0 && self.checkpointer.groups() > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.redo.len() > 0
    }

    /// Forget all history.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.checkpointer.clear();
    }

    fn trim(&mut self) {
        let Some(max) = self.max_checkpoints else {
            return;
        };
        while self.checkpointer.closed.len() > max {
            let oldest = self.checkpointer.closed.remove(0);
            self.undo.drop_bottom(oldest);
            tracing::debug!(dropped = oldest, "undo history trimmed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::DocOp;

    fn insert(pos: usize, size: usize) -> DocOp {
        DocOp::insert_text(pos, "a", size)
    }

    fn delete(pos: usize, size: usize) -> DocOp {
        DocOp::delete_text(pos, "a", size)
    }

    mod aggregate {
        use super::super::UndoManager;
        use crate::doc::DocOp;
        use crate::model::{DocumentId, ParticipantId, WaveletId};
        use crate::op::{AggregateOperation, WaveletOp};
        use crate::state::WaveletState;

        fn edit(document: &str, pos: usize, text: &str, len: usize) -> WaveletOp {
            WaveletOp::document(document, DocOp::insert_text(pos, text, len))
        }

        fn apply(state: &mut WaveletState, op: &AggregateOperation) {
            state.apply_aggregate(op).expect("op applies");
        }

        fn text(state: &WaveletState, document: &str) -> String {
            state
                .document(&document.into())
                .map(crate::doc::Document::text)
                .unwrap_or_default()
        }

        fn roster(state: &WaveletState) -> Vec<&str> {
            state.participants().iter().map(ParticipantId::as_str).collect()
        }

        /// d0 = "abc", d1 = "xyz", d2 = "q", nobody on the roster.
        fn seeded() -> WaveletState {
            let mut state = WaveletState::new(WaveletId::from("example.com/w+undo"));
            let seed = AggregateOperation::from_ops(&[
                edit("d0", 0, "abc", 0),
                edit("d1", 0, "xyz", 0),
                edit("d2", 0, "q", 0),
            ])
            .expect("seed composes");
            apply(&mut state, &seed);
            state
        }

        #[test]
        fn undo_spans_documents_and_roster() {
            let mut state = seeded();
            let mut manager = UndoManager::new();
            manager.checkpoint();

            let local = AggregateOperation::from_ops(&[
                edit("d0", 3, "DE", 3),
                edit("d1", 3, "VW", 3),
                WaveletOp::add_participant("p"),
            ])
            .expect("local composes");
            apply(&mut state, &local);
            manager.undoable_op(local);

            let remote = AggregateOperation::from_ops(&[
                edit("d1", 0, "R", 5),
                edit("d2", 1, "S", 1),
                WaveletOp::add_participant("r"),
            ])
            .expect("remote composes");
            apply(&mut state, &remote);
            manager.non_undoable_op(remote);

            let (undone, trailing) = manager
                .undo_plus()
                .expect("undo")
                .expect("has history");
            assert!(undone.doc_op(&"d2".into()).is_none());
            apply(&mut state, &undone);
            assert_eq!(text(&state, "d0"), "abc");
            assert_eq!(text(&state, "d1"), "Rxyz");
            assert_eq!(text(&state, "d2"), "qS");
            assert_eq!(roster(&state), ["r"]);

            let trailing = trailing.expect("remote op survives the undo");
            let touched: Vec<&str> = trailing.touched_documents().map(DocumentId::as_str).collect();
            assert_eq!(touched, ["d1", "d2"]);
            assert_eq!(trailing.participants().len(), 1);
            assert_eq!(trailing.participants()[0].participant().as_str(), "r");

            let redone = manager.redo().expect("redo").expect("has redo");
            apply(&mut state, &redone);
            assert_eq!(text(&state, "d0"), "abcDE");
            assert_eq!(text(&state, "d1"), "RxyzVW");
            assert_eq!(text(&state, "d2"), "qS");
            assert_eq!(roster(&state), ["p", "r"]);
        }
    }

    #[test]
    fn empty_history_is_a_no_op() {
        let mut manager: UndoManager<DocOp> = UndoManager::new();
        manager.checkpoint();
        assert_eq!(manager.undo().expect("undo"), None);
        assert_eq!(manager.redo().expect("redo"), None);
        assert!(!manager.can_undo());
    }

    #[test]
    fn group_undo_composes_every_entry() {
        let mut manager = UndoManager::new();
        manager.checkpoint();
        manager.undoable_op(insert(0, 0));
        manager.undoable_op(insert(1, 1));
        let undone = manager.undo().expect("undo").expect("has op");
        assert_eq!(undone, DocOp::delete_text(0, "aa", 2));
        assert!(manager.can_redo());
    }

    #[test]
    fn new_undoable_op_clears_redo() {
        let mut manager = UndoManager::new();
        manager.checkpoint();
        manager.undoable_op(insert(0, 3));
        manager.undo().expect("undo");
        manager.checkpoint();
        assert!(manager.can_redo());
        manager.undoable_op(insert(1, 3));
        assert!(!manager.can_redo());
    }

    #[test]
    fn max_checkpoints_forgets_oldest_groups() {
        let mut manager = UndoManager::with_max_checkpoints(Some(2));
        for size in 10..14 {
            manager.undoable_op(insert(0, size));
            manager.checkpoint();
        }
        assert_eq!(manager.undo().expect("undo"), Some(delete(0, 14)));
        assert_eq!(manager.undo().expect("undo"), Some(delete(0, 13)));
        assert_eq!(manager.undo().expect("undo"), None);
    }

    #[test]
    fn checkpointer_releases_open_group_first() {
        let mut cp = Checkpointer::default();
        cp.increment();
        cp.checkpoint();
        cp.increment();
        cp.increment();
        assert_eq!(cp.groups(), 2);
        assert_eq!(cp.release(), 2);
        assert_eq!(cp.release(), 1);
        assert_eq!(cp.release(), 0);
    }
}
