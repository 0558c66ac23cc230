//! Reference undo/redo sequences over single-document ops.
//!
//! Each op inserts or deletes one `a`. The second argument is the size of
//! the document without that `a`, so an insert and the delete that undoes
//! it take the same arguments.

use wave_core::algebra::OpAlgebra;
use wave_core::doc::DocOp;
use wave_core::undo::UndoManager;

fn insert(location: usize, size: usize) -> DocOp {
    DocOp::insert_text(location, "a", size)
}

fn delete(location: usize, size: usize) -> DocOp {
    DocOp::delete_text(location, "a", size + 1)
}

fn composed(ops: &[DocOp]) -> DocOp {
    DocOp::compose_all(ops)
        .expect("ops chain")
        .expect("non-empty")
}

fn undo(manager: &mut UndoManager<DocOp>) -> DocOp {
    manager.undo().expect("undo").expect("history")
}

fn redo(manager: &mut UndoManager<DocOp>) -> DocOp {
    manager.redo().expect("redo").expect("history")
}

/// Checkpoints that each hold several undoable ops, with remote edits
/// interleaved inside a group.
fn nondense_history() -> UndoManager<DocOp> {
    let mut m = UndoManager::new();
    m.checkpoint();
    m.undoable_op(insert(3, 10));
    m.non_undoable_op(insert(1, 11));
    m.checkpoint();
    m.undoable_op(insert(8, 12));
    m.non_undoable_op(insert(1, 13));
    m.undoable_op(insert(2, 14));
    m.non_undoable_op(insert(10, 15));
    m.undoable_op(insert(6, 16));
    m.non_undoable_op(insert(1, 17));
    m.undoable_op(delete(13, 17));
    m.undoable_op(delete(3, 16));
    m.checkpoint();
    m.undoable_op(insert(4, 16));
    m.non_undoable_op(insert(1, 17));
    m
}

#[test]
fn undo_redo() {
    let mut m = UndoManager::new();
    m.checkpoint();
    m.undoable_op(insert(3, 10));
    m.checkpoint();
    m.undoable_op(insert(5, 11));
    m.checkpoint();
    m.undoable_op(insert(4, 12));
    assert_eq!(undo(&mut m), delete(4, 12));
    assert_eq!(undo(&mut m), delete(5, 11));
    assert_eq!(undo(&mut m), delete(3, 10));
    assert_eq!(redo(&mut m), insert(3, 10));
    assert_eq!(redo(&mut m), insert(5, 11));
    assert_eq!(redo(&mut m), insert(4, 12));
    assert_eq!(undo(&mut m), delete(4, 12));
    assert_eq!(undo(&mut m), delete(5, 11));
    assert_eq!(undo(&mut m), delete(3, 10));
}

#[test]
fn undo_redo_with_non_undoable_ops() {
    let mut m = UndoManager::new();
    m.checkpoint();
    m.undoable_op(insert(3, 10));
    m.non_undoable_op(insert(1, 11));
    m.checkpoint();
    m.undoable_op(insert(5, 12));
    m.non_undoable_op(insert(1, 13));
    m.checkpoint();
    m.undoable_op(insert(4, 14));
    m.non_undoable_op(insert(1, 15));
    assert_eq!(undo(&mut m), delete(5, 15));
    assert_eq!(undo(&mut m), delete(7, 14));
    assert_eq!(undo(&mut m), delete(6, 13));
    assert_eq!(redo(&mut m), insert(6, 13));
    assert_eq!(redo(&mut m), insert(7, 14));
    assert_eq!(redo(&mut m), insert(5, 15));
}

#[test]
fn undo_redo_with_consecutive_non_undoable_ops() {
    let mut m = UndoManager::new();
    m.checkpoint();
    m.undoable_op(insert(3, 10));
    m.non_undoable_op(insert(1, 11));
    m.non_undoable_op(insert(2, 12));
    m.checkpoint();
    m.undoable_op(insert(6, 13));
    m.non_undoable_op(delete(10, 13));
    m.non_undoable_op(insert(1, 13));
    m.non_undoable_op(insert(10, 14));
    m.checkpoint();
    m.undoable_op(insert(5, 15));
    m.non_undoable_op(insert(1, 16));
    assert_eq!(undo(&mut m), delete(6, 16));
    assert_eq!(undo(&mut m), delete(8, 15));
    assert_eq!(undo(&mut m), delete(7, 14));
    assert_eq!(redo(&mut m), insert(7, 14));
    assert_eq!(redo(&mut m), insert(8, 15));
    assert_eq!(redo(&mut m), insert(6, 16));
}

#[test]
fn undo_redo_interspersed_with_non_undoable_ops() {
    let mut m = UndoManager::new();
    m.checkpoint();
    m.undoable_op(insert(3, 10));
    m.non_undoable_op(insert(1, 11));
    m.checkpoint();
    m.undoable_op(insert(5, 12));
    m.non_undoable_op(insert(1, 13));
    m.checkpoint();
    m.undoable_op(insert(4, 14));
    m.non_undoable_op(insert(1, 15));
    assert_eq!(undo(&mut m), delete(5, 15));
    m.non_undoable_op(insert(1, 15));
    assert_eq!(undo(&mut m), delete(8, 15));
    m.non_undoable_op(insert(1, 15));
    assert_eq!(undo(&mut m), delete(8, 15));
    m.non_undoable_op(insert(1, 15));
    assert_eq!(redo(&mut m), insert(9, 16));
    m.non_undoable_op(insert(1, 17));
    assert_eq!(redo(&mut m), insert(11, 18));
    m.non_undoable_op(insert(1, 19));
    assert_eq!(redo(&mut m), insert(10, 20));
}

#[test]
fn undo_redo_with_nondense_checkpointing() {
    let mut m = nondense_history();
    assert_eq!(undo(&mut m), delete(5, 17));
    assert_eq!(undo(&mut m), delete(7, 16));
    assert_eq!(undo(&mut m), delete(7, 15));
    assert_eq!(redo(&mut m), insert(7, 15));
    assert_eq!(redo(&mut m), insert(7, 16));
    assert_eq!(redo(&mut m), insert(5, 17));
}

#[test]
fn undo_redo_with_nondense_checkpoints_interspersed_with_non_undoable_ops() {
    let mut m = nondense_history();
    assert_eq!(undo(&mut m), delete(5, 17));
    m.non_undoable_op(insert(1, 17));
    assert_eq!(undo(&mut m), delete(8, 17));
    m.non_undoable_op(insert(1, 17));
    assert_eq!(undo(&mut m), delete(9, 17));
    m.non_undoable_op(insert(1, 17));
    assert_eq!(redo(&mut m), insert(10, 18));
    m.non_undoable_op(insert(1, 19));
    assert_eq!(redo(&mut m), insert(11, 20));
    m.non_undoable_op(insert(1, 21));
    assert_eq!(redo(&mut m), insert(10, 22));
}

#[test]
fn plus_methods_return_transformed_trailing_ops() {
    let mut m = nondense_history();

    let (op, trailing) = m.undo_plus().expect("undo").expect("history");
    assert_eq!(op, delete(5, 17));
    assert_eq!(trailing, Some(composed(&[insert(1, 16)])));
    m.non_undoable_op(insert(1, 17));

    let (op, trailing) = m.undo_plus().expect("undo").expect("history");
    assert_eq!(op, delete(8, 17));
    assert_eq!(
        trailing,
        Some(composed(&[
            insert(1, 12),
            insert(9, 13),
            insert(1, 14),
            insert(1, 15),
            insert(1, 16),
        ]))
    );
    m.non_undoable_op(insert(1, 17));

    let (op, trailing) = m.undo_plus().expect("undo").expect("history");
    assert_eq!(op, delete(9, 17));
    assert_eq!(
        trailing,
        Some(composed(&[
            insert(1, 10),
            insert(1, 11),
            insert(8, 12),
            insert(1, 13),
            insert(1, 14),
            insert(1, 15),
            insert(1, 16),
        ]))
    );
    m.non_undoable_op(insert(1, 17));

    let (op, trailing) = m.redo_plus().expect("redo").expect("history");
    assert_eq!(op, insert(10, 18));
    assert_eq!(trailing, Some(composed(&[insert(1, 18)])));
    m.non_undoable_op(insert(1, 19));

    let (op, trailing) = m.redo_plus().expect("redo").expect("history");
    assert_eq!(op, insert(11, 20));
    assert_eq!(
        trailing,
        Some(composed(&[insert(1, 18), insert(1, 19), insert(1, 20)]))
    );
    m.non_undoable_op(insert(1, 21));

    let (op, trailing) = m.redo_plus().expect("redo").expect("history");
    assert_eq!(op, insert(10, 22));
    assert_eq!(
        trailing,
        Some(composed(&[
            insert(1, 18),
            insert(1, 19),
            insert(1, 20),
            insert(1, 21),
            insert(1, 22),
        ]))
    );
}
