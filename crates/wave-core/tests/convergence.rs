//! Algebraic properties of document ops and aggregates.

use proptest::prelude::*;
use wave_core::algebra::OpAlgebra;
use wave_core::doc::DocOp;
use wave_core::op::AggregateOperation;
use wave_core::undo::UndoManager;

use generators::*;

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(512))]

    #[test]
    fn doc_transform_converges(base in arb_text(), ea in arb_edits(), eb in arb_edits()) {
        let a = doc_op(&base, &ea);
        let b = doc_op(&base, &eb);
        let (a2, b2) = DocOp::transform(&a, &b).expect("same base");

        let left = a.compose(&b2).expect("a then b'");
        let right = b.compose(&a2).expect("b then a'");
        prop_assert_eq!(left.output_len(), right.output_len());
        prop_assert_eq!(apply_text(&base, &left), apply_text(&base, &right));
    }

    #[test]
    fn doc_compose_matches_sequential_apply(base in arb_text(), ea in arb_edits(), eb in arb_edits()) {
        let a = doc_op(&base, &ea);
        let mid = apply_text(&base, &a);
        let b = doc_op(&mid, &eb);
        let ab = a.compose(&b).expect("chained ops compose");
        prop_assert_eq!(apply_text(&base, &ab), apply_text(&mid, &b));
    }

    #[test]
    fn doc_invert_reverts_and_is_involution(base in arb_text(), edits in arb_edits()) {
        let op = doc_op(&base, &edits);
        let after = apply_text(&base, &op);
        prop_assert_eq!(apply_text(&after, &op.invert()), base);
        prop_assert_eq!(op.invert().invert(), op);
    }

    #[test]
    fn aggregate_transform_converges(case in arb_concurrent()) {
        let (client2, server2) =
            AggregateOperation::transform(&case.client, &case.server).expect("same base");

        let mut left = case.base_state();
        left.apply_aggregate(&case.client).expect("client applies");
        left.apply_aggregate(&server2).expect("server' applies");

        let mut right = case.base_state();
        right.apply_aggregate(&case.server).expect("server applies");
        right.apply_aggregate(&client2).expect("client' applies");

        prop_assert_eq!(left.documents(), right.documents());
        prop_assert_eq!(left.participants(), right.participants());
    }

    #[test]
    fn aggregate_invert_is_involution(case in arb_concurrent()) {
        prop_assert_eq!(case.client.invert().invert(), case.client);
    }

    #[test]
    fn aggregate_invert_restores_documents(case in arb_concurrent()) {
        let base = case.base_state();
        let mut state = base.clone();
        state.apply_aggregate(&case.client).expect("client applies");
        state.apply_aggregate(&case.client.invert()).expect("inverse applies");
        prop_assert_eq!(state.documents(), base.documents());
    }

    #[test]
    fn undo_then_redo_walks_checkpoints(
        base in arb_text(),
        groups in prop::collection::vec(prop::collection::vec(arb_edits(), 1..4), 1..5),
        undos in 1usize..6,
    ) {
        let mut manager = UndoManager::<DocOp>::new();
        let mut text = base;
        let mut snapshots = vec![text.clone()];
        for group in &groups {
            for edits in group {
                let op = doc_op(&text, edits);
                text = apply_text(&text, &op);
                manager.undoable_op(op);
            }
            manager.checkpoint();
            snapshots.push(text.clone());
        }

        let undos = undos.min(groups.len());
        for k in 1..=undos {
            let op = manager.undo().expect("undo").expect("group available");
            text = apply_text(&text, &op);
            prop_assert_eq!(&text, &snapshots[groups.len() - k]);
        }
        for k in (groups.len() - undos + 1)..=groups.len() {
            let op = manager.redo().expect("redo").expect("undone group available");
            text = apply_text(&text, &op);
            prop_assert_eq!(&text, &snapshots[k]);
        }
        prop_assert!(!manager.can_redo());
    }
}
