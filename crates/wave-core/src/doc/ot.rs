//! Compose and transform for document ops.
//!
//! Both walks advance two [`Pieces`] cursors in lockstep, splitting whichever
//! component is longer so every step pairs two pieces of equal span.

use super::component::{Class, Component};
use super::op::{DocOp, DocOpBuilder, Pieces};
use crate::algebra::OpError;

/// `first` followed by `second`.
///
/// Insertions in `first` that `second` deletes cancel out; the deleted content
/// must match what was inserted.
pub(crate) fn compose(first: &DocOp, second: &DocOp) -> Result<DocOp, OpError> {
    if first.output_len() != second.input_len() {
        return Err(OpError::LengthMismatch {
            context: "compose",
            expected: first.output_len(),
            actual: second.input_len(),
        });
    }

    let mut a = Pieces::new(first);
    let mut b = Pieces::new(second);
    let mut out = DocOpBuilder::new();

    loop {
        match (a.peek(), b.peek()) {
            (None, None) => break,
            // Deletions in `first` never reach `second`.
            (Some((Class::Delete, _)), _) => {
                if let Some(piece) = a.take_whole() {
                    out.push(piece);
                }
            }
            // Insertions in `second` consume nothing from `first`.
            (_, Some((Class::Insert, _))) => {
                if let Some(piece) = b.take_whole() {
                    out.push(piece);
                }
            }
            (Some((_, a_span)), Some((_, b_span))) => {
                let n = a_span.min(b_span);
                let (Some(x), Some(y)) = (a.take(n), b.take(n)) else {
                    break;
                };
                compose_pair(x, y, &mut out)?;
            }
            (None, Some(_)) | (Some(_), None) => {
                return Err(OpError::LengthMismatch {
                    context: "compose",
                    expected: first.output_len(),
                    actual: second.input_len(),
                });
            }
        }
    }

    Ok(out.build())
}

/// `x` produces items that `y` then retains or deletes.
fn compose_pair(x: Component, y: Component, out: &mut DocOpBuilder) -> Result<(), OpError> {
    match (x, y) {
        (Component::Retain(_), y) => out.push(y),
        (x, Component::Retain(_)) => out.push(x),
        (Component::Characters(s), Component::DeleteCharacters(t)) if s == t => {}
        (
            Component::ElementStart { tag, attributes },
            Component::DeleteElementStart {
                tag: deleted_tag,
                attributes: deleted_attributes,
            },
        ) if tag == deleted_tag && attributes == deleted_attributes => {}
        (Component::ElementEnd, Component::DeleteElementEnd) => {}
        (x, y) => {
            return Err(OpError::ContentMismatch {
                context: "compose",
                detail: format!("{y:?} does not match inserted {x:?}"),
            });
        }
    }
    Ok(())
}

/// Rebase `client` and `server`, both made against the same document.
///
/// Concurrent insertions at one position order the client's first. A server
/// insertion at the position of a client deletion lands before it. Deletions
/// of the same item on both sides are absorbed.
pub(crate) fn transform(client: &DocOp, server: &DocOp) -> Result<(DocOp, DocOp), OpError> {
    if client.input_len() != server.input_len() {
        return Err(OpError::LengthMismatch {
            context: "transform",
            expected: client.input_len(),
            actual: server.input_len(),
        });
    }

    let mut c = Pieces::new(client);
    let mut s = Pieces::new(server);
    let mut client_out = DocOpBuilder::new();
    let mut server_out = DocOpBuilder::new();

    loop {
        match (c.peek(), s.peek()) {
            (None, None) => break,
            (Some((Class::Insert, n)), _) => {
                if let Some(piece) = c.take_whole() {
                    client_out.push(piece);
                    server_out.push(Component::Retain(n));
                }
            }
            (_, Some((Class::Insert, n))) => {
                if let Some(piece) = s.take_whole() {
                    client_out.push(Component::Retain(n));
                    server_out.push(piece);
                }
            }
            (Some((_, c_span)), Some((_, s_span))) => {
                let n = c_span.min(s_span);
                let (Some(x), Some(y)) = (c.take(n), s.take(n)) else {
                    break;
                };
                match (&x, &y) {
                    (Component::Retain(_), Component::Retain(_)) => {
                        client_out.push(Component::Retain(n));
                        server_out.push(Component::Retain(n));
                    }
                    (_, Component::Retain(_)) => client_out.push(x),
                    (Component::Retain(_), _) => server_out.push(y),
                    _ if x == y => {}
                    _ => {
                        return Err(OpError::ContentMismatch {
                            context: "transform",
                            detail: format!("concurrent deletions disagree: {x:?} vs {y:?}"),
                        });
                    }
                }
            }
            (None, Some(_)) | (Some(_), None) => {
                return Err(OpError::LengthMismatch {
                    context: "transform",
                    expected: client.input_len(),
                    actual: server.input_len(),
                });
            }
        }
    }

    Ok((client_out.build(), server_out.build()))
}

#[cfg(test)]
mod tests {
    use crate::algebra::{OpAlgebra, OpError};
    use crate::doc::{DocOp, DocOpBuilder, Document};

    #[test]
    fn compose_cancels_deleted_insertions() {
        let a = DocOp::insert_text(2, "xyz", 4);
        let b = DocOp::delete_text(3, "y", 7);
        let ab = a.compose(&b).expect("compose");
        assert_eq!(ab, DocOp::insert_text(2, "xz", 4));
    }

    #[test]
    fn compose_rejects_length_mismatch() {
        let a = DocOp::insert_text(0, "x", 3);
        let b = DocOp::identity(3);
        let err = a.compose(&b).expect_err("lengths differ");
        assert!(matches!(err, OpError::LengthMismatch { context: "compose", .. }));
    }

    #[test]
    fn compose_rejects_wrong_deleted_content() {
        let a = DocOp::insert_text(0, "x", 0);
        let b = DocOp::delete_text(0, "q", 1);
        assert!(matches!(
            a.compose(&b),
            Err(OpError::ContentMismatch { .. })
        ));
    }

    #[test]
    fn transform_orders_client_insert_first() {
        let client = DocOp::insert_text(1, "c", 3);
        let server = DocOp::insert_text(1, "s", 3);
        let (c2, s2) = DocOp::transform(&client, &server).expect("transform");
        assert_eq!(c2, DocOp::insert_text(1, "c", 4));
        assert_eq!(s2, DocOp::insert_text(2, "s", 4));
    }

    #[test]
    fn transform_absorbs_shared_deletion() {
        let client = DocOp::delete_text(1, "b", 3);
        let server = DocOp::delete_text(1, "b", 3);
        let (c2, s2) = DocOp::transform(&client, &server).expect("transform");
        assert!(c2.is_identity());
        assert!(s2.is_identity());
        assert_eq!(c2.input_len(), 2);
    }

    #[test]
    fn transformed_ops_converge_on_a_document() {
        let base = Document::from_text("hello world");
        let client = DocOpBuilder::new()
            .retain(5)
            .delete_characters(" world")
            .characters("!")
            .build();
        let server = DocOpBuilder::new()
            .characters("Oh, ")
            .retain(6)
            .delete_characters("w")
            .characters("W")
            .retain(4)
            .build();
        let (c2, s2) = DocOp::transform(&client, &server).expect("transform");

        let mut left = base.clone();
        left.apply(&client).expect("client");
        left.apply(&s2).expect("server'");

        let mut right = base;
        right.apply(&server).expect("server");
        right.apply(&c2).expect("client'");

        assert_eq!(left, right);
        assert_eq!(left.text(), "Oh, helloW!");
    }
}
