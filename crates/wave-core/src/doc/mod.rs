//! Document operations: the leaf of the algebra.
//!
//! A document is a flat sequence of items (characters and element
//! boundaries). A [`DocOp`] walks the whole sequence once, so every op knows
//! the exact length of the document it applies to and the one it produces.
//! Compose and transform enforce those lengths; see [`crate::algebra`].

pub mod component;
pub mod op;
mod ot;

pub use component::{Attributes, Component};
pub use op::{DocOp, DocOpBuilder};

use serde::{Deserialize, Serialize};

use crate::algebra::OpError;

/// One addressable position in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Item {
    Char(char),
    Start { tag: String, attributes: Attributes },
    End,
}

/// A document's content as a flat item sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    items: Vec<Item>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self {
            items: text.chars().map(Item::Char).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// The character content, ignoring element boundaries.
    #[must_use]
    pub fn text(&self) -> String {
        self.items
            .iter()
            .filter_map(|item| match item {
                Item::Char(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    /// The op that builds this document from nothing.
    #[must_use]
    pub fn to_initialization(&self) -> DocOp {
        self.items
            .iter()
            .map(|item| match item {
                Item::Char(c) => Component::Characters(c.to_string()),
                Item::Start { tag, attributes } => Component::ElementStart {
                    tag: tag.clone(),
                    attributes: attributes.clone(),
                },
                Item::End => Component::ElementEnd,
            })
            .collect()
    }

    /// Apply `op` in place. On error the document is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`OpError::LengthMismatch`] if the op was built for a document
    /// of a different length, or [`OpError::ContentMismatch`] if a deletion
    /// names content that is not present.
    pub fn apply(&mut self, op: &DocOp) -> Result<(), OpError> {
        if op.input_len() != self.items.len() {
            return Err(OpError::LengthMismatch {
                context: "apply",
                expected: self.items.len(),
                actual: op.input_len(),
            });
        }

        let old = &self.items;
        let mut pos = 0;
        let mut out = Vec::with_capacity(op.output_len());

        for component in op.components() {
            match component {
                Component::Retain(n) => {
                    out.extend_from_slice(&old[pos..pos + n]);
                    pos += n;
                }
                Component::Characters(s) => out.extend(s.chars().map(Item::Char)),
                Component::ElementStart { tag, attributes } => out.push(Item::Start {
                    tag: tag.clone(),
                    attributes: attributes.clone(),
                }),
                Component::ElementEnd => out.push(Item::End),
                Component::DeleteCharacters(s) => {
                    for c in s.chars() {
                        expect_item(old, pos, &Item::Char(c))?;
                        pos += 1;
                    }
                }
                Component::DeleteElementStart { tag, attributes } => {
                    let expected = Item::Start {
                        tag: tag.clone(),
                        attributes: attributes.clone(),
                    };
                    expect_item(old, pos, &expected)?;
                    pos += 1;
                }
                Component::DeleteElementEnd => {
                    expect_item(old, pos, &Item::End)?;
                    pos += 1;
                }
            }
        }

        self.items = out;
        Ok(())
    }
}

fn expect_item(items: &[Item], pos: usize, expected: &Item) -> Result<(), OpError> {
    match items.get(pos) {
        Some(found) if found == expected => Ok(()),
        found => Err(OpError::ContentMismatch {
            context: "apply",
            detail: format!("expected {expected:?} at {pos}, found {found:?}"),
        }),
    }
}
