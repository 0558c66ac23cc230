//! Document op components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Element attributes, kept sorted so equal elements compare equal.
pub type Attributes = BTreeMap<String, String>;

/// One step of a document operation.
///
/// Components walk the document left to right. `Retain` skips items,
/// insertions (`Characters`, `ElementStart`, `ElementEnd`) produce new items,
/// deletions consume existing ones and carry the content they remove so the
/// op can be inverted without the document at hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Retain(usize),
    Characters(String),
    DeleteCharacters(String),
    ElementStart {
        tag: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: Attributes,
    },
    ElementEnd,
    DeleteElementStart {
        tag: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: Attributes,
    },
    DeleteElementEnd,
}

/// Coarse classification used by the compose and transform walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Class {
    Retain,
    Insert,
    Delete,
}

impl Component {
    /// Number of existing document items this component consumes.
    #[must_use]
    pub fn input_len(&self) -> usize {
        match self {
            Self::Retain(n) => *n,
            Self::DeleteCharacters(s) => s.chars().count(),
            Self::DeleteElementStart { .. } | Self::DeleteElementEnd => 1,
            Self::Characters(_) | Self::ElementStart { .. } | Self::ElementEnd => 0,
        }
    }

    /// Number of items this component leaves in the resulting document.
    #[must_use]
    pub fn output_len(&self) -> usize {
        match self {
            Self::Retain(n) => *n,
            Self::Characters(s) => s.chars().count(),
            Self::ElementStart { .. } | Self::ElementEnd => 1,
            Self::DeleteCharacters(_) | Self::DeleteElementStart { .. } | Self::DeleteElementEnd => 0,
        }
    }

    pub(crate) const fn class(&self) -> Class {
        match self {
            Self::Retain(_) => Class::Retain,
            Self::Characters(_) | Self::ElementStart { .. } | Self::ElementEnd => Class::Insert,
            Self::DeleteCharacters(_) | Self::DeleteElementStart { .. } | Self::DeleteElementEnd => {
                Class::Delete
            }
        }
    }

    /// Items touched, on whichever side of the op the component lives.
    pub(crate) fn span(&self) -> usize {
        self.input_len().max(self.output_len())
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Self::Retain(n) => *n == 0,
            Self::Characters(s) | Self::DeleteCharacters(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Split after `at` items. Element components are indivisible.
    pub(crate) fn split(self, at: usize) -> (Self, Option<Self>) {
        match self {
            Self::Retain(n) if at < n => (Self::Retain(at), Some(Self::Retain(n - at))),
            Self::Characters(s) => {
                let (head, tail) = split_chars(s, at);
                (Self::Characters(head), tail.map(Self::Characters))
            }
            Self::DeleteCharacters(s) => {
                let (head, tail) = split_chars(s, at);
                (Self::DeleteCharacters(head), tail.map(Self::DeleteCharacters))
            }
            other => (other, None),
        }
    }

    /// The component that undoes this one.
    #[must_use]
    pub fn invert(&self) -> Self {
        match self {
            Self::Retain(n) => Self::Retain(*n),
            Self::Characters(s) => Self::DeleteCharacters(s.clone()),
            Self::DeleteCharacters(s) => Self::Characters(s.clone()),
            Self::ElementStart { tag, attributes } => Self::DeleteElementStart {
                tag: tag.clone(),
                attributes: attributes.clone(),
            },
            Self::DeleteElementStart { tag, attributes } => Self::ElementStart {
                tag: tag.clone(),
                attributes: attributes.clone(),
            },
            Self::ElementEnd => Self::DeleteElementEnd,
            Self::DeleteElementEnd => Self::ElementEnd,
        }
    }
}

fn split_chars(mut s: String, at: usize) -> (String, Option<String>) {
    match s.char_indices().nth(at) {
        Some((byte, _)) => {
            let tail = s.split_off(byte);
            (s, Some(tail))
        }
        None => (s, None),
    }
}
