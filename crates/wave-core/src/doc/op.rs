//! Normalized document operations and their builder.

use serde::{Deserialize, Serialize};

use super::component::{Attributes, Class, Component};
use crate::algebra::{OpAlgebra, OpError};

/// A full-length operation over one document.
///
/// The component list is always normalized: empty components are dropped,
/// adjacent components of the same kind are merged, and within each gap
/// between retains the deletions come before the insertions. Two ops with the
/// same effect on every document therefore compare equal whenever their
/// structure agrees, which keeps syntactic comparisons in tests meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Component>", into = "Vec<Component>")]
pub struct DocOp {
    components: Vec<Component>,
}

impl DocOp {
    /// The op that changes nothing in a document of `len` items.
    #[must_use]
    pub fn identity(len: usize) -> Self {
        DocOpBuilder::new().retain(len).build()
    }

    /// Insert `text` at `pos` in a document of `len` items.
    #[must_use]
    pub fn insert_text(pos: usize, text: &str, len: usize) -> Self {
        DocOpBuilder::new()
            .retain(pos)
            .characters(text)
            .retain(len.saturating_sub(pos))
            .build()
    }

    /// Delete `text`, which starts at `pos`, from a document of `len` items.
    #[must_use]
    pub fn delete_text(pos: usize, text: &str, len: usize) -> Self {
        let removed = text.chars().count();
        DocOpBuilder::new()
            .retain(pos)
            .delete_characters(text)
            .retain(len.saturating_sub(pos + removed))
            .build()
    }

    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Length of the document this op applies to.
    #[must_use]
    pub fn input_len(&self) -> usize {
        self.components.iter().map(Component::input_len).sum()
    }

    /// Length of the document this op produces.
    #[must_use]
    pub fn output_len(&self) -> usize {
        self.components.iter().map(Component::output_len).sum()
    }

    /// True when the op only retains.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.components
            .iter()
            .all(|c| matches!(c, Component::Retain(_)))
    }

    /// Characters inserted and removed, for summaries.
    #[must_use]
    pub fn churn(&self) -> (usize, usize) {
        self.components.iter().fold((0, 0), |(ins, del), c| match c.class() {
            Class::Insert => (ins + c.output_len(), del),
            Class::Delete => (ins, del + c.input_len()),
            Class::Retain => (ins, del),
        })
    }
}

impl OpAlgebra for DocOp {
    fn compose(&self, next: &Self) -> Result<Self, OpError> {
        super::ot::compose(self, next)
    }

    fn transform(client: &Self, server: &Self) -> Result<(Self, Self), OpError> {
        super::ot::transform(client, server)
    }

    fn invert(&self) -> Self {
        self.components.iter().map(Component::invert).collect()
    }
}

impl FromIterator<Component> for DocOp {
    fn from_iter<T: IntoIterator<Item = Component>>(iter: T) -> Self {
        let mut builder = DocOpBuilder::new();
        for c in iter {
            builder.push(c);
        }
        builder.build()
    }
}

impl From<Vec<Component>> for DocOp {
    fn from(components: Vec<Component>) -> Self {
        components.into_iter().collect()
    }
}

impl From<DocOp> for Vec<Component> {
    fn from(op: DocOp) -> Self {
        op.components
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Accumulates components into a normalized [`DocOp`].
#[derive(Debug, Default)]
pub struct DocOpBuilder {
    components: Vec<Component>,
    gap_deletes: Vec<Component>,
    gap_inserts: Vec<Component>,
}

impl DocOpBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn retain(mut self, n: usize) -> Self {
        self.push(Component::Retain(n));
        self
    }

    #[must_use]
    pub fn characters(mut self, text: &str) -> Self {
        self.push(Component::Characters(text.to_string()));
        self
    }

    #[must_use]
    pub fn delete_characters(mut self, text: &str) -> Self {
        self.push(Component::DeleteCharacters(text.to_string()));
        self
    }

    #[must_use]
    pub fn element_start(mut self, tag: &str, attributes: Attributes) -> Self {
        self.push(Component::ElementStart {
            tag: tag.to_string(),
            attributes,
        });
        self
    }

    #[must_use]
    pub fn element_end(mut self) -> Self {
        self.push(Component::ElementEnd);
        self
    }

    #[must_use]
    pub fn delete_element_start(mut self, tag: &str, attributes: Attributes) -> Self {
        self.push(Component::DeleteElementStart {
            tag: tag.to_string(),
            attributes,
        });
        self
    }

    #[must_use]
    pub fn delete_element_end(mut self) -> Self {
        self.push(Component::DeleteElementEnd);
        self
    }

    /// Append a component, merging and reordering as needed.
    pub fn push(&mut self, component: Component) {
        if component.is_empty() {
            return;
        }
        match component.class() {
            Class::Retain => {
                self.flush_gap();
                push_merged(&mut self.components, component);
            }
            Class::Delete => push_merged(&mut self.gap_deletes, component),
            Class::Insert => push_merged(&mut self.gap_inserts, component),
        }
    }

    #[must_use]
    pub fn build(mut self) -> DocOp {
        self.flush_gap();
        DocOp {
            components: self.components,
        }
    }

    fn flush_gap(&mut self) {
        for c in self.gap_deletes.drain(..).chain(self.gap_inserts.drain(..)) {
            push_merged(&mut self.components, c);
        }
    }
}

fn push_merged(list: &mut Vec<Component>, component: Component) {
    if let Some(last) = list.last_mut() {
        match (last, &component) {
            (Component::Retain(n), Component::Retain(m)) => {
                *n += m;
                return;
            }
            (Component::Characters(s), Component::Characters(t))
            | (Component::DeleteCharacters(s), Component::DeleteCharacters(t)) => {
                s.push_str(t);
                return;
            }
            _ => {}
        }
    }
    list.push(component);
}

// ---------------------------------------------------------------------------
// Piecewise cursor
// ---------------------------------------------------------------------------

/// Walks an op's components, handing out pieces no longer than requested.
pub(crate) struct Pieces<'a> {
    rest: std::slice::Iter<'a, Component>,
    head: Option<Component>,
}

impl<'a> Pieces<'a> {
    pub(crate) fn new(op: &'a DocOp) -> Self {
        Self {
            rest: op.components.iter(),
            head: None,
        }
    }

    /// Class and span of the next piece, without consuming it.
    pub(crate) fn peek(&mut self) -> Option<(Class, usize)> {
        if self.head.is_none() {
            self.head = self.rest.next().cloned();
        }
        self.head.as_ref().map(|c| (c.class(), c.span()))
    }

    /// Take at most `max` items of the current component.
    pub(crate) fn take(&mut self, max: usize) -> Option<Component> {
        self.peek()?;
        let head = self.head.take()?;
        let (piece, rest) = head.split(max);
        self.head = rest;
        Some(piece)
    }

    pub(crate) fn take_whole(&mut self) -> Option<Component> {
        self.take(usize::MAX)
    }
}
