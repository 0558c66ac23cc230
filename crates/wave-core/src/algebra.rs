//! The operation algebra shared by document ops and aggregates.
//!
//! Every operation type the undo manager and the wavelet view handle supports
//! three laws:
//!
//! | Law | Meaning |
//! |---|---|
//! | `a.compose(b)` | apply `a`, then `b`, as one operation |
//! | `transform(c, s)` | rebase two concurrent ops so `c·s' == s·c'` |
//! | `a.invert()` | the operation that reverts `a` |
//!
//! Violating a precondition (composing ops whose lengths do not line up,
//! deleting content that is not there) is an internal-consistency failure.
//! It is reported as [`OpError`] and must never be swallowed: the wavelet view
//! turns it into a permanent failure of the affected wavelet.

use crate::error::ErrorCode;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// A violated precondition in compose, transform or apply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpError {
    #[error("{context}: length mismatch (expected {expected}, found {actual})")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{context}: content mismatch: {detail}")]
    ContentMismatch {
        context: &'static str,
        detail: String,
    },
}

impl OpError {
    /// Machine-readable code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::LengthMismatch { .. } => ErrorCode::OperationMismatch,
            Self::ContentMismatch { .. } => ErrorCode::ContentMismatch,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Compose, transform and invert.
pub trait OpAlgebra: Clone + Sized {
    /// `self` followed by `next`.
    ///
    /// # Errors
    ///
    /// Returns [`OpError`] when `next` does not apply to the state `self`
    /// produces.
    fn compose(&self, next: &Self) -> Result<Self, OpError>;

    /// Rebase two operations made concurrently against the same state.
    ///
    /// Returns `(client', server')` such that applying `client` then `server'`
    /// converges with applying `server` then `client'`. Where both sides
    /// insert at the same position the client's insert lands first.
    ///
    /// # Errors
    ///
    /// Returns [`OpError`] when the two ops do not share a base state.
    fn transform(client: &Self, server: &Self) -> Result<(Self, Self), OpError>;

    /// The operation that reverts `self`.
    #[must_use]
    fn invert(&self) -> Self;

    /// Compose a sequence left to right. `None` for an empty sequence.
    ///
    /// # Errors
    ///
    /// Propagates the first composition failure.
    fn compose_all<'a, I>(ops: I) -> Result<Option<Self>, OpError>
    where
        I: IntoIterator<Item = &'a Self>,
        Self: 'a,
    {
        let mut iter = ops.into_iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut acc = first.clone();
        for op in iter {
            acc = acc.compose(op)?;
        }
        Ok(Some(acc))
    }
}
