//! Revisions: author-homogeneous spans of wavelet history.
//!
//! Two builders produce them:
//!
//! - [`RevisionLog`] groups deltas forward as they are applied.
//! - [`HistoryReader`] reconstructs them backward, page by page, from a
//!   remote [`DeltaLog`].
//!
//! Adjacent revisions never share an author unless a tag boundary forces the
//! split. Each revision's `applied_at` is the previous revision's `resulting`,
//! so a revision chain covers its range without gaps.

pub mod history;
pub mod log;

pub use history::{
    CancelToken, DeltaLog, FetchError, HistoryReader, HistoryRequest, InMemoryDeltaLog, LogEntry,
    RevisionPolicy,
};
pub use log::RevisionLog;

use serde::{Deserialize, Serialize};

use crate::model::{DocumentId, HashedVersion, ParticipantId};

/// A finalized span of same-author history with its composed op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision<O> {
    /// Position in the chain: 0 is the first revision built.
    pub index: usize,
    pub author: ParticipantId,
    pub applied_at: HashedVersion,
    pub resulting: HashedVersion,
    /// Timestamp of the newest delta in the span.
    pub timestamp: i64,
    pub delta_count: usize,
    pub op: O,
}

/// Which deltas a forward log groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionScope {
    /// Every delta of the wavelet.
    #[default]
    Wavelet,
    /// Only deltas editing one document; ops on other documents are dropped.
    Document(DocumentId),
}
