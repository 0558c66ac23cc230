//! Concurrency control for live wavelets.
//!
//! A [`WaveletView`] binds one wavelet's optimistic local state, its confirmed
//! history and its undo manager to the operation channel. A [`WaveView`]
//! multiplexes wavelets by id and owns the inbox other threads deliver into.
//!
//! Everything here is single-writer. Only [`InboxHandle`] crosses threads.

pub mod wave;
pub mod wavelet;

pub use wave::{DrainReport, Inbound, InboxHandle, WaveView};
pub use wavelet::WaveletView;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorCode;
use crate::model::{HashedVersion, ParticipantId, WaveletId};
use crate::op::{AggregateOperation, WaveletOp};
use crate::revision::Revision;
use crate::state::ApplyError;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of one wavelet inside a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum WaveletStatus {
    Open,
    /// The server refused access; nothing may be submitted.
    Inaccessible,
    Closed,
    /// An internal-consistency failure. Permanent.
    Failed(String),
}

impl WaveletStatus {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for WaveletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Inaccessible => f.write_str("inaccessible"),
            Self::Closed => f.write_str("closed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("wavelet {0} is not open in this view")]
    UnknownWavelet(WaveletId),

    #[error("wavelet {wavelet} is {status}")]
    Terminal {
        wavelet: WaveletId,
        status: WaveletStatus,
    },

    #[error("wavelet {wavelet} failed permanently: {source}")]
    Failed {
        wavelet: WaveletId,
        #[source]
        source: ApplyError,
    },

    #[error("wave view is closed")]
    ViewClosed,
}

impl ViewError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownWavelet(_) => ErrorCode::UnknownWavelet,
            Self::Terminal {
                status: WaveletStatus::Failed(_),
                ..
            }
            | Self::Failed { .. } => ErrorCode::WaveletFailed,
            Self::Terminal { .. } | Self::ViewClosed => ErrorCode::WaveletClosed,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A client delta ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingDelta {
    pub wavelet: WaveletId,
    pub author: ParticipantId,
    /// Last confirmed version the ops were written against.
    pub applied_at: HashedVersion,
    pub ops: Vec<WaveletOp>,
}

/// Receives revisions as they are finalized, for persistence or indexing.
pub trait RevisionSink: Send + Sync {
    fn publish(&self, wavelet: &WaveletId, revision: &Revision<AggregateOperation>);
}

impl RevisionSink for tokio::sync::mpsc::UnboundedSender<(WaveletId, Revision<AggregateOperation>)> {
    fn publish(&self, wavelet: &WaveletId, revision: &Revision<AggregateOperation>) {
        if self.send((wavelet.clone(), revision.clone())).is_err() {
            tracing::debug!(wavelet = %wavelet, index = revision.index, "revision sink dropped");
        }
    }
}
