//! wave-core library.
//!
//! Operational-transformation core for collaborative wavelets: the aggregate
//! operation algebra, checkpointed undo/redo, contribution and revision
//! tracking, and per-wavelet concurrency control.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per module with an [`error::ErrorCode`];
//!   `anyhow::Result` only for configuration loading.
//! - **Logging**: `tracing` macros (`debug!` for algebra and undo steps,
//!   `info!` for lifecycle, `warn!` for truncated history, `error!` for
//!   wavelet failure).

pub mod algebra;
pub mod config;
pub mod contrib;
pub mod delta;
pub mod doc;
pub mod error;
pub mod model;
pub mod op;
pub mod revision;
pub mod state;
pub mod tracker;
pub mod undo;
pub mod view;

pub use algebra::{OpAlgebra, OpError};
pub use contrib::{AnnotationOverlay, ContributionRange, WaveletContributions};
pub use delta::TransformedWaveletDelta;
pub use doc::{DocOp, DocOpBuilder, Document};
pub use error::ErrorCode;
pub use model::{DocumentId, HashedVersion, ParticipantId, WaveId, WaveletId};
pub use op::{AggregateOperation, AuthoredOperation, ParticipantOp, WaveletOp};
pub use revision::{Revision, RevisionLog, RevisionScope};
pub use state::{ApplyError, WaveletState};
pub use tracker::DeltaTracker;
pub use undo::UndoManager;
pub use view::{ViewError, WaveView, WaveletStatus, WaveletView};
