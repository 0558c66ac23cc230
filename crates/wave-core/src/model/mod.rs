//! Identifiers and version stamps shared by every layer.

pub mod ids;
pub mod version;

pub use ids::{DocumentId, ParticipantId, WaveId, WaveletId};
pub use version::HashedVersion;
