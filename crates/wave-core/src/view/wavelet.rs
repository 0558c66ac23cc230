//! One wavelet's client-side concurrency control.
//!
//! The client keeps at most one delta in flight. Local edits made while it is
//! unacknowledged are composed into a buffer that becomes the next delta once
//! the server acknowledges. Remote deltas are transformed past both:
//!
//! ```text
//! (inflight', s1) = transform(inflight, remote)
//! (buffer',   s2) = transform(buffer, s1)
//! local state    <- s2
//! ```

use std::sync::Arc;

use super::{OutgoingDelta, RevisionSink, ViewError, WaveletStatus};
use crate::algebra::OpAlgebra;
use crate::delta::TransformedWaveletDelta;
use crate::model::{HashedVersion, ParticipantId, WaveletId};
use crate::op::{AggregateOperation, WaveletOp};
use crate::revision::Revision;
use crate::state::{ApplyError, WaveletState};
use crate::tracker::DeltaTracker;
use crate::undo::UndoManager;

struct Inflight {
    op: AggregateOperation,
    sent: bool,
}

pub struct WaveletView {
    me: ParticipantId,
    status: WaveletStatus,
    local: WaveletState,
    confirmed: DeltaTracker,
    undo: UndoManager<AggregateOperation>,
    inflight: Option<Inflight>,
    buffer: Option<AggregateOperation>,
    sink: Option<Arc<dyn RevisionSink>>,
}

impl WaveletView {
    /// A view over `confirmed`, editing as `me`.
    #[must_use]
    pub fn new(me: ParticipantId, confirmed: DeltaTracker, max_checkpoints: Option<usize>) -> Self {
        Self {
            me,
            status: WaveletStatus::Open,
            local: confirmed.state().clone(),
            confirmed,
            undo: UndoManager::with_max_checkpoints(max_checkpoints),
            inflight: None,
            buffer: None,
            sink: None,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn RevisionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub const fn id(&self) -> &WaveletId {
        self.confirmed.state().id()
    }

    #[must_use]
    pub const fn status(&self) -> &WaveletStatus {
        &self.status
    }

    /// Optimistic state including unacknowledged local edits.
    #[must_use]
    pub const fn local(&self) -> &WaveletState {
        &self.local
    }

    /// Confirmed history: state, contributions and revisions.
    #[must_use]
    pub const fn confirmed(&self) -> &DeltaTracker {
        &self.confirmed
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Whether local edits are still waiting for acknowledgement.
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.inflight.is_some() || self.buffer.is_some()
    }

    pub(crate) fn set_inaccessible(&mut self) {
        tracing::info!(wavelet = %self.id(), "wavelet inaccessible");
        self.status = WaveletStatus::Inaccessible;
    }

    /// Mark the wavelet failed on behalf of the transport.
    pub(crate) fn fail_external(&mut self, reason: String) {
        tracing::error!(wavelet = %self.id(), reason = %reason, "wavelet failed permanently");
        self.status = WaveletStatus::Failed(reason);
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Apply a locally authored edit and record it for undo.
    ///
    /// # Errors
    ///
    /// Fails if the wavelet is terminal, or permanently if the edit does not
    /// apply to the local state.
    pub fn record_local_edit(&mut self, ops: &[WaveletOp]) -> Result<(), ViewError> {
        self.run("local edit", |view| {
            let op = AggregateOperation::from_ops(ops)?;
            if op.is_empty() {
                return Ok(());
            }
            view.local.apply_aggregate(&op)?;
            view.undo.undoable_op(op.clone());
            view.enqueue(op)?;
            Ok(())
        })
    }

    /// Close the current undo group.
    ///
    /// # Errors
    ///
    /// Fails if the wavelet is terminal.
    pub fn checkpoint(&mut self) -> Result<(), ViewError> {
        self.run("checkpoint", |view| {
            view.undo.checkpoint();
            Ok(())
        })
    }

    /// Revert the latest undo group, apply it locally and queue it.
    ///
    /// Returns the applied op, empty when there is nothing to undo.
    ///
    /// # Errors
    ///
    /// Fails if the wavelet is terminal, or permanently if the undo history
    /// no longer transforms.
    pub fn user_requests_undo(&mut self) -> Result<AggregateOperation, ViewError> {
        self.run("undo", |view| {
            let op = view.undo.undo()?;
            view.apply_history_op(op)
        })
    }

    /// Reapply the latest undone group. See [`WaveletView::user_requests_undo`].
    ///
    /// # Errors
    ///
    /// As for undo.
    pub fn user_requests_redo(&mut self) -> Result<AggregateOperation, ViewError> {
        self.run("redo", |view| {
            let op = view.undo.redo()?;
            view.apply_history_op(op)
        })
    }

    /// Apply a delta the server confirmed for another client.
    ///
    /// # Errors
    ///
    /// Any version gap or op failure fails the wavelet permanently.
    #[tracing::instrument(skip_all, fields(wavelet = %self.id(), version = delta.resulting.version))]
    pub fn apply_remote_delta(&mut self, delta: &TransformedWaveletDelta) -> Result<(), ViewError> {
        self.run("remote delta", |view| {
            let finalized = view.confirmed.apply(delta)?;
            let mut remote = delta.aggregate()?;
            if let Some(inflight) = view.inflight.as_mut() {
                let (client, server) = AggregateOperation::transform(&inflight.op, &remote)?;
                inflight.op = client;
                remote = server;
            }
            if let Some(buffer) = view.buffer.as_mut() {
                let (client, server) = AggregateOperation::transform(buffer, &remote)?;
                *buffer = client;
                remote = server;
            }
            view.local.apply_aggregate(&remote)?;
            view.undo.non_undoable_op(remote);
            view.publish(finalized);
            Ok(())
        })
    }

    /// The server sequenced our in-flight delta at `resulting`.
    ///
    /// # Errors
    ///
    /// An acknowledgement with nothing in flight, or one that does not fit
    /// the confirmed history, fails the wavelet permanently.
    #[tracing::instrument(skip_all, fields(wavelet = %self.id(), version = resulting.version))]
    pub fn acknowledge(&mut self, resulting: HashedVersion, timestamp: i64) -> Result<(), ViewError> {
        self.run("acknowledge", |view| {
            let Some(inflight) = view.inflight.take() else {
                return Err(ApplyError::UnexpectedAck {
                    version: resulting.version,
                });
            };
            let delta = TransformedWaveletDelta {
                author: view.me.clone(),
                applied_at: *view.confirmed.version(),
                resulting,
                timestamp,
                ops: inflight.op.to_wavelet_ops(),
            };
            let finalized = view.confirmed.apply(&delta)?;
            view.publish(finalized);
            if let Some(buffer) = view.buffer.take() {
                view.inflight = Some(Inflight {
                    op: buffer,
                    sent: false,
                });
            }
            Ok(())
        })
    }

    /// The delta to hand to the transport, once per in-flight op.
    pub fn take_outgoing(&mut self) -> Option<OutgoingDelta> {
        if self.status.is_terminal() {
            return None;
        }
        let inflight = self.inflight.as_mut().filter(|i| !i.sent)?;
        inflight.sent = true;
        Some(OutgoingDelta {
            wavelet: self.confirmed.state().id().clone(),
            author: self.me.clone(),
            applied_at: *self.confirmed.version(),
            ops: inflight.op.to_wavelet_ops(),
        })
    }

    /// Stop accepting edits and flush the open revision.
    pub fn close(&mut self) {
        if matches!(self.status, WaveletStatus::Open) {
            self.status = WaveletStatus::Closed;
        }
        let finalized = self.confirmed.finish();
        self.publish(finalized);
        tracing::info!(wavelet = %self.id(), status = %self.status, "wavelet closed");
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn run<T>(
        &mut self,
        action: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T, ApplyError>,
    ) -> Result<T, ViewError> {
        if self.status.is_terminal() {
            return Err(ViewError::Terminal {
                wavelet: self.id().clone(),
                status: self.status.clone(),
            });
        }
        f(self).map_err(|source| self.fail(action, source))
    }

    fn fail(&mut self, action: &'static str, source: ApplyError) -> ViewError {
        tracing::error!(
            wavelet = %self.id(),
            action,
            code = %source.code(),
            error = %source,
            "wavelet failed permanently"
        );
        self.status = WaveletStatus::Failed(source.to_string());
        ViewError::Failed {
            wavelet: self.id().clone(),
            source,
        }
    }

    fn enqueue(&mut self, op: AggregateOperation) -> Result<(), ApplyError> {
        if self.inflight.is_none() {
            self.inflight = Some(Inflight { op, sent: false });
            return Ok(());
        }
        self.buffer = Some(match self.buffer.take() {
            Some(buffer) => buffer.compose(&op)?,
            None => op,
        });
        Ok(())
    }

    fn apply_history_op(
        &mut self,
        op: Option<AggregateOperation>,
    ) -> Result<AggregateOperation, ApplyError> {
        let Some(op) = op else {
            return Ok(AggregateOperation::new());
        };
        self.local.apply_aggregate(&op)?;
        if !op.is_empty() {
            self.enqueue(op.clone())?;
        }
        Ok(op)
    }

    fn publish(&self, revision: Option<Revision<AggregateOperation>>) {
        if let (Some(sink), Some(revision)) = (&self.sink, revision) {
            sink.publish(self.id(), &revision);
        }
    }
}
