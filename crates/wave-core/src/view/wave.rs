//! Many wavelets behind one inbox.
//!
//! Transport threads hold an [`InboxHandle`] and enqueue whatever the server
//! sends. The owning task calls [`WaveView::drain_inbox`] to apply it in
//! arrival order and collect the deltas to send back.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{OutgoingDelta, RevisionSink, ViewError, WaveletStatus, WaveletView};
use crate::delta::TransformedWaveletDelta;
use crate::model::{HashedVersion, ParticipantId, WaveletId};
use crate::tracker::DeltaTracker;

/// A message from the transport for one wavelet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Inbound {
    Delta {
        wavelet: WaveletId,
        delta: TransformedWaveletDelta,
    },
    Ack {
        wavelet: WaveletId,
        resulting: HashedVersion,
        timestamp: i64,
    },
    /// The transport lost the wavelet for good.
    Failure { wavelet: WaveletId, reason: String },
}

impl Inbound {
    #[must_use]
    pub const fn wavelet(&self) -> &WaveletId {
        match self {
            Self::Delta { wavelet, .. } | Self::Ack { wavelet, .. } | Self::Failure { wavelet, .. } => {
                wavelet
            }
        }
    }
}

/// Thread-safe sender into a [`WaveView`]'s inbox.
#[derive(Debug, Clone)]
pub struct InboxHandle {
    tx: UnboundedSender<Inbound>,
}

impl InboxHandle {
    /// Enqueue one message.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::ViewClosed`] once the view has been dropped.
    pub fn deliver(&self, message: Inbound) -> Result<(), ViewError> {
        self.tx.send(message).map_err(|_| ViewError::ViewClosed)
    }

    /// # Errors
    ///
    /// See [`InboxHandle::deliver`].
    pub fn deliver_delta(
        &self,
        wavelet: WaveletId,
        delta: TransformedWaveletDelta,
    ) -> Result<(), ViewError> {
        self.deliver(Inbound::Delta { wavelet, delta })
    }

    /// # Errors
    ///
    /// See [`InboxHandle::deliver`].
    pub fn deliver_ack(
        &self,
        wavelet: WaveletId,
        resulting: HashedVersion,
        timestamp: i64,
    ) -> Result<(), ViewError> {
        self.deliver(Inbound::Ack {
            wavelet,
            resulting,
            timestamp,
        })
    }
}

/// What one [`WaveView::drain_inbox`] call did.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub processed: usize,
    /// Deltas to submit, at most one per wavelet.
    pub outgoing: Vec<OutgoingDelta>,
    /// Messages that failed, in arrival order. Other wavelets are unaffected.
    pub failures: Vec<(WaveletId, ViewError)>,
}

/// All open wavelets of one wave for one participant.
pub struct WaveView {
    me: ParticipantId,
    max_checkpoints: Option<usize>,
    wavelets: BTreeMap<WaveletId, WaveletView>,
    sink: Option<Arc<dyn RevisionSink>>,
    inbox_tx: UnboundedSender<Inbound>,
    inbox_rx: UnboundedReceiver<Inbound>,
    closed: bool,
}

impl WaveView {
    #[must_use]
    pub fn new(me: ParticipantId, max_checkpoints: Option<usize>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            me,
            max_checkpoints,
            wavelets: BTreeMap::new(),
            sink: None,
            inbox_tx,
            inbox_rx,
            closed: false,
        }
    }

    /// Publish finalized revisions of every wavelet opened from now on.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn RevisionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub const fn me(&self) -> &ParticipantId {
        &self.me
    }

    #[must_use]
    pub fn inbox(&self) -> InboxHandle {
        InboxHandle {
            tx: self.inbox_tx.clone(),
        }
    }

    /// Start tracking a wavelet from its confirmed history.
    ///
    /// An inaccessible wavelet is registered but terminal from the start.
    /// Reopening an id replaces the previous view.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::ViewClosed`] after [`WaveView::close`].
    pub fn open_wavelet(&mut self, confirmed: DeltaTracker, accessible: bool) -> Result<(), ViewError> {
        if self.closed {
            return Err(ViewError::ViewClosed);
        }
        let id = confirmed.state().id().clone();
        let mut view = WaveletView::new(self.me.clone(), confirmed, self.max_checkpoints);
        if let Some(sink) = &self.sink {
            view = view.with_sink(Arc::clone(sink));
        }
        if accessible {
            tracing::info!(wavelet = %id, version = view.confirmed().version().version, "wavelet opened");
        } else {
            view.set_inaccessible();
        }
        self.wavelets.insert(id, view);
        Ok(())
    }

    /// Close one wavelet and forget it.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::UnknownWavelet`] if it was never opened.
    pub fn close_wavelet(&mut self, wavelet: &WaveletId) -> Result<WaveletView, ViewError> {
        let mut view = self
            .wavelets
            .remove(wavelet)
            .ok_or_else(|| ViewError::UnknownWavelet(wavelet.clone()))?;
        view.close();
        Ok(view)
    }

    #[must_use]
    pub fn wavelet(&self, wavelet: &WaveletId) -> Option<&WaveletView> {
        self.wavelets.get(wavelet)
    }

    /// Mutable access for local edits, checkpoints and undo.
    ///
    /// # Errors
    ///
    /// Fails when the view is closed or the wavelet is unknown.
    pub fn wavelet_mut(&mut self, wavelet: &WaveletId) -> Result<&mut WaveletView, ViewError> {
        if self.closed {
            return Err(ViewError::ViewClosed);
        }
        self.wavelets
            .get_mut(wavelet)
            .ok_or_else(|| ViewError::UnknownWavelet(wavelet.clone()))
    }

    pub fn wavelets(&self) -> impl Iterator<Item = &WaveletView> {
        self.wavelets.values()
    }

    #[must_use]
    pub fn status(&self, wavelet: &WaveletId) -> Option<&WaveletStatus> {
        self.wavelets.get(wavelet).map(WaveletView::status)
    }

    /// Whether the wavelet can no longer accept ops. Unknown ids count as
    /// terminal.
    #[must_use]
    pub fn is_terminal(&self, wavelet: &WaveletId) -> bool {
        self.closed
            || self
                .wavelets
                .get(wavelet)
                .is_none_or(|view| view.status().is_terminal())
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Apply everything delivered so far, then collect outgoing deltas.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::ViewClosed`] after [`WaveView::close`]. Per-wavelet
    /// failures are reported in [`DrainReport::failures`] instead.
    pub fn drain_inbox(&mut self) -> Result<DrainReport, ViewError> {
        if self.closed {
            return Err(ViewError::ViewClosed);
        }
        let mut report = DrainReport::default();
        while let Ok(message) = self.inbox_rx.try_recv() {
            report.processed += 1;
            let wavelet = message.wavelet().clone();
            if let Err(e) = self.dispatch(message) {
                tracing::warn!(wavelet = %wavelet, code = %e.code(), error = %e, "inbound message rejected");
                report.failures.push((wavelet, e));
            }
        }
        report.outgoing = self.take_outgoing();
        if report.processed > 0 {
            tracing::debug!(
                processed = report.processed,
                outgoing = report.outgoing.len(),
                failures = report.failures.len(),
                "inbox drained"
            );
        }
        Ok(report)
    }

    /// Deltas ready to send, one per wavelet at most.
    pub fn take_outgoing(&mut self) -> Vec<OutgoingDelta> {
        self.wavelets
            .values_mut()
            .filter_map(WaveletView::take_outgoing)
            .collect()
    }

    /// Close every wavelet. Later calls fail with [`ViewError::ViewClosed`].
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for view in self.wavelets.values_mut() {
            view.close();
        }
        self.closed = true;
        self.inbox_rx.close();
        tracing::info!(participant = %self.me, wavelets = self.wavelets.len(), "wave view closed");
    }

    fn dispatch(&mut self, message: Inbound) -> Result<(), ViewError> {
        let view = self
            .wavelets
            .get_mut(message.wavelet())
            .ok_or_else(|| ViewError::UnknownWavelet(message.wavelet().clone()))?;
        match message {
            Inbound::Delta { delta, .. } => view.apply_remote_delta(&delta),
            Inbound::Ack {
                resulting,
                timestamp,
                ..
            } => view.acknowledge(resulting, timestamp),
            Inbound::Failure { reason, .. } => {
                view.fail_external(reason);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::DocOp;
    use crate::op::{AggregateOperation, WaveletOp};
    use crate::revision::{Revision, RevisionScope};

    fn tracker(id: &str) -> DeltaTracker {
        DeltaTracker::new(id.into(), RevisionScope::Wavelet)
    }

    #[test]
    fn inbox_applies_in_arrival_order() {
        let mut wave = WaveView::new("a".into(), None);
        wave.open_wavelet(tracker("w1"), true).expect("open");
        let inbox = wave.inbox();

        let d1 = TransformedWaveletDelta::sequence(
            "b".into(),
            *wave.wavelet(&"w1".into()).expect("w1").confirmed().version(),
            0,
            vec![WaveletOp::document("d", DocOp::insert_text(0, "hi", 0))],
        );
        let d2 = TransformedWaveletDelta::sequence(
            "b".into(),
            d1.resulting,
            0,
            vec![WaveletOp::document("d", DocOp::insert_text(2, "!", 2))],
        );
        std::thread::spawn(move || {
            inbox.deliver_delta("w1".into(), d1).expect("deliver");
            inbox.deliver_delta("w1".into(), d2).expect("deliver");
        })
        .join()
        .expect("join");

        let report = wave.drain_inbox().expect("drain");
        assert_eq!(report.processed, 2);
        assert!(report.failures.is_empty());
        let text = wave
            .wavelet(&"w1".into())
            .and_then(|w| w.local().document(&"d".into()))
            .map(crate::doc::Document::text);
        assert_eq!(text.as_deref(), Some("hi!"));
    }

    #[test]
    fn unknown_and_failed_wavelets_are_isolated() {
        let mut wave = WaveView::new("a".into(), None);
        wave.open_wavelet(tracker("w1"), true).expect("open");
        wave.open_wavelet(tracker("w2"), true).expect("open");
        let inbox = wave.inbox();
        inbox
            .deliver(Inbound::Failure {
                wavelet: "w1".into(),
                reason: "server dropped it".into(),
            })
            .expect("deliver");
        inbox
            .deliver_ack("nope".into(), HashedVersion::unsigned(1), 0)
            .expect("deliver");

        let report = wave.drain_inbox().expect("drain");
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].1, ViewError::UnknownWavelet(_)));
        assert!(wave.is_terminal(&"w1".into()));
        assert!(!wave.is_terminal(&"w2".into()));
        assert!(wave.is_terminal(&"nope".into()));
    }

    #[test]
    fn inaccessible_wavelet_rejects_edits() {
        let mut wave = WaveView::new("a".into(), None);
        wave.open_wavelet(tracker("w1"), false).expect("open");
        assert_eq!(wave.status(&"w1".into()), Some(&WaveletStatus::Inaccessible));
        let err = wave
            .wavelet_mut(&"w1".into())
            .expect("known")
            .checkpoint()
            .expect_err("terminal");
        assert_eq!(err.code(), crate::error::ErrorCode::WaveletClosed);
    }

    #[test]
    fn close_flushes_revisions_to_sink() {
        let (tx, mut rx) =
            mpsc::unbounded_channel::<(WaveletId, Revision<AggregateOperation>)>();
        let mut wave = WaveView::new("a".into(), None).with_sink(Arc::new(tx));
        wave.open_wavelet(tracker("w1"), true).expect("open");
        let w1 = wave.wavelet_mut(&"w1".into()).expect("w1");
        w1.record_local_edit(&[WaveletOp::document("d", DocOp::insert_text(0, "x", 0))])
            .expect("edit");
        let out = w1.take_outgoing().expect("outgoing");
        w1.acknowledge(out.applied_at.next(1, b"x"), 0).expect("ack");

        wave.close();
        let (id, revision) = rx.try_recv().expect("revision published");
        assert_eq!(id.as_str(), "w1");
        assert_eq!(revision.author.as_str(), "a");
        assert!(wave.drain_inbox().is_err());
        assert!(wave.wavelet_mut(&"w1".into()).is_err());
    }
}
