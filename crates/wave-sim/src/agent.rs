use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use wave_core::delta::TransformedWaveletDelta;
use wave_core::doc::DocOp;
use wave_core::model::{DocumentId, ParticipantId, WaveletId};
use wave_core::op::{AggregateOperation, WaveletOp};
use wave_core::revision::{Revision, RevisionScope};
use wave_core::tracker::DeltaTracker;
use wave_core::view::{InboxHandle, RevisionSink, ViewError, WaveView, WaveletView};

use crate::rng::DeterministicRng;

/// Stable identifier for a simulated client.
pub type ClientId = usize;

/// The document every simulated client edits.
pub const DOCUMENT: &str = "main";

/// One user gesture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Insert { pos: usize, text: String },
    Delete { pos: usize, len: usize },
    Checkpoint,
    Undo,
    Redo,
}

type Published = (WaveletId, Revision<AggregateOperation>);

/// A user editing one wavelet through a [`WaveView`].
pub struct SimulatedClient {
    id: ClientId,
    wavelet: WaveletId,
    view: WaveView,
    inbox: InboxHandle,
    published_rx: UnboundedReceiver<Published>,
    published: Vec<Revision<AggregateOperation>>,
}

impl SimulatedClient {
    /// Open the wavelet at the server's current history.
    ///
    /// # Errors
    ///
    /// Fails if `history` does not replay cleanly.
    pub fn new(
        id: ClientId,
        wavelet: WaveletId,
        history: &[TransformedWaveletDelta],
        max_checkpoints: Option<usize>,
    ) -> anyhow::Result<Self> {
        let mut tracker = DeltaTracker::new(wavelet.clone(), RevisionScope::Wavelet);
        for delta in history {
            tracker.apply(delta)?;
        }
        let (tx, published_rx) = mpsc::unbounded_channel::<Published>();
        let sink: Arc<dyn RevisionSink> = Arc::new(tx);
        let mut view = WaveView::new(participant(id), max_checkpoints).with_sink(sink);
        view.open_wavelet(tracker, true)?;
        let inbox = view.inbox();
        Ok(Self {
            id,
            wavelet,
            view,
            inbox,
            published_rx,
            published: Vec::new(),
        })
    }

    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    #[must_use]
    pub const fn inbox(&self) -> &InboxHandle {
        &self.inbox
    }

    pub const fn view_mut(&mut self) -> &mut WaveView {
        &mut self.view
    }

    /// The edited wavelet, if the view still holds it.
    #[must_use]
    pub fn wavelet(&self) -> Option<&WaveletView> {
        self.view.wavelet(&self.wavelet)
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.wavelet().is_some_and(WaveletView::has_pending)
    }

    /// Current local text of [`DOCUMENT`].
    #[must_use]
    pub fn text(&self) -> String {
        self.wavelet()
            .and_then(|w| w.local().document(&DocumentId::from(DOCUMENT)))
            .map(wave_core::doc::Document::text)
            .unwrap_or_default()
    }

    /// Pick and perform one gesture against the local text.
    ///
    /// # Errors
    ///
    /// Returns the view's error when the wavelet refuses the gesture.
    pub fn act(&mut self, rng: &mut DeterministicRng) -> Result<Action, ViewError> {
        let action = self.choose(rng);
        let view = self.view.wavelet_mut(&self.wavelet)?;
        match &action {
            Action::Insert { pos, text } => {
                let len = local_text(view).chars().count();
                let op = DocOp::insert_text(*pos, text, len);
                view.record_local_edit(&[WaveletOp::document(DOCUMENT, op)])?;
            }
            Action::Delete { pos, len } => {
                let current = local_text(view);
                let doc_len = current.chars().count();
                let deleted = &current[*pos..*pos + *len];
                let op = DocOp::delete_text(*pos, deleted, doc_len);
                view.record_local_edit(&[WaveletOp::document(DOCUMENT, op)])?;
            }
            Action::Checkpoint => view.checkpoint()?,
            Action::Undo => {
                view.user_requests_undo()?;
            }
            Action::Redo => {
                view.user_requests_redo()?;
            }
        }
        Ok(action)
    }

    /// Close the view and collect every revision it published.
    pub fn close(&mut self) -> &[Revision<AggregateOperation>] {
        self.view.close();
        self.collect_published();
        &self.published
    }

    /// Revisions published so far, oldest first.
    pub fn published(&mut self) -> &[Revision<AggregateOperation>] {
        self.collect_published();
        &self.published
    }

    fn collect_published(&mut self) {
        while let Ok((_, revision)) = self.published_rx.try_recv() {
            self.published.push(revision);
        }
    }

    fn choose(&self, rng: &mut DeterministicRng) -> Action {
        let len = self.text().chars().count();
        let roll = rng.next_bounded(100);
        match roll {
            0..45 => {
                let pos = rng.next_index(len + 1);
                let count = 1 + rng.next_index(3);
                let text = (0..count).map(|_| rng.next_letter()).collect();
                Action::Insert { pos, text }
            }
            45..70 if len > 0 => {
                let pos = rng.next_index(len);
                let max = (len - pos).min(3);
                Action::Delete {
                    pos,
                    len: 1 + rng.next_index(max),
                }
            }
            45..82 => Action::Checkpoint,
            82..92 => Action::Undo,
            _ => Action::Redo,
        }
    }
}

/// The participant id a client edits as.
#[must_use]
pub fn participant(id: ClientId) -> ParticipantId {
    ParticipantId::new(format!("client-{id}@sim"))
}

fn local_text(view: &WaveletView) -> String {
    view.local()
        .document(&DocumentId::from(DOCUMENT))
        .map(wave_core::doc::Document::text)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave_core::model::HashedVersion;

    fn seeded(wavelet: &WaveletId) -> Vec<TransformedWaveletDelta> {
        vec![TransformedWaveletDelta::sequence(
            "creator@sim".into(),
            HashedVersion::initial(wavelet),
            1,
            vec![WaveletOp::document(DOCUMENT, DocOp::insert_text(0, "seed", 0))],
        )]
    }

    #[test]
    fn client_opens_at_history() {
        let wavelet = WaveletId::from("w");
        let client = SimulatedClient::new(0, wavelet.clone(), &seeded(&wavelet), None)
            .expect("client");
        assert_eq!(client.text(), "seed");
        assert!(!client.has_pending());
    }

    #[test]
    fn actions_keep_local_text_valid() {
        let wavelet = WaveletId::from("w");
        let mut client = SimulatedClient::new(1, wavelet.clone(), &seeded(&wavelet), Some(4))
            .expect("client");
        let mut rng = DeterministicRng::new(11);
        let mut edits = 0;
        for _ in 0..200 {
            let action = client.act(&mut rng).expect("gesture");
            if matches!(action, Action::Insert { .. } | Action::Delete { .. }) {
                edits += 1;
            }
        }
        assert!(edits > 0);
        assert!(client.has_pending());
        assert!(client.wavelet().is_some_and(|w| !w.status().is_terminal()));
    }

    #[test]
    fn close_publishes_open_revision() {
        let wavelet = WaveletId::from("w");
        let mut client = SimulatedClient::new(2, wavelet.clone(), &seeded(&wavelet), None)
            .expect("client");
        let published = client.close();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].author, ParticipantId::from("creator@sim"));
    }
}
