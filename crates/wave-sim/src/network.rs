use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wave_core::delta::TransformedWaveletDelta;
use wave_core::model::HashedVersion;
use wave_core::view::OutgoingDelta;

use crate::rng::DeterministicRng;

/// Delivery delay bounds for the simulated transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Maximum delivery delay in rounds.
    pub max_delay_rounds: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { max_delay_rounds: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Server,
    Client(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Client to server.
    Submit(OutgoingDelta),
    /// Server to a client that did not author the delta.
    Delta(TransformedWaveletDelta),
    /// Server to the author.
    Ack {
        resulting: HashedVersion,
        timestamp: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: Endpoint,
    pub to: Endpoint,
    pub payload: Payload,
}

#[derive(Debug, Clone)]
struct Pending {
    deliver_at_round: u64,
    seq: u64,
    envelope: Envelope,
}

/// Reliable transport with random delay that never reorders within a link.
///
/// The wavelet protocol assumes per-connection FIFO, so a message is never
/// scheduled before the previous message on its link.
#[derive(Debug, Clone)]
pub struct SimulatedNetwork {
    pending: Vec<Pending>,
    link_tail: BTreeMap<(Endpoint, Endpoint), u64>,
    next_seq: u64,
    config: NetworkConfig,
}

impl SimulatedNetwork {
    #[must_use]
    pub const fn new(config: NetworkConfig) -> Self {
        Self {
            pending: Vec::new(),
            link_tail: BTreeMap::new(),
            next_seq: 0,
            config,
        }
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queue a message; returns the round it will be delivered in.
    pub fn send(&mut self, envelope: Envelope, round: u64, rng: &mut DeterministicRng) -> u64 {
        let delay = rng.next_bounded(u64::from(self.config.max_delay_rounds) + 1);
        let tail = self.link_tail.entry((envelope.from, envelope.to)).or_insert(0);
        let deliver_at_round = round.saturating_add(delay).max(*tail);
        *tail = deliver_at_round;

        self.pending.push(Pending {
            deliver_at_round,
            seq: self.next_seq,
            envelope,
        });
        self.next_seq += 1;
        deliver_at_round
    }

    /// Remove and return every message due by `round`, in send order per link.
    pub fn deliver_ready(&mut self, round: u64) -> Vec<Envelope> {
        let (mut ready, future): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| p.deliver_at_round <= round);
        self.pending = future;
        ready.sort_by_key(|p| (p.deliver_at_round, p.seq));
        ready.into_iter().map(|p| p.envelope).collect()
    }
}
