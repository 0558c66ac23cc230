//! wave-sim library.
//!
//! Deterministic multi-client editing sessions against a sequencing server,
//! used to check that every client view converges on the server's history.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` for harness failures. Invariant violations
//!   are data, reported by [`oracle::WaveletOracle`].
//! - **Logging**: `tracing` macros (`debug!` per message, `info!` per run).

pub mod agent;
pub mod campaign;
pub mod network;
pub mod oracle;
pub mod rng;
pub mod server;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use wave_core::contrib::WaveletContributions;
use wave_core::delta::TransformedWaveletDelta;
use wave_core::doc::DocOp;
use wave_core::model::{HashedVersion, ParticipantId, WaveletId};
use wave_core::op::{AggregateOperation, WaveletOp};
use wave_core::revision::Revision;
use wave_core::state::WaveletState;
use wave_core::view::WaveletStatus;

use crate::agent::{Action, ClientId, DOCUMENT, SimulatedClient, participant};
use crate::network::{Endpoint, Envelope, NetworkConfig, Payload, SimulatedNetwork};
use crate::rng::DeterministicRng;
use crate::server::SequencingServer;

/// Rounds allowed after the last editing round for in-flight traffic to land.
pub const QUIESCE_ROUNDS: u64 = 256;

/// Text the wavelet's creator seeds [`agent::DOCUMENT`] with.
pub const SEED_TEXT: &str = "the quick brown fox";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub clients: usize,
    /// Rounds in which clients edit.
    pub rounds: u64,
    /// Chance per client per round of performing a gesture.
    pub edit_percent: u8,
    /// Undo groups kept per client. Unbounded when `None`.
    pub max_checkpoints: Option<usize>,
    pub network: NetworkConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            clients: 3,
            rounds: 24,
            edit_percent: 60,
            max_checkpoints: Some(16),
            network: NetworkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    Gesture { client: ClientId, action: Action },
    Submit { client: ClientId, applied_at: u64 },
    Sequenced { client: ClientId, resulting: u64 },
    Delivered { client: ClientId, resulting: u64 },
    Acked { client: ClientId, resulting: u64 },
    Failure { client: ClientId, reason: String },
}

/// A client's state after its view closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub client: ClientId,
    pub participant: ParticipantId,
    pub status: WaveletStatus,
    pub pending: bool,
    pub local: WaveletState,
    pub confirmed: WaveletState,
    pub contributions: WaveletContributions,
    pub revisions: Vec<Revision<AggregateOperation>>,
    pub published: Vec<Revision<AggregateOperation>>,
}

/// The server's state after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub state: WaveletState,
    pub contributions: WaveletContributions,
    pub revisions: Vec<Revision<AggregateOperation>>,
    pub history: Vec<TransformedWaveletDelta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    pub server: ServerSnapshot,
    pub clients: Vec<ClientSnapshot>,
    /// Whether all traffic drained within [`QUIESCE_ROUNDS`].
    pub quiesced: bool,
}

impl SimulationResult {
    /// Gestures that changed text, across all clients.
    #[must_use]
    pub fn edit_count(&self) -> usize {
        self.trace
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    TraceEventKind::Gesture {
                        action: Action::Insert { .. } | Action::Delete { .. },
                        ..
                    }
                )
            })
            .count()
    }
}

/// Drives clients, server and network round by round.
pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    network: SimulatedNetwork,
    server: SequencingServer,
    clients: Vec<SimulatedClient>,
    wavelet: WaveletId,
    trace: Vec<TraceEvent>,
}

impl Simulator {
    /// Seed the wavelet and open one view per client.
    ///
    /// # Errors
    ///
    /// Fails on an invalid config.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.clients == 0 {
            bail!("clients must be > 0");
        }
        let wavelet = WaveletId::new(format!("sim.example/w+{}", config.seed));
        let mut server = SequencingServer::new(wavelet.clone());

        let mut seed_ops: Vec<WaveletOp> = (0..config.clients)
            .map(|id| WaveletOp::add_participant(participant(id)))
            .collect();
        seed_ops.push(WaveletOp::document(
            DOCUMENT,
            DocOp::insert_text(0, SEED_TEXT, 0),
        ));
        let initial: HashedVersion = *server.version();
        server
            .submit(&ParticipantId::from("creator@sim"), initial, &seed_ops)
            .context("seeding wavelet")?;

        let clients = (0..config.clients)
            .map(|id| {
                SimulatedClient::new(id, wavelet.clone(), server.history(), config.max_checkpoints)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            network: SimulatedNetwork::new(config.network),
            server,
            clients,
            wavelet,
            trace: Vec::new(),
            config,
        })
    }

    /// Run the editing rounds, drain traffic, then close every view.
    ///
    /// # Errors
    ///
    /// Fails when the server cannot sequence a submission; client-side
    /// failures are recorded in the trace and the snapshots instead.
    #[tracing::instrument(skip_all, fields(seed = self.config.seed))]
    pub fn run(&mut self) -> Result<SimulationResult> {
        for round in 0..self.config.rounds {
            self.step(round, true)?;
        }

        let mut quiesced = false;
        let end = self.config.rounds + QUIESCE_ROUNDS;
        for round in self.config.rounds..end {
            if self.is_quiet() {
                quiesced = true;
                break;
            }
            self.step(round, false)?;
        }
        quiesced = quiesced || self.is_quiet();

        let clients = self.clients.iter_mut().map(snapshot).collect::<Vec<_>>();
        let mut tracker = self.server.tracker().clone();
        tracker.finish();
        let server = ServerSnapshot {
            state: tracker.state().clone(),
            contributions: tracker.contributions().clone(),
            revisions: tracker.revisions().revisions().cloned().collect(),
            history: self.server.history().to_vec(),
        };

        tracing::info!(
            seed = self.config.seed,
            version = server.state.version().version,
            trace = self.trace.len(),
            quiesced,
            "simulation complete"
        );

        Ok(SimulationResult {
            seed: self.config.seed,
            trace: std::mem::take(&mut self.trace),
            server,
            clients,
            quiesced,
        })
    }

    fn is_quiet(&self) -> bool {
        self.network.is_idle() && self.clients.iter().all(|c| !c.has_pending())
    }

    fn step(&mut self, round: u64, edit: bool) -> Result<()> {
        for envelope in self.network.deliver_ready(round) {
            self.deliver(round, envelope)?;
        }

        for index in 0..self.clients.len() {
            let client = &mut self.clients[index];
            let report = client.view_mut().drain_inbox()?;
            for (_, error) in report.failures {
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Failure {
                        client: index,
                        reason: error.to_string(),
                    },
                });
            }
            let mut outgoing = report.outgoing;

            if edit && self.rng.chance(self.config.edit_percent) {
                let client = &mut self.clients[index];
                let kind = match client.act(&mut self.rng) {
                    Ok(action) => TraceEventKind::Gesture {
                        client: index,
                        action,
                    },
                    Err(error) => TraceEventKind::Failure {
                        client: index,
                        reason: error.to_string(),
                    },
                };
                self.trace.push(TraceEvent { round, kind });
                outgoing.extend(client.view_mut().take_outgoing());
            }

            for delta in outgoing {
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Submit {
                        client: index,
                        applied_at: delta.applied_at.version,
                    },
                });
                let envelope = Envelope {
                    from: Endpoint::Client(index),
                    to: Endpoint::Server,
                    payload: Payload::Submit(delta),
                };
                self.network.send(envelope, round, &mut self.rng);
            }
        }
        Ok(())
    }

    fn deliver(&mut self, round: u64, envelope: Envelope) -> Result<()> {
        match (envelope.from, envelope.to, envelope.payload) {
            (Endpoint::Client(author), Endpoint::Server, Payload::Submit(submitted)) => {
                let delta = self
                    .server
                    .submit(&submitted.author, submitted.applied_at, &submitted.ops)
                    .with_context(|| format!("sequencing client {author}"))?;
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Sequenced {
                        client: author,
                        resulting: delta.resulting.version,
                    },
                });
                for client in 0..self.clients.len() {
                    let payload = if client == author {
                        Payload::Ack {
                            resulting: delta.resulting,
                            timestamp: delta.timestamp,
                        }
                    } else {
                        Payload::Delta(delta.clone())
                    };
                    let envelope = Envelope {
                        from: Endpoint::Server,
                        to: Endpoint::Client(client),
                        payload,
                    };
                    self.network.send(envelope, round, &mut self.rng);
                }
            }
            (Endpoint::Server, Endpoint::Client(client), Payload::Delta(delta)) => {
                tracing::debug!(client, resulting = delta.resulting.version, "delta delivered");
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Delivered {
                        client,
                        resulting: delta.resulting.version,
                    },
                });
                self.clients[client]
                    .inbox()
                    .deliver_delta(self.wavelet.clone(), delta)?;
            }
            (
                Endpoint::Server,
                Endpoint::Client(client),
                Payload::Ack {
                    resulting,
                    timestamp,
                },
            ) => {
                tracing::debug!(client, resulting = resulting.version, "ack delivered");
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Acked {
                        client,
                        resulting: resulting.version,
                    },
                });
                self.clients[client]
                    .inbox()
                    .deliver_ack(self.wavelet.clone(), resulting, timestamp)?;
            }
            (from, to, _) => bail!("misrouted envelope {from:?} -> {to:?}"),
        }
        Ok(())
    }
}

fn snapshot(client: &mut SimulatedClient) -> ClientSnapshot {
    let pending = client.has_pending();
    let published = client.close().to_vec();
    let id = client.id();
    let wavelet = client.wavelet();
    ClientSnapshot {
        client: id,
        participant: participant(id),
        status: wavelet.map_or(WaveletStatus::Closed, |w| w.status().clone()),
        pending,
        local: wavelet.map_or_else(
            || WaveletState::new(WaveletId::from("")),
            |w| w.local().clone(),
        ),
        confirmed: wavelet.map_or_else(
            || WaveletState::new(WaveletId::from("")),
            |w| w.confirmed().state().clone(),
        ),
        contributions: wavelet.map_or_else(
            || WaveletContributions::new(WaveletId::from("")),
            |w| w.confirmed().contributions().clone(),
        ),
        revisions: wavelet
            .map(|w| w.confirmed().revisions().revisions().cloned().collect())
            .unwrap_or_default(),
        published,
    }
}
