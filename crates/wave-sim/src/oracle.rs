use serde::{Deserialize, Serialize};
use wave_core::algebra::OpAlgebra;
use wave_core::contrib::WaveletContributions;
use wave_core::model::{DocumentId, ParticipantId};
use wave_core::op::{AggregateOperation, AuthoredOperation};
use wave_core::state::WaveletState;
use wave_core::view::WaveletStatus;

use crate::agent::ClientId;
use crate::{ClientSnapshot, ServerSnapshot, SimulationResult};

// ── Core result types ─────────────────────────────────────────────────────────

/// Oracle result for a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// Traffic was still in flight when the run ended.
    NotQuiesced,

    /// A client's wavelet failed permanently.
    FailedWavelet { client: ClientId, reason: String },

    /// A client's local document text differs from the server's.
    Divergence {
        client: ClientId,
        document: DocumentId,
        local: String,
        server: String,
    },

    /// Local and server participant sets differ.
    ParticipantDivergence {
        client: ClientId,
        local: Vec<ParticipantId>,
        server: Vec<ParticipantId>,
    },

    /// A client's confirmed state, version included, differs from the server.
    ConfirmedMismatch { client: ClientId, version: u64, server_version: u64 },

    /// An overlay does not cover its document exactly once.
    OverlayGap {
        /// `None` for the server.
        client: Option<ClientId>,
        document: DocumentId,
        covered: usize,
        len: usize,
    },

    /// A client attributes text differently from the server.
    ContributionMismatch { client: ClientId, document: DocumentId },

    /// A revision does not start where its predecessor ended.
    RevisionGap { index: usize, expected: u64, applied_at: u64 },

    /// Two consecutive revisions share an author.
    RevisionAdjacency { index: usize, author: ParticipantId },

    /// Replaying every revision does not rebuild the server documents.
    RevisionCoverage { detail: String },

    /// The history's creator-tagged composition disagrees with a revision.
    AttributionMismatch { index: usize, detail: String },

    /// A client built a different revision chain than the server.
    ClientRevisionMismatch { client: ClientId, client_count: usize, server_count: usize },

    /// A client's sink saw something other than its finalized revisions.
    PublishedMismatch { client: ClientId, published: usize, finalized: usize },
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Checks a finished run against the server's history.
pub struct WaveletOracle;

impl WaveletOracle {
    /// Run every check.
    #[must_use]
    pub fn check_all(result: &SimulationResult) -> OracleResult {
        let mut violations = Vec::new();
        if !result.quiesced {
            violations.push(InvariantViolation::NotQuiesced);
        }
        violations.extend(Self::check_overlay(
            None,
            &result.server.state,
            &result.server.contributions,
        ));
        violations.extend(Self::check_revisions(&result.server));
        for client in &result.clients {
            violations.extend(Self::check_client(client, &result.server));
        }
        OracleResult::from_violations(violations)
    }

    /// Every client sees the server's text, version, attribution and
    /// revision chain.
    #[must_use]
    pub fn check_client(client: &ClientSnapshot, server: &ServerSnapshot) -> Vec<InvariantViolation> {
        let id = client.client;
        let mut violations = Vec::new();

        if let WaveletStatus::Failed(reason) = &client.status {
            violations.push(InvariantViolation::FailedWavelet {
                client: id,
                reason: reason.clone(),
            });
            return violations;
        }

        for (document, local, server_text) in diverging_documents(&client.local, &server.state) {
            violations.push(InvariantViolation::Divergence {
                client: id,
                document,
                local,
                server: server_text,
            });
        }
        if client.local.participants() != server.state.participants() {
            violations.push(InvariantViolation::ParticipantDivergence {
                client: id,
                local: client.local.participants().iter().cloned().collect(),
                server: server.state.participants().iter().cloned().collect(),
            });
        }
        if client.confirmed != server.state {
            violations.push(InvariantViolation::ConfirmedMismatch {
                client: id,
                version: client.confirmed.version().version,
                server_version: server.state.version().version,
            });
        }

        for document in server.state.documents().keys() {
            if client.contributions.ranges(document) != server.contributions.ranges(document) {
                violations.push(InvariantViolation::ContributionMismatch {
                    client: id,
                    document: document.clone(),
                });
            }
        }
        violations.extend(Self::check_overlay(
            Some(id),
            &client.confirmed,
            &client.contributions,
        ));

        if client.revisions != server.revisions {
            violations.push(InvariantViolation::ClientRevisionMismatch {
                client: id,
                client_count: client.revisions.len(),
                server_count: server.revisions.len(),
            });
        }
        if client.published != client.revisions {
            violations.push(InvariantViolation::PublishedMismatch {
                client: id,
                published: client.published.len(),
                finalized: client.revisions.len(),
            });
        }
        violations
    }

    /// Overlay spans of every document sum to the document's length.
    #[must_use]
    pub fn check_overlay(
        client: Option<ClientId>,
        state: &WaveletState,
        contributions: &WaveletContributions,
    ) -> Vec<InvariantViolation> {
        state
            .documents()
            .iter()
            .filter_map(|(document, doc)| {
                let covered = contributions
                    .overlay(document)
                    .map_or(0, |overlay| overlay.spans().iter().map(|s| s.len).sum::<usize>());
                (covered != doc.len()).then(|| InvariantViolation::OverlayGap {
                    client,
                    document: document.clone(),
                    covered,
                    len: doc.len(),
                })
            })
            .collect()
    }

    /// The revision chain is contiguous, alternates authors and replays to
    /// the current documents.
    #[must_use]
    pub fn check_revisions(server: &ServerSnapshot) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        let mut expected = 0;
        let mut previous: Option<&ParticipantId> = None;
        for (index, revision) in server.revisions.iter().enumerate() {
            if revision.applied_at.version != expected {
                violations.push(InvariantViolation::RevisionGap {
                    index,
                    expected,
                    applied_at: revision.applied_at.version,
                });
            }
            if previous == Some(&revision.author) {
                violations.push(InvariantViolation::RevisionAdjacency {
                    index,
                    author: revision.author.clone(),
                });
            }
            expected = revision.resulting.version;
            previous = Some(&revision.author);
        }
        if expected != server.state.version().version {
            violations.push(InvariantViolation::RevisionGap {
                index: server.revisions.len(),
                expected: server.state.version().version,
                applied_at: expected,
            });
        }

        match AggregateOperation::compose_all(server.revisions.iter().map(|r| &r.op)) {
            Ok(composed) => {
                let mut rebuilt = WaveletState::new(server.state.id().clone());
                let applied = composed.map_or(Ok(()), |op| rebuilt.apply_aggregate(&op));
                if let Err(e) = applied {
                    violations.push(InvariantViolation::RevisionCoverage {
                        detail: e.to_string(),
                    });
                } else if let Some((document, rebuilt_text, server_text)) =
                    diverging_documents(&rebuilt, &server.state).into_iter().next()
                {
                    violations.push(InvariantViolation::RevisionCoverage {
                        detail: format!(
                            "{document}: replay gives {rebuilt_text:?}, server has {server_text:?}"
                        ),
                    });
                }
            }
            Err(e) => violations.push(InvariantViolation::RevisionCoverage {
                detail: e.to_string(),
            }),
        }
        violations.extend(Self::check_attribution(server));
        violations
    }

    /// Compose the whole history with creators kept: each merged segment
    /// must be exactly one revision, with the same author and the same op.
    #[must_use]
    pub fn check_attribution(server: &ServerSnapshot) -> Vec<InvariantViolation> {
        let composed = server.history.iter().try_fold(AuthoredOperation::default(), |acc, delta| {
            AuthoredOperation::from_ops(delta.author.clone(), &delta.ops)
                .and_then(|op| acc.compose(&op))
        });
        let authored = match composed {
            Ok(authored) => authored,
            Err(e) => {
                return vec![InvariantViolation::AttributionMismatch {
                    index: 0,
                    detail: e.to_string(),
                }];
            }
        };

        let segments = authored.segments();
        let mut violations: Vec<InvariantViolation> = segments
            .iter()
            .zip(&server.revisions)
            .enumerate()
            .filter_map(|(index, (segment, revision))| {
                let detail = if segment.creator != revision.author {
                    format!("segment by {}, revision by {}", segment.creator, revision.author)
                } else if segment.op != revision.op {
                    format!("{} segment op differs from its revision", segment.creator)
                } else {
                    return None;
                };
                Some(InvariantViolation::AttributionMismatch { index, detail })
            })
            .collect();
        if segments.len() != server.revisions.len() {
            violations.push(InvariantViolation::AttributionMismatch {
                index: segments.len().min(server.revisions.len()),
                detail: format!(
                    "{} creator segments, {} revisions",
                    segments.len(),
                    server.revisions.len()
                ),
            });
        }
        violations
    }
}

/// Documents whose text differs, as `(document, left, right)`. A document
/// missing on one side reads as empty.
fn diverging_documents(left: &WaveletState, right: &WaveletState) -> Vec<(DocumentId, String, String)> {
    let text = |state: &WaveletState, id: &DocumentId| {
        state.document(id).map(wave_core::doc::Document::text).unwrap_or_default()
    };
    let mut ids: Vec<&DocumentId> = left.documents().keys().chain(right.documents().keys()).collect();
    ids.sort();
    ids.dedup();
    ids.into_iter()
        .filter_map(|id| {
            let (l, r) = (text(left, id), text(right, id));
            (l != r).then(|| (id.clone(), l, r))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SimulationConfig, Simulator};

    fn run(seed: u64) -> SimulationResult {
        let config = SimulationConfig {
            seed,
            ..SimulationConfig::default()
        };
        Simulator::new(config).expect("sim").run().expect("run")
    }

    #[test]
    fn clean_run_passes() {
        let result = run(1);
        let oracle = WaveletOracle::check_all(&result);
        assert!(oracle.passed, "violations: {:?}", oracle.violations);
    }

    #[test]
    fn tampered_text_is_divergence() {
        let mut result = run(2);
        let op = AggregateOperation::from_doc_op(
            crate::agent::DOCUMENT,
            wave_core::doc::DocOp::insert_text(0, "!", local_len(&result.clients[0])),
        );
        result.clients[0].local.apply_aggregate(&op).expect("apply");

        let violations = WaveletOracle::check_client(&result.clients[0], &result.server);
        assert!(matches!(
            violations.first(),
            Some(InvariantViolation::Divergence { client: 0, .. })
        ));
    }

    #[test]
    fn dropped_revision_is_a_gap() {
        let mut result = run(3);
        assert!(result.server.revisions.len() >= 2);
        result.server.revisions.remove(0);
        let violations = WaveletOracle::check_revisions(&result.server);
        assert!(violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::RevisionGap { index: 0, .. })));
    }

    #[test]
    fn unpublished_revision_is_flagged() {
        let mut result = run(4);
        result.clients[1].published.clear();
        let violations = WaveletOracle::check_client(&result.clients[1], &result.server);
        assert!(violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::PublishedMismatch { client: 1, .. })));
    }

    #[test]
    fn misattributed_revision_is_flagged() {
        let mut result = run(5);
        result.server.revisions[0].author = "intruder@sim".into();
        let violations = WaveletOracle::check_attribution(&result.server);
        assert!(violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::AttributionMismatch { index: 0, .. })));
    }

    #[test]
    fn clean_history_attributes_every_revision() {
        let result = run(6);
        assert!(WaveletOracle::check_attribution(&result.server).is_empty());
    }

    fn local_len(client: &ClientSnapshot) -> usize {
        client
            .local
            .document(&crate::agent::DOCUMENT.into())
            .map_or(0, wave_core::doc::Document::len)
    }
}
