//! Seed campaigns: one session shape, many seeds, first failure kept for replay.

use std::ops::Range;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::network::NetworkConfig;
use crate::oracle::{InvariantViolation, OracleResult, WaveletOracle};
use crate::{SimulationConfig, SimulationResult, Simulator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub seed_range: Range<u64>,
    pub clients: usize,
    pub rounds: u64,
    /// Percent chance per client per round of a gesture.
    pub edit_percent: u8,
    /// Undo depth per client; `None` keeps every checkpoint.
    pub max_checkpoints: Option<usize>,
    pub max_delay_rounds: u8,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let session = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            clients: session.clients,
            rounds: session.rounds,
            edit_percent: session.edit_percent,
            max_checkpoints: session.max_checkpoints,
            max_delay_rounds: session.network.max_delay_rounds,
        }
    }
}

impl CampaignConfig {
    /// The session this campaign runs for `seed`.
    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            clients: self.clients,
            rounds: self.rounds,
            edit_percent: self.edit_percent,
            max_checkpoints: self.max_checkpoints,
            network: NetworkConfig {
                max_delay_rounds: self.max_delay_rounds,
            },
        }
    }

    /// # Errors
    ///
    /// Fails on an empty seed range, zero clients or rounds, or an edit
    /// percentage above 100.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.seed_range.is_empty(), "campaign needs at least one seed");
        ensure!(self.clients > 0, "campaign needs at least one client");
        ensure!(self.rounds > 0, "campaign needs at least one round");
        ensure!(
            self.edit_percent <= 100,
            "edit_percent {} is not a percentage",
            self.edit_percent
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Text-changing gestures summed over every seed.
    pub edits: usize,
}

impl CampaignReport {
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, seed: u64, trace: &DetailedTrace) {
        self.seeds_run += 1;
        self.edits += trace.result.edit_count();
        if trace.oracle.passed {
            self.seeds_passed += 1;
            return;
        }
        tracing::warn!(seed, violations = trace.oracle.violations.len(), "seed diverged");
        self.first_failure.get_or_insert(seed);
        self.failures.push(SeedFailure {
            seed,
            violations: trace.oracle.violations.iter().map(format_violation).collect(),
        });
    }
}

/// One seed's run together with the oracle's verdict on it.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Run every seed in `config.seed_range`.
///
/// # Errors
///
/// Fails when the config is invalid or a session cannot be built or run.
/// Oracle violations are reported in the returned report, not as errors.
#[tracing::instrument(skip_all, fields(seeds = ?config.seed_range, clients = config.clients))]
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;
    let mut report = CampaignReport::default();
    for seed in config.seed_range.clone() {
        report.record(seed, &replay_seed(seed, config)?);
    }
    tracing::info!(
        passed = report.seeds_passed,
        failed = report.failures.len(),
        edits = report.edits,
        "campaign finished"
    );
    Ok(report)
}

/// `Ok(Ok(()))` when `seed` converges, `Ok(Err(violations))` when it does not.
///
/// # Errors
///
/// Fails only when the session itself cannot run.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let trace = replay_seed(seed, config)?;
    Ok(if trace.oracle.passed {
        Ok(())
    } else {
        Err(trace.oracle.violations)
    })
}

/// Run `seed` alone and keep the whole trace.
///
/// # Errors
///
/// Fails when the config is invalid or the session cannot run.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;

    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let oracle = WaveletOracle::check_all(&result);

    Ok(DetailedTrace { result, oracle })
}

/// One line per violation, prefixed with its kind.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::NotQuiesced => "NotQuiesced: traffic still in flight at end of run".into(),
        InvariantViolation::FailedWavelet { client, reason } => {
            format!("FailedWavelet: client {client} failed: {reason}")
        }
        InvariantViolation::Divergence {
            client,
            document,
            local,
            server,
        } => format!("Divergence: client {client} has {local:?} in {document}, server has {server:?}"),
        InvariantViolation::ParticipantDivergence {
            client,
            local,
            server,
        } => format!("ParticipantDivergence: client {client} has {local:?}, server has {server:?}"),
        InvariantViolation::ConfirmedMismatch {
            client,
            version,
            server_version,
        } => format!(
            "ConfirmedMismatch: client {client} confirmed at {version}, server at {server_version}"
        ),
        InvariantViolation::OverlayGap {
            client,
            document,
            covered,
            len,
        } => {
            let who = client.map_or_else(|| "server".to_string(), |c| format!("client {c}"));
            format!("OverlayGap: {who} covers {covered} of {len} items in {document}")
        }
        InvariantViolation::ContributionMismatch { client, document } => {
            format!("ContributionMismatch: client {client} attributes {document} differently")
        }
        InvariantViolation::RevisionGap {
            index,
            expected,
            applied_at,
        } => format!("RevisionGap: revision {index} applied at {applied_at}, expected {expected}"),
        InvariantViolation::RevisionAdjacency { index, author } => {
            format!("RevisionAdjacency: revision {index} repeats author {author}")
        }
        InvariantViolation::RevisionCoverage { detail } => format!("RevisionCoverage: {detail}"),
        InvariantViolation::AttributionMismatch { index, detail } => {
            format!("AttributionMismatch: revision {index}: {detail}")
        }
        InvariantViolation::ClientRevisionMismatch {
            client,
            client_count,
            server_count,
        } => format!(
            "ClientRevisionMismatch: client {client} built {client_count} revisions, server {server_count}"
        ),
        InvariantViolation::PublishedMismatch {
            client,
            published,
            finalized,
        } => format!(
            "PublishedMismatch: client {client} published {published} of {finalized} revisions"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_config_default_is_valid() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn campaign_config_empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn campaign_config_zero_clients_rejected() {
        let config = CampaignConfig {
            clients: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sim_config_for_seed_uses_correct_seed() {
        let config = CampaignConfig::default();
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.clients, config.clients);
        assert_eq!(sim.network.max_delay_rounds, config.max_delay_rounds);
    }

    #[test]
    fn run_single_seed_passes() {
        let config = CampaignConfig {
            seed_range: 0..1,
            ..CampaignConfig::default()
        };
        let result = run_single_seed(0, &config).expect("sim should not error");
        assert!(result.is_ok(), "seed 0 should pass: {result:?}");
    }

    #[test]
    fn run_campaign_all_seeds_pass() {
        let config = CampaignConfig {
            seed_range: 0..40,
            clients: 4,
            rounds: 20,
            max_delay_rounds: 4,
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert_eq!(report.seeds_run, 40);
        assert!(
            report.all_passed(),
            "campaign failed: first at seed {:?}: {:?}",
            report.first_failure,
            report.failures.first(),
        );
        assert!(report.edits > 0);
    }

    #[test]
    fn tight_undo_history_still_converges() {
        let config = CampaignConfig {
            seed_range: 100..120,
            edit_percent: 90,
            max_checkpoints: Some(2),
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert!(report.all_passed(), "{:?}", report.failures.first());
    }

    #[test]
    fn replay_is_deterministic() {
        let config = CampaignConfig::default();
        let a = replay_seed(7, &config).expect("replay 1");
        let b = replay_seed(7, &config).expect("replay 2");
        assert_eq!(a.result, b.result);
        assert_eq!(a.oracle, b.oracle);
    }

    #[test]
    fn format_violation_produces_readable_strings() {
        let s = format_violation(&InvariantViolation::OverlayGap {
            client: None,
            document: "main".into(),
            covered: 3,
            len: 4,
        });
        assert!(s.starts_with("OverlayGap"));
        assert!(s.contains("server covers 3 of 4"));
    }

    #[test]
    fn detailed_trace_serializes() {
        let trace = replay_seed(3, &CampaignConfig::default()).expect("replay");
        let json = serde_json::to_value(&trace.result.trace).expect("serialize trace");
        assert_eq!(
            json.as_array().map(Vec::len),
            Some(trace.result.trace.len())
        );
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(24))]

        #[test]
        fn any_session_shape_converges(
            seed in 0u64..10_000,
            clients in 1usize..5,
            edit_percent in 10u8..=100,
            max_delay_rounds in 0u8..6,
        ) {
            let config = CampaignConfig {
                seed_range: seed..seed + 1,
                clients,
                rounds: 12,
                edit_percent,
                max_delay_rounds,
                ..CampaignConfig::default()
            };
            let result = run_single_seed(seed, &config).expect("sim should not error");
            proptest::prop_assert!(result.is_ok(), "seed {} failed: {:?}", seed, result);
        }
    }
}
