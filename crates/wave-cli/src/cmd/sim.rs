//! `wv sim`: seeded editing sessions checked for convergence.

use std::process;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use wave_sim::agent::DOCUMENT;
use wave_sim::campaign::{CampaignConfig, CampaignReport, format_violation, replay_seed, run_campaign};
use wave_sim::{ClientSnapshot, TraceEvent};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a campaign of seeded sessions",
        long_about = "Every seed runs a session of clients editing one document through a\n\
                      sequencing server. After the network drains, each client must agree\n\
                      with the server on text, attribution and revision history.",
        after_help = "EXAMPLES:\n    wv sim run --seeds 100\n\n\
                      # Busier sessions over a slower network\n    wv sim run --seeds 200 --clients 6 --edit-percent 90 --max-delay 6"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Rerun one seed and show its trace",
        after_help = "EXAMPLES:\n    wv sim replay --seed 42 --format json"
    )]
    Replay(SimReplayArgs),
}

/// Session shape, shared by `run` and `replay` so a failing seed replays as it ran.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    #[arg(long, default_value = "3")]
    pub clients: usize,

    #[arg(long, default_value = "24")]
    pub rounds: u64,

    /// Chance per client per round of a gesture (0-100).
    #[arg(long, default_value = "60")]
    pub edit_percent: u8,

    /// Upper bound on delivery delay, in rounds.
    #[arg(long, default_value = "3")]
    pub max_delay: u8,
}

impl SessionArgs {
    fn campaign(&self, seeds: std::ops::Range<u64>, max_checkpoints: Option<usize>) -> CampaignConfig {
        CampaignConfig {
            seed_range: seeds,
            clients: self.clients,
            rounds: self.rounds,
            edit_percent: self.edit_percent,
            max_checkpoints,
            max_delay_rounds: self.max_delay,
        }
    }
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    #[arg(long, default_value = "100")]
    pub seeds: u64,

    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    #[arg(long)]
    pub seed: u64,

    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Debug, Serialize)]
struct CampaignOutput {
    seeds_run: usize,
    seeds_passed: usize,
    first_failure: Option<u64>,
    edits: usize,
    all_passed: bool,
    failures: Vec<SeedOutput>,
}

#[derive(Debug, Serialize)]
struct SeedOutput {
    seed: u64,
    violations: Vec<String>,
}

impl From<&CampaignReport> for CampaignOutput {
    fn from(report: &CampaignReport) -> Self {
        Self {
            seeds_run: report.seeds_run,
            seeds_passed: report.seeds_passed,
            first_failure: report.first_failure,
            edits: report.edits,
            all_passed: report.all_passed(),
            failures: report
                .failures
                .iter()
                .map(|f| SeedOutput {
                    seed: f.seed,
                    violations: f.violations.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    edits: usize,
    version: u64,
    text: String,
    quiesced: bool,
    oracle_passed: bool,
    violations: Vec<String>,
    clients: Vec<ClientLine>,
    trace: Vec<TraceEvent>,
}

#[derive(Debug, Serialize)]
struct ClientLine {
    participant: String,
    status: String,
    revisions: usize,
    published: usize,
}

impl From<&ClientSnapshot> for ClientLine {
    fn from(client: &ClientSnapshot) -> Self {
        Self {
            participant: client.participant.to_string(),
            status: client.status.to_string(),
            revisions: client.revisions.len(),
            published: client.published.len(),
        }
    }
}

pub fn run_sim(args: &SimArgs, output: OutputMode, max_checkpoints: Option<usize>) -> Result<()> {
    let passed = match &args.command {
        SimCommand::Run(run) => sim_run(run, output, max_checkpoints)?,
        SimCommand::Replay(replay) => sim_replay(replay, output, max_checkpoints)?,
    };
    if !passed {
        process::exit(1);
    }
    Ok(())
}

fn sim_run(args: &SimRunArgs, output: OutputMode, max_checkpoints: Option<usize>) -> Result<bool> {
    let seeds = args.seed_start..args.seed_start.saturating_add(args.seeds);
    let report = run_campaign(&args.session.campaign(seeds, max_checkpoints))?;
    let out = CampaignOutput::from(&report);
    let session = &args.session;

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "campaign seeds_run={} clients={} rounds={} edit_percent={} max_delay={}",
                out.seeds_run, session.clients, session.rounds, session.edit_percent, session.max_delay
            )?;
            writeln!(
                w,
                "results passed={} failed={} edits={} all_passed={}",
                out.seeds_passed,
                out.failures.len(),
                out.edits,
                out.all_passed
            )?;
            for failure in &out.failures {
                writeln!(w, "failure seed={} violations={}", failure.seed, failure.violations.len())?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, "Convergence campaign")?;
            pretty_kv(w, "Seeds", out.seeds_run.to_string())?;
            pretty_kv(w, "Clients", session.clients.to_string())?;
            pretty_kv(w, "Edits", out.edits.to_string())?;
            pretty_kv(
                w,
                "Passed",
                format!("{} of {}", out.seeds_passed, out.seeds_run),
            )?;
            for failure in out.failures.iter().take(5) {
                writeln!(w, "\nseed {}", failure.seed)?;
                for violation in &failure.violations {
                    writeln!(w, "  {violation}")?;
                }
            }
            if let Some(seed) = out.first_failure {
                writeln!(w, "\nrerun with: wv sim replay --seed {seed}")?;
            }
            Ok(())
        },
    )?;
    Ok(report.all_passed())
}

fn sim_replay(args: &SimReplayArgs, output: OutputMode, max_checkpoints: Option<usize>) -> Result<bool> {
    let config = args.session.campaign(args.seed..args.seed.saturating_add(1), max_checkpoints);
    let detailed = replay_seed(args.seed, &config)?;
    let result = &detailed.result;

    let out = ReplayOutput {
        seed: args.seed,
        edits: result.edit_count(),
        version: result.server.state.version().version,
        text: result
            .server
            .state
            .document(&DOCUMENT.into())
            .map(wave_core::Document::text)
            .unwrap_or_default(),
        quiesced: result.quiesced,
        oracle_passed: detailed.oracle.passed,
        violations: detailed.oracle.violations.iter().map(format_violation).collect(),
        clients: result.clients.iter().map(ClientLine::from).collect(),
        trace: result.trace.clone(),
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "replay seed={} edits={} version={} quiesced={} oracle_passed={} trace_events={}",
                out.seed,
                out.edits,
                out.version,
                out.quiesced,
                out.oracle_passed,
                out.trace.len()
            )?;
            for client in &out.clients {
                writeln!(
                    w,
                    "client participant={} status={} revisions={} published={}",
                    client.participant, client.status, client.revisions, client.published
                )?;
            }
            for violation in &out.violations {
                writeln!(w, "violation {violation}")?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, &format!("Seed {}", out.seed))?;
            pretty_kv(w, "Edits", out.edits.to_string())?;
            pretty_kv(w, "Version", out.version.to_string())?;
            pretty_kv(w, "Text", format!("{:?}", out.text))?;
            pretty_kv(w, "Converged", out.oracle_passed.to_string())?;
            writeln!(w)?;
            pretty_section(w, "Clients")?;
            for client in &out.clients {
                writeln!(
                    w,
                    "{:<16} {:<8} {:>3} revisions  {:>3} published",
                    client.participant, client.status, client.revisions, client.published
                )?;
            }
            if !out.violations.is_empty() {
                writeln!(w)?;
                pretty_section(w, "Violations")?;
                for violation in &out.violations {
                    writeln!(w, "{violation}")?;
                }
            }
            Ok(())
        },
    )?;
    Ok(detailed.oracle.passed)
}
