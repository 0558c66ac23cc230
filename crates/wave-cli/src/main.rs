#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "wv: inspect wavelet delta logs and run convergence simulations",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn format_flag(&self) -> Option<OutputMode> {
        self.format.or(self.json.then_some(OutputMode::Json))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Apply a delta log and show text, attribution and revisions",
        after_help = "EXAMPLES:\n    wv replay deltas.jsonl --wavelet example.com/w+abc\n\n\
                      # Revisions of one document only\n    wv replay deltas.jsonl --wavelet example.com/w+abc --document main"
    )]
    Replay(cmd::replay::ReplayArgs),

    #[command(
        about = "Read a document's revisions backward, page by page",
        after_help = "EXAMPLES:\n    wv history deltas.jsonl --document main --count 10\n\n\
                      # Split at tagged versions instead of author changes\n    wv history deltas.jsonl --document main --tag 40 --tag 95"
    )]
    History(cmd::history::HistoryArgs),

    #[command(about = "Deterministic multi-client convergence campaigns")]
    Sim(cmd::sim::SimArgs),

    #[command(about = "Show resolved configuration")]
    Config(cmd::config::ConfigArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("WAVE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "wave=debug,info"
        } else {
            "wave=info,warn"
        })
    });

    let format = env::var("WAVE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = std::env::current_dir()?;
    let config = wave_core::config::resolve_config(&project_root, cli.json)?;
    let output = OutputMode::resolve(cli.format_flag(), &config.resolved_output);
    let max_checkpoints = config.project.undo.max_checkpoints;

    match cli.command {
        Commands::Replay(ref args) => cmd::replay::run_replay(args, output, &project_root),
        Commands::History(ref args) => {
            cmd::history::run_history(args, output, config.page_size, &project_root)
        }
        Commands::Sim(ref args) => cmd::sim::run_sim(args, output, max_checkpoints),
        Commands::Config(ref args) => cmd::config::run_config(args, &project_root, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_sets_output_mode() {
        let cli = Cli::parse_from(["wv", "--json", "sim", "run"]);
        assert_eq!(cli.format_flag(), Some(OutputMode::Json));
    }

    #[test]
    fn format_flag_after_subcommand() {
        let cli = Cli::parse_from(["wv", "replay", "log.jsonl", "--wavelet", "w", "--format", "text"]);
        assert_eq!(cli.format_flag(), Some(OutputMode::Text));
    }

    #[test]
    fn no_flag_defers_to_config() {
        let cli = Cli::parse_from(["wv", "config", "show"]);
        assert_eq!(cli.format_flag(), None);
    }

    #[test]
    fn history_tags_repeat() {
        let cli = Cli::parse_from([
            "wv", "history", "log.jsonl", "--document", "main", "--tag", "3", "--tag", "9",
        ]);
        let Commands::History(args) = cli.command else {
            panic!("expected history");
        };
        assert_eq!(args.tags, vec![3, 9]);
        assert_eq!(args.count, None);
    }

    #[test]
    fn all_subcommands_parse() {
        let subcommands = [
            vec!["wv", "replay", "x.jsonl", "--wavelet", "w"],
            vec!["wv", "history", "x.jsonl", "--document", "d"],
            vec!["wv", "sim", "run", "--seeds", "3"],
            vec!["wv", "sim", "replay", "--seed", "3", "--clients", "2"],
            vec!["wv", "config", "show", "--project"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "Failed to parse: {args:?}: {:?}", result.err());
        }
    }
}
