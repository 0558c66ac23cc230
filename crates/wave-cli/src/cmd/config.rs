use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::Path;
use wave_core::config::{EffectiveConfig, load_project_config, resolve_config};

use crate::output::OutputMode;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show resolved or raw configuration
    Show(ShowArgs),
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Show the project file only, without env or user layers
    #[arg(long)]
    project: bool,
}

pub fn run_config(args: &ConfigArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    match &args.command {
        ConfigCommand::Show(show) => run_show(show, project_root, output),
    }
}

fn run_show(args: &ShowArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    if args.project {
        let project = load_project_config(project_root)?;
        if output.is_json() {
            println!("{}", serde_json::to_string_pretty(&project)?);
        } else {
            print!("{}", toml::to_string_pretty(&project).context("Failed to render config")?);
        }
        return Ok(());
    }

    let effective = resolve_config(project_root, output.is_json())?;
    print_effective(&effective, output)
}

fn print_effective(effective: &EffectiveConfig, output: OutputMode) -> Result<()> {
    if output.is_json() {
        println!("{}", serde_json::to_string_pretty(effective)?);
        return Ok(());
    }
    println!("output = {:?}", effective.resolved_output);
    println!("history.page_size = {}", effective.page_size);
    match effective.project.undo.max_checkpoints {
        Some(n) => println!("undo.max_checkpoints = {n}"),
        None => println!("undo.max_checkpoints = unbounded"),
    }
    Ok(())
}
