#![forbid(unsafe_code)]

use anyhow::{Result, bail};
use wave_sim::campaign::{CampaignConfig, run_campaign};

fn main() -> Result<()> {
    let report = run_campaign(&CampaignConfig::default())?;

    println!(
        "campaign complete: seeds={} passed={} edits={}",
        report.seeds_run, report.seeds_passed, report.edits
    );

    if let Some(seed) = report.first_failure {
        for failure in report.failures.iter().filter(|f| f.seed == seed) {
            for violation in &failure.violations {
                eprintln!("seed {seed}: {violation}");
            }
        }
        bail!("{} of {} seeds failed", report.failures.len(), report.seeds_run);
    }
    Ok(())
}
