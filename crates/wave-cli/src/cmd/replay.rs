//! `wv replay`: apply a delta log and report text, attribution and revisions.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use wave_core::contrib::ContributionRange;
use wave_core::model::{DocumentId, WaveletId};
use wave_core::revision::RevisionScope;
use wave_core::tracker::DeltaTracker;

use crate::cmd::{format_timestamp, load_deltas};
use crate::output::{DeltaFailure, OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Delta log, one JSON delta per line.
    #[arg(value_name = "LOG")]
    pub log: PathBuf,

    /// Wavelet the log belongs to; seeds the version hash chain.
    #[arg(long)]
    pub wavelet: String,

    /// Group revisions by edits to this document only.
    #[arg(long)]
    pub document: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    wavelet: String,
    version: u64,
    hash: String,
    participants: Vec<String>,
    documents: Vec<DocumentOutput>,
    revisions: Vec<RevisionOutput>,
}

#[derive(Debug, Serialize)]
struct DocumentOutput {
    id: String,
    text: String,
    contributions: Vec<ContributionRange>,
}

#[derive(Debug, Serialize)]
struct RevisionOutput {
    index: usize,
    author: String,
    applied_at: u64,
    resulting: u64,
    deltas: usize,
    timestamp: String,
}

/// Execute `wv replay`.
pub fn run_replay(args: &ReplayArgs, output: OutputMode, _project_root: &Path) -> Result<()> {
    let deltas = load_deltas(&args.log)?;
    let scope = args
        .document
        .as_deref()
        .map_or(RevisionScope::Wavelet, |d| RevisionScope::Document(DocumentId::from(d)));
    let mut tracker = DeltaTracker::new(WaveletId::new(args.wavelet.clone()), scope);

    for (index, delta) in deltas.iter().enumerate() {
        if let Err(e) = tracker.apply(delta) {
            tracing::error!(index, code = %e.code(), error = %e, "replay stopped");
            DeltaFailure::new(e.code(), e.to_string(), index + 1).report(output)?;
            anyhow::bail!("delta {} of {} does not apply", index + 1, args.log.display());
        }
    }
    tracker.finish();

    let state = tracker.state();
    let out = ReplayOutput {
        wavelet: state.id().to_string(),
        version: state.version().version,
        hash: state.version().short_hash(),
        participants: state.participants().iter().map(ToString::to_string).collect(),
        documents: state
            .documents()
            .iter()
            .map(|(id, doc)| DocumentOutput {
                id: id.to_string(),
                text: doc.text(),
                contributions: tracker.contributions().ranges(id),
            })
            .collect(),
        revisions: tracker
            .revisions()
            .revisions()
            .map(|r| RevisionOutput {
                index: r.index,
                author: r.author.to_string(),
                applied_at: r.applied_at.version,
                resulting: r.resulting.version,
                deltas: r.delta_count,
                timestamp: format_timestamp(r.timestamp),
            })
            .collect(),
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(w, "wavelet id={} version={} hash={}", out.wavelet, out.version, out.hash)?;
            for doc in &out.documents {
                writeln!(w, "document id={} len={} text={:?}", doc.id, doc.text.chars().count(), doc.text)?;
                for range in &doc.contributions {
                    writeln!(
                        w,
                        "contribution document={} start={} end={} author={}",
                        doc.id,
                        range.start,
                        range.end,
                        author_label(range)
                    )?;
                }
            }
            for r in &out.revisions {
                writeln!(
                    w,
                    "revision index={} author={} applied_at={} resulting={} deltas={} timestamp={}",
                    r.index, r.author, r.applied_at, r.resulting, r.deltas, r.timestamp
                )?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, &format!("Wavelet {}", out.wavelet))?;
            pretty_kv(w, "Version", format!("{} ({})", out.version, out.hash))?;
            pretty_kv(w, "Members", out.participants.join(", "))?;
            for doc in &out.documents {
                writeln!(w)?;
                pretty_section(w, &format!("Document {}", doc.id))?;
                writeln!(w, "{}", doc.text)?;
                for range in &doc.contributions {
                    writeln!(w, "  [{:>5}, {:>5})  {}", range.start, range.end, author_label(range))?;
                }
            }
            writeln!(w)?;
            pretty_section(w, "Revisions")?;
            for r in &out.revisions {
                writeln!(
                    w,
                    "#{:<4} {:<24} v{}..v{}  {} deltas  {}",
                    r.index, r.author, r.applied_at, r.resulting, r.deltas, r.timestamp
                )?;
            }
            Ok(())
        },
    )
}

fn author_label(range: &ContributionRange) -> String {
    range
        .author
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string)
}
