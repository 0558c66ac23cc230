//! `wv history`: walk a document's revisions backward from its head.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use wave_core::model::DocumentId;
use wave_core::revision::{HistoryReader, InMemoryDeltaLog, RevisionPolicy};

use crate::cmd::{format_timestamp, load_deltas};
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Delta log, one JSON delta per line.
    #[arg(value_name = "LOG")]
    pub log: PathBuf,

    /// Document whose history to read.
    #[arg(long)]
    pub document: String,

    /// Stop after this many revisions.
    #[arg(long)]
    pub count: Option<usize>,

    /// Deltas fetched per page. Defaults to the configured page size.
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Versions at which revisions were tagged; splits revisions at tags
    /// instead of at author changes. Repeatable.
    #[arg(long = "tag", value_name = "VERSION")]
    pub tags: Vec<u64>,

    /// Include each revision's composed document op.
    #[arg(long)]
    pub ops: bool,
}

#[derive(Debug, Serialize)]
struct HistoryOutput {
    document: String,
    head: Option<u64>,
    page_size: usize,
    revisions: Vec<RevisionOutput>,
}

#[derive(Debug, Serialize)]
struct RevisionOutput {
    index: usize,
    author: String,
    applied_at: u64,
    resulting: u64,
    deltas: usize,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    op: Option<serde_json::Value>,
}

/// Execute `wv history`.
pub fn run_history(
    args: &HistoryArgs,
    output: OutputMode,
    configured_page_size: usize,
    _project_root: &Path,
) -> Result<()> {
    let deltas = load_deltas(&args.log)?;
    let document = DocumentId::new(args.document.clone());
    let log = InMemoryDeltaLog::from_deltas(&deltas);
    let head = log.head(&document);

    let policy = if args.tags.is_empty() {
        RevisionPolicy::AuthorRuns
    } else {
        RevisionPolicy::Tags(args.tags.clone())
    };
    let reader = HistoryReader::new(log, document.clone())
        .with_page_size(args.page_size.unwrap_or(configured_page_size))
        .with_policy(policy);
    let page_size = reader.page_size();

    let revisions = match head {
        Some(head) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .context("Failed to start history runtime")?;
            runtime.block_on(
                reader
                    .revisions(head)
                    .take(args.count.unwrap_or(usize::MAX))
                    .try_collect::<Vec<_>>(),
            )?
        }
        None => {
            tracing::info!(document = %document, "document has no history");
            Vec::new()
        }
    };

    let out = HistoryOutput {
        document: document.to_string(),
        head: head.map(|h| h.version),
        page_size,
        revisions: revisions
            .into_iter()
            .map(|r| -> Result<RevisionOutput> {
                Ok(RevisionOutput {
                    index: r.index,
                    author: r.author.to_string(),
                    applied_at: r.applied_at.version,
                    resulting: r.resulting.version,
                    deltas: r.delta_count,
                    timestamp: format_timestamp(r.timestamp),
                    op: if args.ops {
                        Some(serde_json::to_value(&r.op)?)
                    } else {
                        None
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?,
    };

    render_mode(
        output,
        &out,
        |out, w| {
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
            pretty_section(w, &format!("History of {} (newest first)", out.document))?;
            if out.revisions.is_empty() {
                writeln!(w, "no revisions")?;
            }
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
