//! Backward revision reconstruction from a paged remote delta log.
//!
//! The reader asks for the newest page ending at a version, walks it newest
//! first and keeps extending one revision while the author stays the same.
//! A full page that never changed author means the run may continue, so the
//! reader fetches the next older page ending at the oldest delta it consumed.
//! Logs include the delta ending exactly at the requested version, so that
//! delta comes back at the head of the next page and is dropped by its
//! resulting version.
//!
//! Fetch failures are not errors here: the chain stops and the caller sees
//! "no revision", meaning history is truncated at that point.

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::Revision;
use crate::algebra::{OpAlgebra, OpError};
use crate::delta::TransformedWaveletDelta;
use crate::doc::DocOp;
use crate::model::{DocumentId, HashedVersion, ParticipantId};

/// Page size used when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: usize = 200;

// ---------------------------------------------------------------------------
// Fetch protocol
// ---------------------------------------------------------------------------

/// One page request against the remote log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub document: DocumentId,
    /// Newest version to return, inclusive on the entry's resulting version.
    pub end_version: HashedVersion,
    pub page_size: usize,
    pub descending: bool,
    pub include_ops: bool,
}

/// One delta as the log reports it for a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub author: ParticipantId,
    pub applied_at: HashedVersion,
    pub resulting: HashedVersion,
    pub timestamp: i64,
    /// Empty when the request did not ask for ops.
    #[serde(default)]
    pub ops: Vec<DocOp>,
    pub op_count: usize,
}

impl LogEntry {
    /// The document's slice of a delta, if the delta edits it.
    #[must_use]
    pub fn from_delta(delta: &TransformedWaveletDelta, document: &DocumentId) -> Option<Self> {
        let ops: Vec<DocOp> = delta.doc_ops(document).cloned().collect();
        if ops.is_empty() {
            return None;
        }
        Some(Self {
            author: delta.author.clone(),
            applied_at: delta.applied_at,
            resulting: delta.resulting,
            timestamp: delta.timestamp,
            op_count: ops.len(),
            ops,
        })
    }
}

/// Transport-level failure of a page fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("history fetch failed: {0}")]
    Transport(String),

    #[error("history fetch cancelled")]
    Cancelled,
}

/// A remote per-document delta log.
#[async_trait]
pub trait DeltaLog: Send + Sync {
    /// Fetch one page.
    ///
    /// # Errors
    ///
    /// Any transport failure; the reader treats it as end of history.
    async fn fetch(&self, request: &HistoryRequest) -> Result<Vec<LogEntry>, FetchError>;
}

/// A [`DeltaLog`] over deltas held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeltaLog {
    documents: BTreeMap<DocumentId, Vec<LogEntry>>,
}

impl InMemoryDeltaLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index deltas in version order.
    #[must_use]
    pub fn from_deltas<'a, I>(deltas: I) -> Self
    where
        I: IntoIterator<Item = &'a TransformedWaveletDelta>,
    {
        let mut log = Self::new();
        for delta in deltas {
            log.record(delta);
        }
        log
    }

    /// Append one delta under every document it edits.
    pub fn record(&mut self, delta: &TransformedWaveletDelta) {
        for op in &delta.ops {
            let Some(document) = op.target_document() else {
                continue;
            };
            let entries = self.documents.entry(document.clone()).or_default();
            if entries.last().is_some_and(|e| e.resulting == delta.resulting) {
                continue;
            }
            if let Some(entry) = LogEntry::from_delta(delta, document) {
                entries.push(entry);
            }
        }
    }

    /// The newest entry of a document.
    #[must_use]
    pub fn head(&self, document: &DocumentId) -> Option<HashedVersion> {
        self.documents.get(document)?.last().map(|e| e.resulting)
    }

    #[must_use]
    pub fn len(&self, document: &DocumentId) -> usize {
        self.documents.get(document).map_or(0, Vec::len)
    }
}

#[async_trait]
impl DeltaLog for InMemoryDeltaLog {
    async fn fetch(&self, request: &HistoryRequest) -> Result<Vec<LogEntry>, FetchError> {
        let Some(entries) = self.documents.get(&request.document) else {
            return Ok(Vec::new());
        };
        let upto = entries.partition_point(|e| e.resulting.version <= request.end_version.version);
        let from = upto.saturating_sub(request.page_size);
        let mut page: Vec<LogEntry> = entries[from..upto].to_vec();
        if !request.include_ops {
            for entry in &mut page {
                entry.ops.clear();
            }
        }
        if request.descending {
            page.reverse();
        }
        Ok(page)
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared flag that stops a reader before its next page fetch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Where one reconstructed revision stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionPolicy {
    /// Maximal runs of one author.
    #[default]
    AuthorRuns,
    /// Fixed cut points. A revision ending at `v` starts at the greatest tag
    /// below `v` (or at the beginning of history), whoever wrote the deltas
    /// in between. The revision is attributed to its newest author.
    Tags(Vec<u64>),
}

impl RevisionPolicy {
    fn floor(&self, end: u64) -> Option<u64> {
        match self {
            Self::AuthorRuns => None,
            Self::Tags(tags) => Some(tags.iter().copied().filter(|t| *t < end).max().unwrap_or(0)),
        }
    }
}

/// Rebuilds [`Revision`]s of one document, newest first.
#[derive(Debug)]
pub struct HistoryReader<L> {
    log: L,
    document: DocumentId,
    page_size: usize,
    policy: RevisionPolicy,
    cancel: CancelToken,
}

impl<L: DeltaLog> HistoryReader<L> {
    #[must_use]
    pub fn new(log: L, document: DocumentId) -> Self {
        Self {
            log,
            document,
            page_size: DEFAULT_PAGE_SIZE,
            policy: RevisionPolicy::AuthorRuns,
            cancel: CancelToken::new(),
        }
    }

    /// Entries requested per page. Pages hold at least two entries since one
    /// slot may be the repeated boundary delta.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(2);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RevisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Build the revision whose newest delta ends at `end`.
    ///
    /// `index` counts revisions back from the head: 0 is the newest.
    /// The delta at each page boundary comes back twice; it is dropped when
    /// its resulting hashed version is identical to the one already read.
    /// Returns `Ok(None)` at the end of history, after cancellation, when a
    /// page fetch failed, or when a page disagrees with the hash chain.
    ///
    /// # Errors
    ///
    /// Fails only when the collected ops do not compose, which means the log
    /// is corrupt.
    pub async fn fetch_revision(
        &self,
        end: HashedVersion,
        index: usize,
    ) -> Result<Option<Revision<DocOp>>, OpError> {
        let floor = self.policy.floor(end.version);
        let mut collected: Vec<LogEntry> = Vec::new();
        let mut cursor = end;

        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(document = %self.document, index, "history read cancelled");
                return Ok(None);
            }
            let request = HistoryRequest {
                document: self.document.clone(),
                end_version: cursor,
                page_size: self.page_size,
                descending: true,
                include_ops: true,
            };
            let page = match self.log.fetch(&request).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        document = %self.document,
                        end = cursor.version,
                        error = %e,
                        "history fetch failed, treating as end of history"
                    );
                    return Ok(None);
                }
            };
            let full = page.len() >= self.page_size;
            let mut progressed = false;
            let mut boundary = false;

            for entry in page {
                if let Some(oldest) = collected.last()
                    && entry.resulting.version >= oldest.resulting.version
                {
                    if entry.resulting == oldest.resulting {
                        continue;
                    }
                    tracing::warn!(
                        document = %self.document,
                        version = entry.resulting.version,
                        expected = %oldest.resulting,
                        got = %entry.resulting,
                        "history page disagrees with the chain already read"
                    );
                    return Ok(None);
                }
                if let Some(newest) = collected.first() {
                    let ends_run = match floor {
                        Some(floor) => entry.resulting.version <= floor,
                        None => entry.author != newest.author,
                    };
                    if ends_run {
                        boundary = true;
                        break;
                    }
                }
                cursor = entry.resulting;
                progressed = true;
                collected.push(entry);
            }

            if boundary || !full || !progressed {
                break;
            }
            tracing::debug!(
                document = %self.document,
                index,
                collected = collected.len(),
                "revision spans page boundary, fetching older page"
            );
        }

        let (Some(newest), Some(oldest)) = (collected.first(), collected.last()) else {
            return Ok(None);
        };
        let Some(op) = DocOp::compose_all(collected.iter().rev().flat_map(|e| e.ops.iter()))? else {
            tracing::warn!(document = %self.document, index, "history entries carried no ops");
            return Ok(None);
        };
        Ok(Some(Revision {
            index,
            author: newest.author.clone(),
            applied_at: oldest.applied_at,
            resulting: newest.resulting,
            timestamp: newest.timestamp,
            delta_count: collected.len(),
            op,
        }))
    }

    /// Every revision from `head` back to the beginning, newest first.
    ///
    /// Lazy: each item issues its page fetches only when polled, and the
    /// stream ends at the first `None` from [`fetch_revision`](Self::fetch_revision)
    /// or after yielding an error.
    pub fn revisions(
        &self,
        head: HashedVersion,
    ) -> impl Stream<Item = Result<Revision<DocOp>, OpError>> + '_ {
        stream::unfold(Some((head, 0_usize)), move |state| async move {
            let (end, index) = state?;
            match self.fetch_revision(end, index).await {
                Ok(Some(revision)) => {
                    let next = (revision.applied_at.version > 0)
                        .then_some((revision.applied_at, index + 1));
                    Some((Ok(revision), next))
                }
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WaveletId;
    use crate::op::WaveletOp;

    fn log_of(authors: &[&str]) -> (InMemoryDeltaLog, HashedVersion) {
        let mut version = HashedVersion::initial(&WaveletId::from("w"));
        let mut log = InMemoryDeltaLog::new();
        for (len, author) in authors.iter().enumerate() {
            let delta = TransformedWaveletDelta::sequence(
                (*author).into(),
                version,
                0,
                vec![WaveletOp::document("d", DocOp::insert_text(len, "x", len))],
            );
            version = delta.resulting;
            log.record(&delta);
        }
        (log, version)
    }

    #[tokio::test]
    async fn fetch_is_inclusive_and_descending() {
        let (log, head) = log_of(&["a", "a", "b"]);
        let page = log
            .fetch(&HistoryRequest {
                document: "d".into(),
                end_version: head,
                page_size: 2,
                descending: true,
                include_ops: false,
            })
            .await
            .expect("fetch");
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].resulting, head);
        assert!(page[0].ops.is_empty());
        assert_eq!(page[0].op_count, 1);
        assert!(page[0].resulting.version > page[1].resulting.version);
    }

    #[test]
    fn tag_floor_is_greatest_tag_below_end() {
        let policy = RevisionPolicy::Tags(vec![2, 5, 9]);
        assert_eq!(policy.floor(6), Some(5));
        assert_eq!(policy.floor(5), Some(2));
        assert_eq!(policy.floor(1), Some(0));
        assert_eq!(RevisionPolicy::AuthorRuns.floor(6), None);
    }

    #[tokio::test]
    async fn page_size_floor_is_two() {
        let (log, _) = log_of(&["a"]);
        let reader = HistoryReader::new(log, "d".into()).with_page_size(1);
        assert_eq!(reader.page_size(), 2);
    }
}
