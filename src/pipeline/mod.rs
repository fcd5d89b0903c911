//! Feed ingestion: fetch a feed, scrape each entry's page, merge the two
//! per field, sanitize the text and cache the result.

mod cache;
mod orchestrator;
mod reconcile;

use serde::Serialize;
use thiserror::Error;

use crate::feed::FetchError;
use crate::storage::{FeedHandle, StorageError};

pub use cache::{ArticleCache, RemovedSource};
pub use orchestrator::{Pipeline, DEFAULT_SCRAPE_CONCURRENCY, MAX_SCRAPE_CONCURRENCY};
pub use reconcile::{reconcile, ReconcileGap, ReconciledArticle};

/// Errors that fail a whole pipeline run. Per-entry problems never do.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Feed fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid article limit {0}: expected -1 (unbounded) or a count of zero or more")]
    InvalidLimit(i64),
}

/// How many articles one run may produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArticleLimit {
    #[default]
    Unbounded,
    AtMost(usize),
}

impl ArticleLimit {
    /// Whether another article may be added when `produced` already exist.
    pub fn allows(self, produced: usize) -> bool {
        match self {
            ArticleLimit::Unbounded => true,
            ArticleLimit::AtMost(max) => produced < max,
        }
    }
}

/// `-1` is the unbounded sentinel; any other negative value is rejected.
impl TryFrom<i64> for ArticleLimit {
    type Error = PipelineError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(ArticleLimit::Unbounded),
            n if n >= 0 => usize::try_from(n)
                .map(ArticleLimit::AtMost)
                .map_err(|_| PipelineError::InvalidLimit(n)),
            n => Err(PipelineError::InvalidLimit(n)),
        }
    }
}

/// Why a feed entry did not become an article.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum DropReason {
    #[error(transparent)]
    Gap(#[from] ReconcileGap),
    /// Same link as the entry at `first`, which is processed instead.
    #[error("same link as entry #{}", .first + 1)]
    DuplicateLink { first: usize },
}

/// A feed entry that did not become an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedEntry {
    /// Position in the feed document.
    pub index: usize,
    pub title: Option<String>,
    pub reason: DropReason,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub source: FeedHandle,
    /// Sanitized articles in feed order, cached or already present.
    pub articles: Vec<ReconciledArticle>,
    /// Articles newly written by this run.
    pub inserted: usize,
    pub dropped: Vec<DroppedEntry>,
    /// Entries built from feed data alone because their page scrape failed.
    pub scrape_failures: usize,
}
