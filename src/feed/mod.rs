//! Feed retrieval and parsing.
//!
//! - [`parser`] turns RSS/Atom bytes into a [`ParsedFeed`] using `feed-rs`
//! - [`fetcher`] retrieves a feed over HTTP behind the [`FeedFetcher`] trait
//!
//! Entries are handed out in document order. Entries without a link are kept
//! here and dropped later by the pipeline, which reports them.

mod fetcher;
mod parser;

use chrono::{DateTime, Utc};

pub use fetcher::{FeedFetcher, FetchError, HttpFeedFetcher};
pub use parser::parse_feed;

/// Feed-level metadata used as the fallback source for article fields and
/// for resolving a stored feed handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedMeta {
    pub title: Option<String>,
    /// Publisher homepage, not the feed URL.
    pub link: Option<String>,
    pub image: Option<String>,
}

/// One item of a feed. Lives for a single pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub link: Option<String>,
    pub title: Option<String>,
    /// Publish (or, failing that, update) time as parsed by the feed parser.
    /// Unparseable dates never get here.
    pub published: Option<DateTime<Utc>>,
    /// Summary, or content body when the feed has no summary. May hold HTML.
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub meta: FeedMeta,
    pub entries: Vec<FeedEntry>,
}
