use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::content::ScrapedPage;
use crate::feed::{FeedEntry, FeedMeta};

/// An article assembled from a feed entry and its scraped page.
///
/// `text` is sanitized by the pipeline before the article leaves a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledArticle {
    /// Primary key; always the entry link, never empty.
    pub url: String,
    pub title: String,
    pub top_image: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub text: String,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
}

/// A required field was missing, so the entry cannot become an article.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ReconcileGap {
    #[error("entry has no link")]
    MissingUrl,
}

/// A value counts only when it has non-whitespace content.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Merges one feed entry with its scrape result.
///
/// Feed data wins for url, title, source and publish date; the scraped page
/// wins for body text and top image. A field absent on both sides stays
/// absent, except `title` and `text` which fall back to empty.
pub fn reconcile(
    entry: &FeedEntry,
    meta: &FeedMeta,
    scraped: Option<&ScrapedPage>,
) -> Result<ReconciledArticle, ReconcileGap> {
    let url = present(&entry.link).ok_or(ReconcileGap::MissingUrl)?;

    let title = present(&entry.title)
        .or_else(|| scraped.and_then(|s| present(&s.title)))
        .unwrap_or_default();

    let source_url = present(&meta.link)
        .or_else(|| scraped.and_then(|s| present(&s.source_url)))
        .map(str::to_owned);
    let source_name = present(&meta.title)
        .map(str::to_owned)
        .or_else(|| source_url.clone());

    let publish_date = entry
        .published
        .or_else(|| scraped.and_then(|s| s.publish_date));

    let text = scraped
        .and_then(|s| present(&s.text))
        .or_else(|| present(&entry.description))
        .unwrap_or_default();

    let top_image = scraped
        .and_then(|s| present(&s.top_image))
        .or_else(|| present(&meta.image))
        .map(str::to_owned);

    Ok(ReconciledArticle {
        url: url.to_owned(),
        title: title.to_owned(),
        top_image,
        publish_date,
        text: text.to_owned(),
        source_name,
        source_url,
    })
}
