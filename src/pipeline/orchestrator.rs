use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use tokio::time::Instant;

use super::cache::ArticleCache;
use super::reconcile::{reconcile, ReconcileGap};
use super::{ArticleLimit, DropReason, DroppedEntry, PipelineError, PipelineReport};
use crate::content::{sanitize, PageScraper, ScrapeError, ScrapedPage};
use crate::feed::{FeedEntry, FeedFetcher, ParsedFeed};
use crate::storage::ArticleStore;

pub const DEFAULT_SCRAPE_CONCURRENCY: usize = 4;
pub const MAX_SCRAPE_CONCURRENCY: usize = 16;

/// Why an entry went ahead with feed data only.
#[derive(Debug)]
enum Degraded {
    Scrape(ScrapeError),
    DeadlineExceeded,
}

impl std::fmt::Display for Degraded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degraded::Scrape(e) => write!(f, "{e}"),
            Degraded::DeadlineExceeded => f.write_str("batch deadline exceeded"),
        }
    }
}

/// Drives one feed through fetch, scrape, reconcile, sanitize and cache.
///
/// Collaborators are injected; a `Pipeline` holds no per-run state and can
/// serve concurrent runs for different feeds.
pub struct Pipeline<F, P, S> {
    fetcher: F,
    scraper: P,
    cache: ArticleCache<S>,
    concurrency: usize,
}

impl<F, P, S> Pipeline<F, P, S>
where
    F: FeedFetcher,
    P: PageScraper,
    S: ArticleStore,
{
    pub fn new(fetcher: F, scraper: P, store: S) -> Self {
        Self {
            fetcher,
            scraper,
            cache: ArticleCache::new(store),
            concurrency: DEFAULT_SCRAPE_CONCURRENCY,
        }
    }

    /// Number of pages scraped at once, clamped to `1..=16`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_SCRAPE_CONCURRENCY);
        self
    }

    pub fn cache(&self) -> &ArticleCache<S> {
        &self.cache
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Runs the pipeline for one feed.
    ///
    /// Only a feed fetch failure or a storage failure fails the run. Entries
    /// whose page cannot be scraped, or is still loading at `deadline`, are
    /// built from feed data alone. Entries without a link are dropped and
    /// listed in the report.
    pub async fn run(
        &self,
        feed_url: &str,
        limit: ArticleLimit,
        deadline: Option<Instant>,
    ) -> Result<PipelineReport, PipelineError> {
        let feed_url = feed_url.trim();
        tracing::debug!(feed = %feed_url, ?limit, "Fetching feed");

        let ParsedFeed { meta, entries } = self.fetcher.fetch(feed_url).await.map_err(|e| {
            tracing::warn!(feed = %feed_url, error = %e, "Feed fetch failed");
            e
        })?;
        let source = self.cache.ensure_source_from(feed_url, &meta).await?;

        let (selected, mut dropped) = select_entries(entries, limit);
        for d in &dropped {
            tracing::warn!(feed = %feed_url, entry = d.index, reason = %d.reason, "Dropped entry");
        }

        // `buffered` keeps feed order while scraping up to `concurrency` pages at once
        let scraped: Vec<(usize, FeedEntry, Result<ScrapedPage, Degraded>)> =
            stream::iter(selected)
                .map(|(index, entry)| async move {
                    let page = self.scrape_entry(&entry, deadline).await;
                    (index, entry, page)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut articles = Vec::with_capacity(scraped.len());
        let mut scrape_failures = 0;
        for (index, entry, page) in scraped {
            let page = match page {
                Ok(page) => Some(page),
                Err(reason) => {
                    scrape_failures += 1;
                    tracing::warn!(
                        feed = %feed_url,
                        entry = index,
                        link = ?entry.link,
                        reason = %reason,
                        "Scrape failed, using feed data only"
                    );
                    None
                }
            };

            match reconcile(&entry, &meta, page.as_ref()) {
                Ok(mut article) => {
                    article.text = sanitize(&article.text);
                    tracing::debug!(feed = %feed_url, entry = index, url = %article.url, "Reconciled entry");
                    articles.push(article);
                }
                Err(reason) => {
                    tracing::warn!(feed = %feed_url, entry = index, reason = %reason, "Dropped entry");
                    dropped.push(DroppedEntry {
                        index,
                        title: entry.title,
                        reason: reason.into(),
                    });
                }
            }
        }

        let inserted = self.cache.cache_batch(feed_url, &articles).await?;
        tracing::info!(
            feed = %feed_url,
            articles = articles.len(),
            inserted,
            skipped = articles.len() - inserted,
            dropped = dropped.len(),
            scrape_failures,
            "Feed cached"
        );

        dropped.sort_by_key(|d| d.index);
        Ok(PipelineReport {
            source,
            articles,
            inserted,
            dropped,
            scrape_failures,
        })
    }

    async fn scrape_entry(
        &self,
        entry: &FeedEntry,
        deadline: Option<Instant>,
    ) -> Result<ScrapedPage, Degraded> {
        let Some(link) = entry.link.as_deref() else {
            return Err(Degraded::Scrape(ScrapeError::InvalidUrl(String::new())));
        };
        let scrape = self.scraper.scrape(link);
        let result = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, scrape)
                .await
                .map_err(|_| Degraded::DeadlineExceeded)?,
            None => scrape.await,
        };
        result.map_err(Degraded::Scrape)
    }
}

/// Splits feed entries into the ones to process and the ones dropped.
///
/// An entry is dropped when it has no link or repeats the link of an earlier
/// entry; only the first occurrence of a link counts towards `limit`.
/// Selection stops once `limit` entries are taken; later entries are neither
/// processed nor reported.
fn select_entries(
    entries: Vec<FeedEntry>,
    limit: ArticleLimit,
) -> (Vec<(usize, FeedEntry)>, Vec<DroppedEntry>) {
    let mut selected = Vec::new();
    let mut dropped = Vec::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for (index, entry) in entries.into_iter().enumerate() {
        if !limit.allows(selected.len()) {
            break;
        }
        let link = entry
            .link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned);
        let reason = match link {
            None => DropReason::Gap(ReconcileGap::MissingUrl),
            Some(link) => match first_seen.get(&link) {
                Some(&first) => DropReason::DuplicateLink { first },
                None => {
                    first_seen.insert(link, index);
                    selected.push((index, entry));
                    continue;
                }
            },
        };
        dropped.push(DroppedEntry {
            index,
            title: entry.title,
            reason,
        });
    }
    (selected, dropped)
}
