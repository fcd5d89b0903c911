use super::{PipelineError, ReconciledArticle};
use crate::feed::{FeedFetcher, FeedMeta};
use crate::storage::{ArticleStore, FeedHandle, StorageError, StoredArticle};

/// What [`ArticleCache::remove_source`] deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovedSource {
    pub source_removed: bool,
    pub links_removed: usize,
    /// Articles deleted because no other feed linked them.
    pub articles_removed: usize,
}

/// Sole writer of cached articles and sources.
///
/// Stored articles are immutable: caching a URL that already exists never
/// overwrites it, so re-caching the same feed is a no-op.
#[derive(Debug, Clone)]
pub struct ArticleCache<S> {
    store: S,
}

fn handle_from(feed_url: &str, meta: &FeedMeta) -> FeedHandle {
    FeedHandle {
        url: feed_url.to_owned(),
        title: meta.title.clone(),
        homepage_url: meta.link.clone(),
        image_url: meta.image.clone(),
    }
}

impl<S: ArticleStore> ArticleCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the stored handle for `feed_url`, fetching the feed to resolve
    /// one when it is not stored yet.
    pub async fn ensure_source<F>(
        &self,
        feed_url: &str,
        fetcher: &F,
    ) -> Result<FeedHandle, PipelineError>
    where
        F: FeedFetcher + ?Sized,
    {
        if let Some(handle) = self.store.find_source(feed_url).await? {
            return Ok(handle);
        }
        let parsed = fetcher.fetch(feed_url).await?;
        Ok(self.ensure_source_from(feed_url, &parsed.meta).await?)
    }

    /// Like [`ensure_source`](Self::ensure_source) with feed metadata the
    /// caller already holds.
    pub async fn ensure_source_from(
        &self,
        feed_url: &str,
        meta: &FeedMeta,
    ) -> Result<FeedHandle, StorageError> {
        if let Some(handle) = self.store.find_source(feed_url).await? {
            return Ok(handle);
        }
        let handle = handle_from(feed_url, meta);
        if self.store.insert_source(&handle).await? {
            tracing::info!(feed = %feed_url, title = ?handle.title, "Registered new source");
            return Ok(handle);
        }
        // Another run registered it between the lookup and the insert
        Ok(self.store.find_source(feed_url).await?.unwrap_or(handle))
    }

    /// Re-resolves a source from a fresh fetch, replacing its stored
    /// metadata. This is the only path that changes a stored handle.
    pub async fn refresh_source<F>(
        &self,
        feed_url: &str,
        fetcher: &F,
    ) -> Result<FeedHandle, PipelineError>
    where
        F: FeedFetcher + ?Sized,
    {
        let parsed = fetcher.fetch(feed_url).await?;
        let handle = handle_from(feed_url, &parsed.meta);
        if !self.store.update_source(&handle).await? {
            self.store.insert_source(&handle).await?;
        }
        tracing::info!(feed = %feed_url, "Refreshed source metadata");
        Ok(handle)
    }

    /// Caches a batch in one transaction; returns how many articles were new.
    ///
    /// An article already stored is neither rewritten nor counted. It gains
    /// a link to `feed_url` if it was first cached through another feed.
    /// On error nothing of the batch is kept.
    pub async fn cache_batch(
        &self,
        feed_url: &str,
        articles: &[ReconciledArticle],
    ) -> Result<usize, StorageError> {
        if articles.is_empty() {
            return Ok(0);
        }

        let mut tx = self.store.begin().await?;
        let mut inserted = 0;
        for article in articles {
            if tx.find_article(&article.url).await?.is_some() {
                if tx.insert_source_link(&article.url, feed_url).await? {
                    tracing::debug!(article = %article.url, feed = %feed_url, "Linked cached article");
                }
                continue;
            }
            tx.insert_article(article).await?;
            tx.insert_source_link(&article.url, feed_url).await?;
            inserted += 1;
        }
        tx.commit().await?;

        tracing::debug!(
            feed = %feed_url,
            inserted,
            skipped = articles.len() - inserted,
            "Cached batch"
        );
        Ok(inserted)
    }

    pub async fn articles_for_source(
        &self,
        feed_url: &str,
        limit: usize,
    ) -> Result<Vec<StoredArticle>, StorageError> {
        self.store.articles_for_source(feed_url, limit).await
    }

    /// Deletes a source together with every article that only it linked.
    /// Articles still linked from another feed stay.
    pub async fn remove_source(&self, feed_url: &str) -> Result<RemovedSource, StorageError> {
        let mut tx = self.store.begin().await?;
        let linked = tx.unlink_source(feed_url).await?;

        let mut articles_removed = 0;
        for article_url in &linked {
            if tx.count_links(article_url).await? == 0 && tx.delete_article(article_url).await? {
                articles_removed += 1;
            }
        }
        let source_removed = tx.delete_source(feed_url).await?;
        tx.commit().await?;

        let removed = RemovedSource {
            source_removed,
            links_removed: linked.len(),
            articles_removed,
        };
        tracing::info!(
            feed = %feed_url,
            links = removed.links_removed,
            articles = removed.articles_removed,
            "Removed source"
        );
        Ok(removed)
    }
}
