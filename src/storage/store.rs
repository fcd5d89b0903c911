use async_trait::async_trait;

use super::types::{FeedHandle, StorageError, StoredArticle};
use crate::pipeline::ReconciledArticle;

/// Persistent home of feeds, articles and the links between them.
///
/// Article writes only happen inside a [`StoreTransaction`] so a batch is
/// applied whole or not at all.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn find_source(&self, feed_url: &str) -> Result<Option<FeedHandle>, StorageError>;

    /// Stores `handle` unless a source with its URL already exists.
    /// Returns whether a row was written.
    async fn insert_source(&self, handle: &FeedHandle) -> Result<bool, StorageError>;

    /// Replaces the resolved metadata of an existing source. Returns `false`
    /// when no such source exists.
    async fn update_source(&self, handle: &FeedHandle) -> Result<bool, StorageError>;

    /// Articles linked to `feed_url`, newest first.
    async fn articles_for_source(
        &self,
        feed_url: &str,
        limit: usize,
    ) -> Result<Vec<StoredArticle>, StorageError>;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError>;
}

/// A unit of work against an [`ArticleStore`]. Dropping it without
/// [`commit`](StoreTransaction::commit) discards every write.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_article(&mut self, url: &str) -> Result<Option<StoredArticle>, StorageError>;

    async fn insert_article(&mut self, article: &ReconciledArticle) -> Result<(), StorageError>;

    /// Links an article to a feed. Returns `false` if the link existed.
    async fn insert_source_link(
        &mut self,
        article_url: &str,
        feed_url: &str,
    ) -> Result<bool, StorageError>;

    /// Deletes every link of `feed_url`, returning the article URLs that
    /// were linked.
    async fn unlink_source(&mut self, feed_url: &str) -> Result<Vec<String>, StorageError>;

    async fn count_links(&mut self, article_url: &str) -> Result<u64, StorageError>;

    async fn delete_article(&mut self, url: &str) -> Result<bool, StorageError>;

    async fn delete_source(&mut self, feed_url: &str) -> Result<bool, StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

#[async_trait]
impl ArticleStore for super::Database {
    async fn find_source(&self, feed_url: &str) -> Result<Option<FeedHandle>, StorageError> {
        super::Database::find_source(self, feed_url).await
    }

    async fn insert_source(&self, handle: &FeedHandle) -> Result<bool, StorageError> {
        super::Database::insert_source(self, handle).await
    }

    async fn update_source(&self, handle: &FeedHandle) -> Result<bool, StorageError> {
        super::Database::update_source(self, handle).await
    }

    async fn articles_for_source(
        &self,
        feed_url: &str,
        limit: usize,
    ) -> Result<Vec<StoredArticle>, StorageError> {
        super::Database::articles_for_source(self, feed_url, limit).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        Ok(Box::new(self.begin_batch().await?))
    }
}
