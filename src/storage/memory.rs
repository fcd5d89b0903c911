//! In-process [`ArticleStore`] for tests and embedders that do not want a
//! database file.
//!
//! Transactions are serialized: `begin` takes the store lock and works on a
//! copy of the state, which replaces the shared state on commit.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::store::{ArticleStore, StoreTransaction};
use super::types::{FeedHandle, StorageError, StoredArticle};
use crate::pipeline::ReconciledArticle;

#[derive(Debug, Clone, Default)]
struct State {
    sources: BTreeMap<String, FeedHandle>,
    articles: BTreeMap<String, StoredArticle>,
    /// (article_url, feed_url)
    links: BTreeSet<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    fail_commits: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later commit fail with [`StorageError::Unavailable`],
    /// discarding the transaction's writes.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub async fn article_count(&self) -> usize {
        self.state.lock().await.articles.len()
    }

    pub async fn link_count(&self) -> usize {
        self.state.lock().await.links.len()
    }

    pub async fn source_count(&self) -> usize {
        self.state.lock().await.sources.len()
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn find_source(&self, feed_url: &str) -> Result<Option<FeedHandle>, StorageError> {
        Ok(self.state.lock().await.sources.get(feed_url).cloned())
    }

    async fn insert_source(&self, handle: &FeedHandle) -> Result<bool, StorageError> {
        let mut state = self.state.lock().await;
        if state.sources.contains_key(&handle.url) {
            return Ok(false);
        }
        state.sources.insert(handle.url.clone(), handle.clone());
        Ok(true)
    }

    async fn update_source(&self, handle: &FeedHandle) -> Result<bool, StorageError> {
        let mut state = self.state.lock().await;
        match state.sources.get_mut(&handle.url) {
            Some(existing) => {
                *existing = handle.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn articles_for_source(
        &self,
        feed_url: &str,
        limit: usize,
    ) -> Result<Vec<StoredArticle>, StorageError> {
        let state = self.state.lock().await;
        let mut articles: Vec<StoredArticle> = state
            .links
            .iter()
            .filter(|(_, feed)| feed == feed_url)
            .filter_map(|(article, _)| state.articles.get(article).cloned())
            .collect();
        // Same order as the SQL store: newest first, undated last, then url
        articles.sort_by(|a, b| {
            b.publish_date
                .cmp(&a.publish_date)
                .then_with(|| a.url.cmp(&b.url))
        });
        articles.truncate(limit);
        Ok(articles)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = State::clone(&guard);
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
    fail_commit: bool,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_article(&mut self, url: &str) -> Result<Option<StoredArticle>, StorageError> {
        Ok(self.working.articles.get(url).cloned())
    }

    async fn insert_article(&mut self, article: &ReconciledArticle) -> Result<(), StorageError> {
        self.working
            .articles
            .entry(article.url.clone())
            .or_insert_with(|| StoredArticle {
                url: article.url.clone(),
                title: article.title.clone(),
                top_image: article.top_image.clone(),
                publish_date: article.publish_date,
                text: article.text.clone(),
                source_name: article.source_name.clone(),
                source_url: article.source_url.clone(),
                cached_at: Utc::now(),
            });
        Ok(())
    }

    async fn insert_source_link(
        &mut self,
        article_url: &str,
        feed_url: &str,
    ) -> Result<bool, StorageError> {
        // Mirrors the foreign keys of the SQL schema
        if !self.working.articles.contains_key(article_url) {
            return Err(StorageError::Unavailable(format!(
                "no article {article_url} to link"
            )));
        }
        if !self.working.sources.contains_key(feed_url) {
            return Err(StorageError::Unavailable(format!("no source {feed_url} to link")));
        }
        Ok(self
            .working
            .links
            .insert((article_url.to_owned(), feed_url.to_owned())))
    }

    async fn unlink_source(&mut self, feed_url: &str) -> Result<Vec<String>, StorageError> {
        let (removed, kept): (BTreeSet<_>, BTreeSet<_>) = std::mem::take(&mut self.working.links)
            .into_iter()
            .partition(|(_, feed)| feed == feed_url);
        self.working.links = kept;
        Ok(removed.into_iter().map(|(article, _)| article).collect())
    }

    async fn count_links(&mut self, article_url: &str) -> Result<u64, StorageError> {
        Ok(self
            .working
            .links
            .iter()
            .filter(|(article, _)| article == article_url)
            .count() as u64)
    }

    async fn delete_article(&mut self, url: &str) -> Result<bool, StorageError> {
        self.working.links.retain(|(article, _)| article != url);
        Ok(self.working.articles.remove(url).is_some())
    }

    async fn delete_source(&mut self, feed_url: &str) -> Result<bool, StorageError> {
        self.working.links.retain(|(_, feed)| feed != feed_url);
        Ok(self.working.sources.remove(feed_url).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        if self.fail_commit {
            return Err(StorageError::Unavailable("commit rejected".to_string()));
        }
        let MemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
