use async_trait::async_trait;
use sqlx::{Sqlite, Transaction};

use super::schema::Database;
use super::store::StoreTransaction;
use super::types::{ArticleRow, StorageError, StoredArticle};
use crate::pipeline::ReconciledArticle;

/// Maximum number of articles to return from any single query (OOM protection)
const MAX_ARTICLES: usize = 2000;

const ARTICLE_COLUMNS: &str =
    "a.url, a.title, a.top_image, a.publish_date, a.text, a.source_name, a.source_url, a.cached_at";

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Articles cached through `feed_url`, newest publish date first;
    /// undated articles last.
    pub async fn articles_for_source(
        &self,
        feed_url: &str,
        limit: usize,
    ) -> Result<Vec<StoredArticle>, StorageError> {
        let limit = limit.min(MAX_ARTICLES) as i64;
        let rows: Vec<ArticleRow> = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS}
             FROM articles a
             JOIN article_sources s ON s.article_url = a.url
             WHERE s.feed_url = ?
             ORDER BY a.publish_date DESC, a.url
             LIMIT ?"
        ))
        .bind(feed_url)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ArticleRow::into_article).collect())
    }

    /// Opens a write transaction. `BEGIN IMMEDIATE` takes the write lock up
    /// front, so a concurrent batch waits on `busy_timeout` instead of
    /// failing when its read lock cannot be upgraded.
    pub async fn begin_batch(&self) -> Result<SqliteTransaction, StorageError> {
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(StorageError::from_sqlx)?;
        Ok(SqliteTransaction { tx })
    }
}

/// An open SQLite transaction. Rolled back on drop unless committed.
pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn find_article(&mut self, url: &str) -> Result<Option<StoredArticle>, StorageError> {
        let row: Option<ArticleRow> =
            sqlx::query_as(&format!("SELECT {ARTICLE_COLUMNS} FROM articles a WHERE a.url = ?"))
                .bind(url)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(row.map(ArticleRow::into_article))
    }

    /// Existing rows are left untouched.
    async fn insert_article(&mut self, article: &ReconciledArticle) -> Result<(), StorageError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "INSERT OR IGNORE INTO articles
             (url, title, top_image, publish_date, text, source_name, source_url, cached_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.top_image)
        .bind(article.publish_date.map(|d| d.timestamp()))
        .bind(&article.text)
        .bind(&article.source_name)
        .bind(&article.source_url)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(StorageError::from_sqlx)?;
        Ok(())
    }

    async fn insert_source_link(
        &mut self,
        article_url: &str,
        feed_url: &str,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO article_sources (article_url, feed_url) VALUES (?, ?)",
        )
        .bind(article_url)
        .bind(feed_url)
        .execute(&mut *self.tx)
        .await
        .map_err(StorageError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn unlink_source(&mut self, feed_url: &str) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("DELETE FROM article_sources WHERE feed_url = ? RETURNING article_url")
                .bind(feed_url)
                .fetch_all(&mut *self.tx)
                .await
                .map_err(StorageError::from_sqlx)?;
        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    async fn count_links(&mut self, article_url: &str) -> Result<u64, StorageError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM article_sources WHERE article_url = ?")
                .bind(article_url)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn delete_article(&mut self, url: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM articles WHERE url = ?")
            .bind(url)
            .execute(&mut *self.tx)
            .await
            .map_err(StorageError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_source(&mut self, feed_url: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM sources WHERE url = ?")
            .bind(feed_url)
            .execute(&mut *self.tx)
            .await
            .map_err(StorageError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await.map_err(StorageError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FeedHandle;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const FEED: &str = "https://example.com/feed.xml";

    async fn test_db() -> Database {
        let db = Database::open(":memory:").await.unwrap();
        db.insert_source(&FeedHandle {
            url: FEED.to_string(),
            title: Some("Example".to_string()),
            homepage_url: None,
            image_url: None,
        })
        .await
        .unwrap();
        db
    }

    fn article(url: &str, title: &str, day: Option<u32>) -> ReconciledArticle {
        ReconciledArticle {
            url: url.to_string(),
            title: title.to_string(),
            top_image: None,
            publish_date: day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()),
            text: format!("{title} body"),
            source_name: Some("Example".to_string()),
            source_url: Some("https://example.com/".to_string()),
        }
    }

    async fn cache(db: &Database, articles: &[ReconciledArticle]) {
        let mut tx = db.begin_batch().await.unwrap();
        for a in articles {
            tx.insert_article(a).await.unwrap();
            tx.insert_source_link(&a.url, FEED).await.unwrap();
        }
        Box::new(tx).commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_and_find_article() {
        let db = test_db().await;
        let a = article("https://example.com/1", "One", Some(2));
        cache(&db, std::slice::from_ref(&a)).await;

        let mut tx = db.begin_batch().await.unwrap();
        let found = tx.find_article(&a.url).await.unwrap().unwrap();
        assert_eq!(found.title, "One");
        assert_eq!(found.text, "One body");
        assert_eq!(found.publish_date, a.publish_date);
        assert_eq!(tx.find_article("https://example.com/none").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_article_never_overwrites() {
        let db = test_db().await;
        cache(&db, &[article("https://example.com/1", "Original", None)]).await;
        cache(&db, &[article("https://example.com/1", "Changed", None)]).await;

        let stored = db.articles_for_source(FEED, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Original");
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let db = test_db().await;
        {
            let mut tx = db.begin_batch().await.unwrap();
            let a = article("https://example.com/1", "One", None);
            tx.insert_article(&a).await.unwrap();
            tx.insert_source_link(&a.url, FEED).await.unwrap();
        }
        assert!(db.articles_for_source(FEED, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_link_ignored() {
        let db = test_db().await;
        let a = article("https://example.com/1", "One", None);
        let mut tx = db.begin_batch().await.unwrap();
        tx.insert_article(&a).await.unwrap();
        assert!(tx.insert_source_link(&a.url, FEED).await.unwrap());
        assert!(!tx.insert_source_link(&a.url, FEED).await.unwrap());
        assert_eq!(tx.count_links(&a.url).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_link_requires_existing_source() {
        let db = test_db().await;
        let a = article("https://example.com/1", "One", None);
        let mut tx = db.begin_batch().await.unwrap();
        tx.insert_article(&a).await.unwrap();
        let result = tx.insert_source_link(&a.url, "https://unknown.example.com/rss").await;
        assert!(matches!(result, Err(StorageError::Database(_))));
    }

    #[tokio::test]
    async fn test_articles_for_source_ordering_and_limit() {
        let db = test_db().await;
        cache(
            &db,
            &[
                article("https://example.com/old", "Old", Some(1)),
                article("https://example.com/undated", "Undated", None),
                article("https://example.com/new", "New", Some(9)),
            ],
        )
        .await;

        let titles: Vec<String> = db
            .articles_for_source(FEED, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.title)
            .collect();
        assert_eq!(titles, vec!["New", "Old", "Undated"]);

        assert_eq!(db.articles_for_source(FEED, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unlink_and_delete() {
        let db = test_db().await;
        cache(&db, &[article("https://example.com/1", "One", None)]).await;

        let mut tx = db.begin_batch().await.unwrap();
        let unlinked = tx.unlink_source(FEED).await.unwrap();
        assert_eq!(unlinked, vec!["https://example.com/1".to_string()]);
        assert_eq!(tx.count_links("https://example.com/1").await.unwrap(), 0);
        assert!(tx.delete_article("https://example.com/1").await.unwrap());
        assert!(tx.delete_source(FEED).await.unwrap());
        assert!(!tx.delete_source(FEED).await.unwrap());
        Box::new(tx).commit().await.unwrap();

        assert_eq!(db.find_source(FEED).await.unwrap(), None);
    }
}
