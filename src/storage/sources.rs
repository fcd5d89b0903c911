use super::schema::Database;
use super::types::{FeedHandle, SourceRow, StorageError};

impl Database {
    // ========================================================================
    // Source Operations
    // ========================================================================

    pub async fn find_source(&self, feed_url: &str) -> Result<Option<FeedHandle>, StorageError> {
        let row: Option<SourceRow> = sqlx::query_as(
            "SELECT url, title, homepage_url, image_url FROM sources WHERE url = ?",
        )
        .bind(feed_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SourceRow::into_handle))
    }

    /// Insert-if-absent. Returns whether the source was new.
    pub async fn insert_source(&self, handle: &FeedHandle) -> Result<bool, StorageError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO sources (url, title, homepage_url, image_url, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&handle.url)
        .bind(&handle.title)
        .bind(&handle.homepage_url)
        .bind(&handle.image_url)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_source(&self, handle: &FeedHandle) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE sources SET title = ?, homepage_url = ?, image_url = ? WHERE url = ?",
        )
        .bind(&handle.title)
        .bind(&handle.homepage_url)
        .bind(&handle.image_url)
        .bind(&handle.url)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}
