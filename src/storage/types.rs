use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage errors. Any of them aborts the batch being written; the open
/// transaction is rolled back.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another process holds the database lock
    #[error("The article database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A non-SQL store refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Maps SQLite lock failures to [`StorageError::InstanceLocked`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return StorageError::InstanceLocked;
        }
        StorageError::Database(err)
    }
}

// SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Data Structures
// ============================================================================

/// A persisted feed, identified by its URL.
///
/// Written once on first sight; only [`ArticleStore::update_source`]
/// changes it afterwards.
///
/// [`ArticleStore::update_source`]: super::ArticleStore::update_source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedHandle {
    pub url: String,
    pub title: Option<String>,
    pub homepage_url: Option<String>,
    pub image_url: Option<String>,
}

/// A cached article. Never overwritten once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredArticle {
    pub url: String,
    pub title: String,
    pub top_image: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub text: String,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub cached_at: DateTime<Utc>,
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SourceRow {
    pub url: String,
    pub title: Option<String>,
    pub homepage_url: Option<String>,
    pub image_url: Option<String>,
}

impl SourceRow {
    pub(crate) fn into_handle(self) -> FeedHandle {
        FeedHandle {
            url: self.url,
            title: self.title,
            homepage_url: self.homepage_url,
            image_url: self.image_url,
        }
    }
}

/// Timestamps are stored as unix seconds.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleRow {
    pub url: String,
    pub title: String,
    pub top_image: Option<String>,
    pub publish_date: Option<i64>,
    pub text: String,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub cached_at: i64,
}

impl ArticleRow {
    pub(crate) fn into_article(self) -> StoredArticle {
        StoredArticle {
            url: self.url,
            title: self.title,
            top_image: self.top_image,
            publish_date: self
                .publish_date
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            text: self.text,
            source_name: self.source_name,
            source_url: self.source_url,
            cached_at: DateTime::from_timestamp(self.cached_at, 0).unwrap_or_default(),
        }
    }
}
