use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The database is locked by another gator process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The requested row does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness constraint rejected the write
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
            if matches!(db_err.code().as_deref(), Some("5") | Some("6") | Some("14")) {
                return DatabaseError::InstanceLocked;
            }
        }
        DatabaseError::Other(err)
    }

    /// Map a unique-constraint violation to [`DatabaseError::AlreadyExists`].
    pub(crate) fn unique_as_exists(err: sqlx::Error, what: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::AlreadyExists(what.into())
            }
            _ => DatabaseError::from_sqlx(err),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// An account. Feeds and follows hang off it.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A subscription source polled by the aggregator.
///
/// `last_fetched_at` is `None` until the selector first hands the feed out.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Feed listing row joined with its owner's name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedWithOwner {
    pub name: String,
    pub url: String,
    pub owner: Option<String>,
}

/// A user following a feed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub user_name: String,
    pub feed_name: String,
    pub created_at: i64,
}

/// A persisted, deduplicated entry.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    /// Unix seconds; `None` when the feed gave no usable date
    pub published_at: Option<i64>,
    pub feed_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Post listing row for `browse`, carrying the feed name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostWithFeed {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub feed_name: String,
}

/// Insert candidate built by the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub feed_id: i64,
}

/// Result of [`Database::create_post`](super::Database::create_post).
///
/// A duplicate URL is an expected outcome on every poll after the first, so it
/// is a value here rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Post),
    Conflict,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}
