use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedWithOwner};

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed owned by `user_id`. URLs are globally unique.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query_as::<_, Feed>(&format!(
            "INSERT INTO feeds (name, url, user_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::unique_as_exists(e, format!("feed '{}'", url)))
    }

    /// All feeds with the name of the user who added them.
    pub async fn get_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        sqlx::query_as::<_, FeedWithOwner>(
            r#"
                SELECT f.name, f.url, u.name AS owner
                FROM feeds f
                LEFT JOIN users u ON u.id = f.user_id
                ORDER BY f.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, DatabaseError> {
        sqlx::query_as::<_, Feed>(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .ok_or_else(|| DatabaseError::NotFound(format!("feed '{}'", url)))
    }

    // ========================================================================
    // Feed Selection
    // ========================================================================

    /// The feed most overdue for a fetch: never-fetched feeds first, then the
    /// oldest `last_fetched_at`, ties broken by id. No side effects.
    ///
    /// Fails with `NotFound` when no feeds are registered.
    pub async fn get_next_feed_to_fetch(&self) -> Result<Feed, DatabaseError> {
        sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds
             ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
             LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::NotFound("feed to fetch".to_string()))
    }

    /// Stamp a feed as fetched now, sending it to the back of the rotation.
    ///
    /// The stored mark is strictly greater than every existing mark, so
    /// rotation order stays total when several marks land in one clock second.
    pub async fn mark_feed_fetched(&self, feed_id: i64) -> Result<(), DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE feeds
             SET last_fetched_at = MAX(?, COALESCE((SELECT MAX(last_fetched_at) FROM feeds), 0) + 1),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("feed {}", feed_id)));
        }
        Ok(())
    }
}
