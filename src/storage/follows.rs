use super::schema::Database;
use super::types::{DatabaseError, FeedFollow};

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Follow `feed_id` as `user_id`. Following twice is `AlreadyExists`.
    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollow, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::unique_as_exists(e, "feed follow"))?;

        let follow = sqlx::query_as::<_, FeedFollow>(
            r#"
                SELECT ff.id, ff.user_id, ff.feed_id, u.name AS user_name,
                       f.name AS feed_name, ff.created_at
                FROM feed_follows ff
                JOIN users u ON u.id = ff.user_id
                JOIN feeds f ON f.id = ff.feed_id
                WHERE ff.id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(follow)
    }

    /// Feeds followed by `user_id`, oldest follow first.
    pub async fn get_feed_follows_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<FeedFollow>, DatabaseError> {
        sqlx::query_as::<_, FeedFollow>(
            r#"
                SELECT ff.id, ff.user_id, ff.feed_id, u.name AS user_name,
                       f.name AS feed_name, ff.created_at
                FROM feed_follows ff
                JOIN users u ON u.id = ff.user_id
                JOIN feeds f ON f.id = ff.feed_id
                WHERE ff.user_id = ?
                ORDER BY ff.created_at, ff.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Stop following. `NotFound` if the user was not following the feed.
    pub async fn delete_feed_follow(&self, user_id: i64, feed_id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("feed follow".to_string()));
        }
        Ok(())
    }
}
