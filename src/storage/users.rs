use super::schema::Database;
use super::types::{DatabaseError, User};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. Fails with `AlreadyExists` if the name is taken.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query_as::<_, User>(
            "INSERT INTO users (name, created_at, updated_at) VALUES (?, ?, ?)
             RETURNING id, name, created_at, updated_at",
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::unique_as_exists(e, format!("user '{}'", name)))
    }

    /// Look up a user by name.
    pub async fn get_user(&self, name: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::NotFound(format!("user '{}'", name)))
    }

    /// All users, by name.
    pub async fn get_users(&self) -> Result<Vec<User>, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT id, name, created_at, updated_at FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    /// Delete every user. Feeds, follows and posts go with them via cascade.
    ///
    /// Returns the number of users removed.
    pub async fn delete_users(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = test_db().await;
        let created = db.create_user("lane").await.unwrap();
        let fetched = db.get_user("lane").await.unwrap();
        assert_eq!(created, fetched);
        assert!(created.id > 0);
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let db = test_db().await;
        db.create_user("lane").await.unwrap();
        let err = db.create_user("lane").await.unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_get_missing_user_not_found() {
        let db = test_db().await;
        let err = db.get_user("nobody").await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_users_cascades() {
        let db = test_db().await;
        let user = db.create_user("lane").await.unwrap();
        db.create_user("kahya").await.unwrap();
        db.create_feed("Blog", "https://example.com/rss", user.id)
            .await
            .unwrap();

        assert_eq!(db.delete_users().await.unwrap(), 2);
        assert!(db.get_users().await.unwrap().is_empty());
        assert!(db.get_feeds_with_owner().await.unwrap().is_empty());
    }
}
