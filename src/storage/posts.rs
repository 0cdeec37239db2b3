use super::schema::Database;
use super::types::{DatabaseError, InsertOutcome, NewPost, Post, PostWithFeed};

/// Maximum number of posts to return from any single query (OOM protection)
const MAX_POSTS: i64 = 2000;

const POST_COLUMNS: &str =
    "id, title, url, description, published_at, feed_id, created_at, updated_at";

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post unless one with the same URL already exists.
    ///
    /// A URL collision yields `Ok(InsertOutcome::Conflict)`; the existing row
    /// is left untouched. Any other failure is an error.
    pub async fn create_post(&self, post: &NewPost) -> Result<InsertOutcome, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let inserted = sqlx::query_as::<_, Post>(&format!(
            "INSERT INTO posts (title, url, description, published_at, feed_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(url) DO NOTHING
             RETURNING {POST_COLUMNS}"
        ))
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at.map(|t| t.timestamp()))
        .bind(post.feed_id)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(match inserted {
            Some(row) => InsertOutcome::Inserted(row),
            None => InsertOutcome::Conflict,
        })
    }

    /// Newest posts from feeds `user_id` follows. Undated posts sort last.
    ///
    /// `limit` is capped at [`MAX_POSTS`].
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<PostWithFeed>, DatabaseError> {
        let limit = limit.min(MAX_POSTS);
        sqlx::query_as::<_, PostWithFeed>(
            r#"
                SELECT p.title, p.url, p.description, p.published_at, f.name AS feed_name
                FROM posts p
                JOIN feed_follows ff ON ff.feed_id = p.feed_id
                JOIN feeds f ON f.id = p.feed_id
                WHERE ff.user_id = ?
                ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC, p.id DESC
                LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Posts ingested from one feed, in insertion order.
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE feed_id = ? ORDER BY id LIMIT ?"
        ))
        .bind(feed_id)
        .bind(MAX_POSTS)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, InsertOutcome, NewPost};
    use chrono::{TimeZone, Utc};

    async fn setup() -> (Database, i64, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("lane").await.unwrap();
        let feed = db
            .create_feed("Blog", "https://example.com/rss", user.id)
            .await
            .unwrap();
        (db, user.id, feed.id)
    }

    fn new_post(feed_id: i64, slug: &str) -> NewPost {
        NewPost {
            title: format!("Post {}", slug),
            url: format!("https://example.com/{}", slug),
            description: None,
            published_at: None,
            feed_id,
        }
    }

    #[tokio::test]
    async fn test_insert_then_conflict() {
        let (db, _, feed_id) = setup().await;
        let post = new_post(feed_id, "a");

        let first = db.create_post(&post).await.unwrap();
        assert!(first.is_inserted());
        let second = db.create_post(&post).await.unwrap();
        assert_eq!(second, InsertOutcome::Conflict);
        assert_eq!(db.count_posts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_conflict_keeps_original_row() {
        let (db, _, feed_id) = setup().await;
        db.create_post(&new_post(feed_id, "a")).await.unwrap();

        let mut changed = new_post(feed_id, "a");
        changed.title = "Rewritten".to_string();
        assert_eq!(db.create_post(&changed).await.unwrap(), InsertOutcome::Conflict);

        let posts = db.get_posts_for_feed(feed_id).await.unwrap();
        assert_eq!(posts[0].title, "Post a");
    }

    #[tokio::test]
    async fn test_published_round_trip() {
        let (db, _, feed_id) = setup().await;
        let when = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut post = new_post(feed_id, "dated");
        post.published_at = Some(when);
        post.description = Some("desc".to_string());

        let InsertOutcome::Inserted(row) = db.create_post(&post).await.unwrap() else {
            panic!("expected insert");
        };
        assert_eq!(row.published(), Some(when));
        assert_eq!(row.description.as_deref(), Some("desc"));
    }

    #[tokio::test]
    async fn test_unknown_feed_is_error_not_conflict() {
        let (db, _, _) = setup().await;
        let err = db.create_post(&new_post(9999, "orphan")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Other(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_posts_for_user_newest_first_undated_last() {
        let (db, user_id, feed_id) = setup().await;
        db.create_feed_follow(user_id, feed_id).await.unwrap();

        let mut old = new_post(feed_id, "old");
        old.published_at = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let mut new = new_post(feed_id, "new");
        new.published_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let undated = new_post(feed_id, "undated");

        for p in [&undated, &old, &new] {
            db.create_post(p).await.unwrap();
        }

        let posts = db.get_posts_for_user(user_id, 10).await.unwrap();
        let titles: Vec<&str> = posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Post new", "Post old", "Post undated"]);

        let limited = db.get_posts_for_user(user_id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].feed_name, "Blog");
    }

    #[tokio::test]
    async fn test_posts_for_user_requires_follow() {
        let (db, user_id, feed_id) = setup().await;
        db.create_post(&new_post(feed_id, "a")).await.unwrap();
        assert!(db.get_posts_for_user(user_id, 10).await.unwrap().is_empty());
    }
}
