//! One aggregation cycle: pick the most overdue feed, fetch it, store new posts.
//!
//! The feed is marked fetched *before* the network call. A feed that keeps
//! failing therefore still rotates to the back of the queue instead of being
//! retried ahead of every other feed on the next tick.
//!
//! Per-entry problems (bad date, missing link, store failure) are logged and
//! absorbed; only selection, marking and fetching can fail a cycle.

use crate::feed::{fetch_document, normalize_date, Entry, FetchError, FetchOptions};
use crate::storage::{Database, DatabaseError, Feed, InsertOutcome, NewPost};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Cycle-level failures. None of these are fatal to the scheduler.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No feeds are registered
    #[error("No feeds to fetch")]
    NoFeeds,
    /// Selecting the next feed failed
    #[error("Failed to identify next feed to fetch: {0}")]
    Select(#[source] DatabaseError),
    /// Stamping the feed as fetched failed
    #[error("Failed to mark feed '{feed}' as fetched: {source}")]
    Mark {
        feed: String,
        #[source]
        source: DatabaseError,
    },
    /// The document could not be retrieved or parsed
    #[error("Failed to fetch feed '{feed}' from {url}: {source}")]
    Fetch {
        feed: String,
        url: String,
        #[source]
        source: FetchError,
    },
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: i64,
    pub feed_name: String,
    /// Entries in the fetched document
    pub entries: usize,
    pub inserted: usize,
    /// Entries whose URL was already stored
    pub duplicates: usize,
    /// Stored without a publication time because the date was unparseable
    pub undated: usize,
    /// Entries skipped for a missing link or a store failure
    pub failed: usize,
}

/// Everything a cycle needs, passed explicitly instead of living in globals.
#[derive(Clone)]
pub struct Ingestor {
    db: Database,
    client: reqwest::Client,
    options: FetchOptions,
    cancel: CancellationToken,
}

impl Ingestor {
    pub fn new(
        db: Database,
        client: reqwest::Client,
        options: FetchOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            client,
            options,
            cancel,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run one cycle against the most overdue feed.
    ///
    /// # Errors
    ///
    /// - [`IngestError::NoFeeds`] - nothing registered
    /// - [`IngestError::Select`] / [`IngestError::Mark`] - store failure before fetching
    /// - [`IngestError::Fetch`] - transport or decode failure; nothing is inserted
    pub async fn run_cycle(&self) -> Result<CycleReport, IngestError> {
        let feed = match self.db.get_next_feed_to_fetch().await {
            Ok(feed) => feed,
            Err(DatabaseError::NotFound(_)) => return Err(IngestError::NoFeeds),
            Err(e) => return Err(IngestError::Select(e)),
        };

        self.db
            .mark_feed_fetched(feed.id)
            .await
            .map_err(|source| IngestError::Mark {
                feed: feed.name.clone(),
                source,
            })?;

        tracing::debug!(feed_id = feed.id, url = %feed.url, "Fetching feed");

        let document = fetch_document(&self.client, &feed.url, &self.options, &self.cancel)
            .await
            .map_err(|source| {
                // Transport failures heal on the feed's next turn; a bad body
                // usually means the URL is not an RSS feed at all
                if !source.is_transport() {
                    tracing::warn!(
                        feed_id = feed.id,
                        url = %feed.url,
                        error = %source,
                        "Feed did not return a usable RSS document"
                    );
                }
                IngestError::Fetch {
                    feed: feed.name.clone(),
                    url: feed.url.clone(),
                    source,
                }
            })?;

        let mut report = CycleReport {
            feed_id: feed.id,
            feed_name: feed.name.clone(),
            entries: document.channel.items.len(),
            ..CycleReport::default()
        };

        for entry in &document.channel.items {
            self.store_entry(&feed, entry, &mut report).await;
        }

        tracing::info!(
            feed_id = report.feed_id,
            feed = %report.feed_name,
            entries = report.entries,
            inserted = report.inserted,
            duplicates = report.duplicates,
            undated = report.undated,
            failed = report.failed,
            "Feed cycle complete"
        );

        Ok(report)
    }

    async fn store_entry(&self, feed: &Feed, entry: &Entry, report: &mut CycleReport) {
        if entry.link.trim().is_empty() {
            tracing::warn!(feed_id = feed.id, title = %entry.title, "Entry has no link, skipping");
            report.failed += 1;
            return;
        }

        let post = match build_post(feed.id, entry) {
            Ok(post) => post,
            Err((post, e)) => {
                tracing::warn!(
                    feed_id = feed.id,
                    title = %entry.title,
                    error = %e,
                    "Failed to parse published date, storing without one"
                );
                report.undated += 1;
                post
            }
        };

        match self.db.create_post(&post).await {
            Ok(InsertOutcome::Inserted(_)) => report.inserted += 1,
            Ok(InsertOutcome::Conflict) => {
                tracing::debug!(url = %post.url, "Post already stored");
                report.duplicates += 1;
            }
            Err(e) => {
                tracing::warn!(
                    feed_id = feed.id,
                    title = %entry.title,
                    error = %e,
                    "Failed to create post"
                );
                report.failed += 1;
            }
        }
    }
}

/// Build the insert candidate for an entry.
///
/// An unparseable date still yields a usable post (with no timestamp); it is
/// returned on the `Err` side together with the parse error so the caller can
/// report it.
fn build_post(
    feed_id: i64,
    entry: &Entry,
) -> Result<NewPost, (NewPost, crate::feed::DateParseError)> {
    let (published_at, date_error) = match normalize_date(&entry.pub_date) {
        Ok(published) => (published, None),
        Err(e) => (None, Some(e)),
    };

    let post = NewPost {
        title: entry.title.clone(),
        url: entry.link.trim().to_string(),
        description: Some(entry.description.clone()).filter(|d| !d.is_empty()),
        published_at,
        feed_id,
    };

    match date_error {
        None => Ok(post),
        Some(e) => Err((post, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(link: &str, description: &str, pub_date: &str) -> Entry {
        Entry {
            title: "Title".to_string(),
            link: link.to_string(),
            description: description.to_string(),
            pub_date: pub_date.to_string(),
        }
    }

    #[test]
    fn test_build_post_with_date_and_description() {
        let post = build_post(
            7,
            &entry("https://example.com/a", "body", "2024-01-02 03:04:05"),
        )
        .unwrap();
        assert_eq!(post.feed_id, 7);
        assert_eq!(post.description.as_deref(), Some("body"));
        assert_eq!(
            post.published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
    }

    #[test]
    fn test_build_post_empty_description_and_date_absent() {
        let post = build_post(1, &entry("https://example.com/a", "", "")).unwrap();
        assert_eq!(post.description, None);
        assert_eq!(post.published_at, None);
    }

    #[test]
    fn test_build_post_bad_date_still_yields_post() {
        let (post, err) =
            build_post(1, &entry("https://example.com/a", "", "yesterday-ish")).unwrap_err();
        assert_eq!(post.published_at, None);
        assert_eq!(post.url, "https://example.com/a");
        assert_eq!(err.input, "yesterday-ish");
    }

    #[test]
    fn test_build_post_trims_link() {
        let post = build_post(1, &entry("  https://example.com/a\n", "", "")).unwrap();
        assert_eq!(post.url, "https://example.com/a");
    }
}
