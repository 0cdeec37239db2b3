//! Command handlers behind the CLI.
//!
//! Each handler takes the [`Session`] (store + config) explicitly and writes
//! its user-facing output to `out`.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::feed::build_client;
use crate::ingest::Ingestor;
use crate::scheduler::{self, SchedulerStats};
use crate::storage::{Database, DatabaseError, User};
use crate::util::{sanitize_name, validate_feed_url};

/// Default number of posts shown by `browse`.
pub const DEFAULT_BROWSE_LIMIT: i64 = 2;

/// Store handle plus the loaded configuration and where it lives.
pub struct Session {
    pub db: Database,
    pub config: Config,
    pub config_path: PathBuf,
}

impl Session {
    /// Resolve the acting user from config. Commands that act on behalf of a
    /// user call this first.
    pub async fn current_user(&self) -> Result<User> {
        let name = self
            .config
            .current_user_name
            .as_deref()
            .context("No user logged in. Run `gator register <name>` or `gator login <name>` first")?;
        self.db
            .get_user(name)
            .await
            .with_context(|| format!("Couldn't find current user '{}'", name))
    }
}

// ============================================================================
// Users
// ============================================================================

pub async fn register(session: &mut Session, name: &str, out: &mut dyn Write) -> Result<()> {
    let name = sanitize_name(name, "User name")?;
    let user = session
        .db
        .create_user(&name)
        .await
        .context("Couldn't create user")?;
    session
        .config
        .set_user(&user.name, &session.config_path)
        .context("Couldn't set current user")?;

    writeln!(out, "User created successfully:")?;
    writeln!(out, " * ID:      {}", user.id)?;
    writeln!(out, " * Name:    {}", user.name)?;
    Ok(())
}

pub async fn login(session: &mut Session, name: &str, out: &mut dyn Write) -> Result<()> {
    let user = session
        .db
        .get_user(name.trim())
        .await
        .context("Couldn't find user")?;
    session
        .config
        .set_user(&user.name, &session.config_path)
        .context("Couldn't set current user")?;

    writeln!(out, "User switched successfully!")?;
    Ok(())
}

pub async fn users(session: &Session, out: &mut dyn Write) -> Result<()> {
    let current = session.config.current_user_name.as_deref();
    for user in session.db.get_users().await? {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

pub async fn reset(session: &Session, out: &mut dyn Write) -> Result<()> {
    let removed = session
        .db
        .delete_users()
        .await
        .context("Couldn't delete users")?;
    tracing::info!(users = removed, "Database reset");
    writeln!(out, "Deleted users successfully!")?;
    Ok(())
}

// ============================================================================
// Feeds and follows
// ============================================================================

pub async fn add_feed(session: &Session, name: &str, url: &str, out: &mut dyn Write) -> Result<()> {
    let user = session.current_user().await?;
    let name = sanitize_name(name, "Feed name")?;
    let url = validate_feed_url(url)?;

    let feed = session
        .db
        .create_feed(&name, url.as_str(), user.id)
        .await
        .context("Couldn't create feed")?;
    session
        .db
        .create_feed_follow(user.id, feed.id)
        .await
        .context("Couldn't follow new feed")?;

    writeln!(out, "Feed created:")?;
    writeln!(out, " * ID:      {}", feed.id)?;
    writeln!(out, " * Name:    {}", feed.name)?;
    writeln!(out, " * URL:     {}", feed.url)?;
    Ok(())
}

pub async fn feeds(session: &Session, out: &mut dyn Write) -> Result<()> {
    let feeds = session.db.get_feeds_with_owner().await?;
    writeln!(out, "{:<20} {:<55} {:<12}", "Feed Name", "Feed URL", "Owner")?;
    for feed in feeds {
        let owner = feed.owner.as_deref().unwrap_or("(unknown)");
        writeln!(out, "{:<20} {:<55} {:<12}", feed.name, feed.url, owner)?;
    }
    Ok(())
}

pub async fn follow(session: &Session, url: &str, out: &mut dyn Write) -> Result<()> {
    let user = session.current_user().await?;
    let feed = session.db.get_feed_by_url(url.trim()).await?;
    let follow = match session.db.create_feed_follow(user.id, feed.id).await {
        Ok(follow) => follow,
        Err(DatabaseError::AlreadyExists(_)) => {
            bail!("{} already follows '{}'", user.name, feed.name)
        }
        Err(e) => return Err(e.into()),
    };

    writeln!(
        out,
        "Created feed follow: {} for {}",
        follow.feed_name, follow.user_name
    )?;
    Ok(())
}

pub async fn following(session: &Session, out: &mut dyn Write) -> Result<()> {
    let user = session.current_user().await?;
    for follow in session.db.get_feed_follows_for_user(user.id).await? {
        writeln!(out, "{}", follow.feed_name)?;
    }
    Ok(())
}

pub async fn unfollow(session: &Session, url: &str, out: &mut dyn Write) -> Result<()> {
    let user = session.current_user().await?;
    let feed = session.db.get_feed_by_url(url.trim()).await?;
    session.db.delete_feed_follow(user.id, feed.id).await?;
    writeln!(out, "Feed successfully unfollowed!")?;
    Ok(())
}

// ============================================================================
// Posts
// ============================================================================

pub async fn browse(session: &Session, limit: i64, out: &mut dyn Write) -> Result<()> {
    if limit <= 0 {
        bail!("limit must be a positive integer, got: {}", limit);
    }
    let user = session.current_user().await?;
    let posts = session.db.get_posts_for_user(user.id, limit).await?;

    if posts.is_empty() {
        writeln!(out, "No posts found. Try following some feeds first!")?;
        return Ok(());
    }

    writeln!(out, "Found {} posts:\n", posts.len())?;
    for post in posts {
        writeln!(out, "Title: {}", post.title)?;
        writeln!(out, "URL: {}", post.url)?;
        if let Some(description) = post.description.as_deref().filter(|d| !d.is_empty()) {
            writeln!(out, "Description: {}", description)?;
        }
        writeln!(out, "Feed: {}", post.feed_name)?;
        if let Some(published) = post
            .published_at
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        {
            writeln!(out, "Published: {}", published.format("%Y-%m-%d %H:%M"))?;
        }
        writeln!(out, "---")?;
    }
    Ok(())
}

// ============================================================================
// Aggregation
// ============================================================================

/// Poll feeds every `period` until `cancel` fires.
pub async fn agg(
    session: &Session,
    period: Duration,
    cancel: CancellationToken,
    out: &mut dyn Write,
) -> Result<SchedulerStats> {
    let client = build_client(&session.config.user_agent).context("Couldn't build HTTP client")?;
    let ingestor = Ingestor::new(
        session.db.clone(),
        client,
        session.config.fetch_options(),
        cancel.clone(),
    );

    writeln!(
        out,
        "Collecting feeds every {}",
        humantime::format_duration(period)
    )?;
    out.flush()?;

    let stats = scheduler::run(period, cancel, || ingestor.run_cycle()).await;
    Ok(stats)
}

/// Shortest accepted `agg` period. Fetch marks have one-second resolution, so
/// faster polling would push them ahead of the wall clock.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Parse the `agg` period (`1m`, `30s`, `1h30m`). Anything under
/// [`MIN_PERIOD`] is rejected.
pub fn parse_period(arg: &str) -> Result<Duration, String> {
    let period = humantime::parse_duration(arg.trim())
        .map_err(|e| format!("invalid duration '{}': {}", arg, e))?;
    if period < MIN_PERIOD {
        return Err(format!(
            "duration must be at least {}",
            humantime::format_duration(MIN_PERIOD)
        ));
    }
    Ok(period)
}
