use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use gator::commands::{self, Session, DEFAULT_BROWSE_LIMIT};
use gator::config::{config_dir, Config};
use gator::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(name = "gator", about = "RSS feed aggregator")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// List users
    Users,
    /// Delete all users, feeds, follows and posts
    Reset,
    /// Add a feed and follow it
    Addfeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List feeds the current user follows
    Following,
    /// Stop following a feed by URL
    Unfollow { url: String },
    /// Poll feeds forever, one feed per period (e.g. 1m, 30s)
    Agg {
        #[arg(value_name = "TIME_BETWEEN_REQS", value_parser = commands::parse_period)]
        time_between_reqs: Duration,
    },
    /// Show the newest posts from followed feeds
    Browse {
        #[arg(default_value_t = DEFAULT_BROWSE_LIMIT)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Default to info so the aggregator's per-cycle reports are visible
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config.database_path(config_path.parent().unwrap_or(Path::new("")));
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let mut session = Session {
        db,
        config,
        config_path,
    };
    let mut out = std::io::stdout();

    match args.command {
        Command::Register { name } => commands::register(&mut session, &name, &mut out).await,
        Command::Login { name } => commands::login(&mut session, &name, &mut out).await,
        Command::Users => commands::users(&session, &mut out).await,
        Command::Reset => commands::reset(&session, &mut out).await,
        Command::Addfeed { name, url } => commands::add_feed(&session, &name, &url, &mut out).await,
        Command::Feeds => commands::feeds(&session, &mut out).await,
        Command::Follow { url } => commands::follow(&session, &url, &mut out).await,
        Command::Following => commands::following(&session, &mut out).await,
        Command::Unfollow { url } => commands::unfollow(&session, &url, &mut out).await,
        Command::Browse { limit } => commands::browse(&session, limit, &mut out).await,
        Command::Agg { time_between_reqs } => {
            let cancel = CancellationToken::new();
            spawn_shutdown_listener(cancel.clone())?;
            let stats = commands::agg(&session, time_between_reqs, cancel, &mut out).await?;
            println!(
                "Stopped after {} cycles ({} failed)",
                stats.cycles, stats.failures
            );
            Ok(())
        }
    }
}

/// Cancel `token` on SIGINT or SIGTERM so an in-flight fetch is abandoned and
/// the scheduler exits between cycles.
fn spawn_shutdown_listener(token: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
            }
            token.cancel();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down gracefully");
        }
        token.cancel();
    });

    Ok(())
}
