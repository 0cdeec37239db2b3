//! gator: a command-line RSS aggregator.
//!
//! On a fixed period the aggregator picks the feed that has waited longest
//! since its last fetch, downloads its RSS document, normalizes each entry and
//! stores posts it has not seen before.
//!
//! - [`feed`] - fetching, parsing and date normalization
//! - [`storage`] - SQLite store and the feed selection queries
//! - [`ingest`] - one aggregation cycle
//! - [`scheduler`] - the fixed-period loop around it
//! - [`commands`] - CLI command handlers

pub mod commands;
pub mod config;
pub mod feed;
pub mod ingest;
pub mod scheduler;
pub mod storage;
pub mod util;
