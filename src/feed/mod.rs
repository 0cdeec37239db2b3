//! Feed retrieval and normalization.
//!
//! - [`fetcher`] - single-shot HTTP GET with deadline and cancellation
//! - [`document`] - the RSS 2.0 channel/item reader and entity unescaping
//! - [`date`] - publication date normalization across known layouts
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{build_client, fetch_document, normalize_date, FetchOptions};
//!
//! let client = build_client("gator")?;
//! let doc = fetch_document(&client, url, &FetchOptions::default(), &cancel).await?;
//! for entry in &doc.channel.items {
//!     let published = normalize_date(&entry.pub_date).unwrap_or(None);
//! }
//! ```

mod date;
mod document;
mod fetcher;

pub use date::{normalize as normalize_date, DateParseError, Layout};
pub use document::{Channel, Document, DocumentError, Entry};
pub use fetcher::{
    build_client, fetch_document, FetchError, FetchOptions, DEFAULT_FETCH_TIMEOUT,
    MAX_DOCUMENT_SIZE,
};
