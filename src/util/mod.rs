//! Input validation for command-line arguments.
//!
//! - **Names**: control-character stripping and emptiness checks
//! - **URLs**: feed URLs must be fetchable http(s) URLs

mod text;
mod url_validator;

pub use text::{sanitize_name, strip_control_chars, EmptyNameError};
pub use url_validator::{validate_feed_url, UrlValidationError};
