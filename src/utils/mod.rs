//! Utils Module
pub mod truncate;

pub use truncate::{approx_token_count, truncate_text, TruncationPolicy};