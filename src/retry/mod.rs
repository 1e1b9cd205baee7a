//! Retry / Timeout Harness (spec §4.B): wraps a fallible async operation
//! with back-off, jitter, per-attempt timeout, and cancellation.

mod backoff;
mod harness;

pub use backoff::BackoffKind;
pub use harness::{run, RetryError, RetryOptions};
