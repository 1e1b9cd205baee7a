//! Request Rate Controller (spec §4.A): admits outbound model calls within a
//! per-minute budget, with a priority queue and adaptive back-off.
//!
//! Grounded on the teacher's `safety/rate_limiter.rs` token bucket, widened
//! from a fixed per-tool map into a single async-admitting controller shared
//! across all outbound calls, and given a second algorithm (fixed window)
//! per spec §4.A.

mod bucket;
mod controller;
mod window;

pub use controller::{RateAlgorithm, RateController, RateControllerConfig};
