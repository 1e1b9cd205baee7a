//! Tracing setup, following the teacher's `tracing_subscriber::fmt()` +
//! `EnvFilter::from_default_env()` pattern (`src/bin/ingest_pdf.rs`).

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Safe to call more than once
/// per process (subsequent calls are no-ops) so tests can call it freely.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crew_runtime=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
