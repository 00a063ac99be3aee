//! Structured logging bootstrap, grounded on the teacher's
//! `quarlus-core::layers::init_tracing` (spec ambient stack §3).

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber. Respects `RUST_LOG`; falls back
/// to `info` level for everything, since `x0d` has no `tower_http`-shaped
/// layer whose noise needs a dedicated default filter term.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".parse().unwrap()))
        .init();
}
