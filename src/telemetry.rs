//! Tracing subscriber bootstrap, mirroring the teacher's `main.rs`
//! `FmtSubscriber::builder()...set_global_default` pattern. Installing the
//! subscriber is additive and opt-in: a library crate should not force its
//! logging format on an embedder.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading `RUST_LOG`, defaulting to
/// `info`. Idempotent: a second call is a no-op if a subscriber is already
/// installed.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
