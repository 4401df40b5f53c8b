//! Shared helpers for integration tests

#![allow(dead_code)]

use tracing_subscriber::{fmt, EnvFilter};

/// Install a test subscriber. `RUST_LOG=tessera_syntax=trace` shows
/// every synchronization the parser performs.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// `n` well formed collections, each with two fields
pub fn collections(n: usize) -> String {
    (0..n)
        .map(|i| format!("#Model{i}\n  name: str\n  count: int\n"))
        .collect()
}
