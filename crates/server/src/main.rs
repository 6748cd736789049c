//! # stratakv-server
//!
//! Binds a TCP listener and serves the RESP2 protocol against a store.
//!
//! ## Configuration
//!
//! All settings are environment variables with defaults:
//!
//! ```text
//! STRATA_ROOT      store root directory         (default: "./Database")
//! STRATA_PORT      TCP listen port              (default: 6379)
//! STRATA_FLUSH_KB  memtable threshold in KiB    (default: engine constant)
//! STRATA_FANOUT    compaction fan-out threshold (default: 4)
//! STRATA_WAL_SYNC  fsync every WAL append       (default: "false")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ STRATA_PORT=6400 stratakv-server
//! [INFO] opening store at ./Database
//! [INFO] stratakv listening on 0.0.0.0:6400
//! $ redis-cli -p 6400 SET name alice
//! OK
//! $ redis-cli -p 6400 GET name
//! "alice"
//! ```

use std::net::TcpListener;
use std::sync::Arc;

use anyhow::Result;
use engine::{Store, StoreOptions, MIN_TH};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let root = env_or("STRATA_ROOT", "./Database");
    let port: u16 = env_or("STRATA_PORT", "6379").parse().unwrap_or(6379);

    let mut opts = StoreOptions::default();
    if let Ok(kb) = env_or("STRATA_FLUSH_KB", "").parse::<usize>() {
        opts.memtable_bytes = kb * 1024;
    }
    opts.fanout_threshold = env_or("STRATA_FANOUT", "").parse().unwrap_or(MIN_TH);
    opts.wal_sync = env_or("STRATA_WAL_SYNC", "false").parse().unwrap_or(false);

    let store = Arc::new(Store::open_with(&root, opts)?);
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    log::info!("stratakv listening on 0.0.0.0:{port} (root={root})");

    server::serve(listener, store)
}
