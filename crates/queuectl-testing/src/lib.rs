//! Shared fixtures for `queuectl` integration tests: a throwaway SQLite
//! database per test, and small timing helpers for assertions that must
//! tolerate poll-interval jitter (spec §8, property 4).

use queuectl_core::config;
use queuectl_store_sqlite::SqliteJobStore;

/// A SQLite store backed by a file in a directory that is deleted when the
/// returned `TempDir` is dropped. Kept as a file (not `:memory:`) because
/// the store opens a read-only second pool in dashboard tests, and SQLite's
/// `:memory:` databases are not shared across connections.
pub struct TempStore {
    pub dir: tempfile::TempDir,
    pub store: SqliteJobStore,
}

impl TempStore {
    pub async fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("queuectl.db");
        let store = SqliteJobStore::connect(db_path.to_str().unwrap()).await?;
        queuectl_core::store::Store::init(&store).await?;
        Ok(Self { dir, store })
    }

    pub fn db_path(&self) -> std::path::PathBuf {
        self.dir.path().join("queuectl.db")
    }
}

/// Seeds the config table's recognized keys with their documented defaults,
/// for tests that want explicit rather than implicit defaults.
pub async fn seed_default_config(store: &SqliteJobStore) -> anyhow::Result<()> {
    use queuectl_core::store::Store;
    store
        .config_set(config::KEY_MAX_RETRIES, &config::DEFAULT_MAX_RETRIES.to_string())
        .await?;
    store
        .config_set(config::KEY_BACKOFF_BASE, &config::DEFAULT_BACKOFF_BASE.to_string())
        .await?;
    Ok(())
}

/// Jittered sleep bound used by timing-sensitive assertions, so tests don't
/// flake on a busy CI host the way a bare `assert_eq!` on wall-clock delay
/// would. Mirrors the teacher crate's use of `fastrand` in its own dev
/// harness rather than reaching for a fixed sleep constant everywhere.
pub fn jitter_tolerance_ms() -> i64 {
    50 + fastrand::i64(0..100)
}
