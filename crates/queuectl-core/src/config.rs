//! Recognized configuration keys (spec §6) and the flat-map storage
//! convention: hyphen and underscore forms of a key address the same row,
//! persisted canonically with underscores. Unrecognized keys are stored
//! opaquely (see `SPEC_FULL.md` §3, resolving the corresponding Open
//! Question from spec §9).

pub const KEY_MAX_RETRIES: &str = "max_retries";
pub const KEY_BACKOFF_BASE: &str = "backoff_base";
pub const KEY_WORKER_POLL_INTERVAL: &str = "worker_poll_interval";
pub const KEY_DB_PATH: &str = "db_path";

pub const DEFAULT_MAX_RETRIES: i64 = 3;
pub const DEFAULT_BACKOFF_BASE: i64 = 2;
pub const DEFAULT_WORKER_POLL_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_DB_PATH: &str = "./data/queuectl.db";

/// Backoff delay is capped here so `backoff_base ^ attempts` cannot grow
/// unboundedly (spec §9 "SHOULD cap the delay"; decided in `DESIGN.md`).
pub const DEFAULT_BACKOFF_CAP_SECS: i64 = 3600;

/// Default per-job execution timeout (spec §4.2).
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 300;

/// Default manager stop grace period (spec §4.4 / §5).
pub const DEFAULT_STOP_GRACE_SECS: u64 = 10;

/// Canonicalize a config key: hyphens become underscores so `max-retries`
/// and `max_retries` address the same row.
pub fn normalize_key(key: &str) -> String {
    key.replace('-', "_")
}

/// A one-shot snapshot of the recognized keys, read at the start of a CLI
/// invocation or worker-manager startup. Never cached across operations.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub max_retries: i64,
    pub backoff_base: i64,
    pub worker_poll_interval_secs: u64,
    pub db_path: String,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            worker_poll_interval_secs: DEFAULT_WORKER_POLL_INTERVAL_SECS,
            db_path: DEFAULT_DB_PATH.to_string(),
        }
    }
}

impl ConfigSnapshot {
    /// Reads the four recognized keys from the store, falling back to their
    /// documented defaults for anything unset. Called once per CLI
    /// invocation and once at worker-manager startup (SPEC_FULL.md §3) —
    /// never cached beyond a single operation.
    pub async fn load(store: &dyn crate::store::Store) -> Result<Self, crate::error::QueuectlError> {
        let defaults = Self::default();

        let max_retries = match store.config_get(KEY_MAX_RETRIES).await? {
            Some(v) => v.parse().unwrap_or(defaults.max_retries),
            None => defaults.max_retries,
        };
        let backoff_base = match store.config_get(KEY_BACKOFF_BASE).await? {
            Some(v) => v.parse().unwrap_or(defaults.backoff_base),
            None => defaults.backoff_base,
        };
        let worker_poll_interval_secs = match store.config_get(KEY_WORKER_POLL_INTERVAL).await? {
            Some(v) => v.parse().unwrap_or(defaults.worker_poll_interval_secs),
            None => defaults.worker_poll_interval_secs,
        };
        let db_path = match store.config_get(KEY_DB_PATH).await? {
            Some(v) => v,
            None => defaults.db_path,
        };

        Ok(Self {
            max_retries,
            backoff_base,
            worker_poll_interval_secs,
            db_path,
        })
    }
}
