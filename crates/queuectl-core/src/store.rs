//! The `Store` trait (spec §4.1): the single source of truth and the only
//! place concurrent coordination happens. `queuectl-store-sqlite` is the
//! one implementation shipped today; the trait exists so `queuectl-core`
//! (and its tests) never depend on a concrete database driver.

use crate::error::QueuectlError;
use crate::job::{Job, JobSpec, JobState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[async_trait]
pub trait Store: Send + Sync {
    /// Idempotent: create schema if absent.
    async fn init(&self) -> Result<(), QueuectlError>;

    /// Insert a new job in `pending`. Fails `DuplicateId` if `spec.id` is
    /// already present, `InvalidInput` if `spec.command` is empty.
    async fn enqueue(&self, spec: JobSpec) -> Result<Job, QueuectlError>;

    /// Atomically claim at most one eligible job for `worker_id`. See
    /// `policy::CLAIM_ORDER_BY` for the selection order. Must be
    /// serializable against concurrent callers.
    async fn claim(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>, QueuectlError>;

    /// `processing -> completed`. Increments `attempts`.
    async fn complete(
        &self,
        id: &str,
        exit_code: i64,
        stdout: &str,
        stderr: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueuectlError>;

    /// `processing -> pending` (retry) or `processing -> dead` (exhausted).
    /// Increments `attempts`; on retry, schedules `next_run_at = now +
    /// min(backoff_base ^ attempts, backoff_cap_secs)` seconds.
    #[allow(clippy::too_many_arguments)]
    async fn fail(
        &self,
        id: &str,
        exit_code: i64,
        error: &str,
        stdout: &str,
        stderr: &str,
        now: DateTime<Utc>,
        backoff_base: i64,
        backoff_cap_secs: i64,
    ) -> Result<(), QueuectlError>;

    /// Jobs ordered by `created_at DESC`, paginated.
    async fn list(
        &self,
        state: Option<JobState>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, QueuectlError>;

    async fn get(&self, id: &str) -> Result<Option<Job>, QueuectlError>;

    async fn counts_by_state(&self) -> Result<BTreeMap<String, i64>, QueuectlError>;

    async fn dlq_list(&self, limit: i64, offset: i64) -> Result<Vec<Job>, QueuectlError> {
        self.list(Some(JobState::Dead), limit, offset).await
    }

    /// Requires the job to exist and be `dead`. Resets it to `pending`,
    /// `attempts = 0`, `next_run_at = now`, and clears
    /// error/exit_code/stdout/stderr/claimed_*.
    async fn dlq_retry(
        &self,
        id: &str,
        new_max_retries: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Job, QueuectlError>;

    async fn config_set(&self, key: &str, value: &str) -> Result<(), QueuectlError>;

    async fn config_get(&self, key: &str) -> Result<Option<String>, QueuectlError>;

    /// Optional lease-timeout sweeper (spec §7/§9). Moves jobs stuck in
    /// `processing` with an expired lease back through the retry/DLQ
    /// threshold with `error = "lease_expired"`. Returns the count moved.
    async fn reclaim_expired(
        &self,
        lease: chrono::Duration,
        now: DateTime<Utc>,
        backoff_base: i64,
        backoff_cap_secs: i64,
    ) -> Result<u64, QueuectlError>;

    /// Administrative maintenance: deletes `completed` jobs older than
    /// `older_than`. Never invoked by the core lifecycle itself.
    async fn vacuum_completed(&self, older_than: DateTime<Utc>) -> Result<u64, QueuectlError>;
}
