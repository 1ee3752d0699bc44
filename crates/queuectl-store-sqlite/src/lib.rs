//! SQLite implementation of the queuectl job store.
//!
//! This crate provides the one production [`queuectl_core::Store`]
//! implementation shipped with `queuectl` today.
//!
//! # Features
//!
//! - Single-writer serialization via `BEGIN IMMEDIATE`, matching the
//!   teacher crate's `FOR UPDATE SKIP LOCKED` claim but adapted to a
//!   database that has no row-level locking: the whole write lock is
//!   taken up front instead.
//! - Exponential backoff retry logic, capped (spec §9).
//! - Dead-letter queue for permanently failed jobs.
//! - An optional lease-reclaim sweep for jobs stuck in `processing`.
//!
//! `sqlx::Error` never crosses this crate's boundary: every fallible call
//! is mapped to [`QueuectlError::StorageError`] (or a more specific
//! variant, e.g. `DuplicateId` on a unique-constraint violation) here, so
//! `queuectl-core` and its callers stay free of any database driver.
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id TEXT PRIMARY KEY,
//!     command TEXT NOT NULL,
//!     state TEXT NOT NULL,
//!     attempts INTEGER NOT NULL DEFAULT 0,
//!     max_retries INTEGER NOT NULL,
//!     priority INTEGER NOT NULL DEFAULT 0,
//!     run_at TEXT NOT NULL,
//!     next_run_at TEXT NOT NULL,
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     exit_code INTEGER,
//!     error TEXT,
//!     stdout TEXT NOT NULL DEFAULT '',
//!     stderr TEXT NOT NULL DEFAULT '',
//!     claimed_by TEXT,
//!     claimed_at TEXT
//! );
//!
//! CREATE INDEX idx_jobs_claim ON jobs (state, priority DESC, next_run_at ASC, created_at ASC);
//! CREATE INDEX idx_jobs_state ON jobs (state);
//!
//! CREATE TABLE config (key TEXT PRIMARY KEY, value TEXT NOT NULL);
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use queuectl_store_sqlite::SqliteJobStore;
//!
//! let store = SqliteJobStore::connect("./data/queuectl.db").await?;
//! store.init().await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use queuectl_core::policy::CLAIM_ORDER_BY;
use queuectl_core::{Job, JobSpec, JobState, QueuectlError, Store};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Maps a driver error to the crate-agnostic `StorageError` `queuectl-core`
/// exposes. Kept as a free function (not a `From` impl) because orphan
/// rules forbid implementing a foreign trait for a foreign type from this
/// crate — `QueuectlError` lives in `queuectl-core`, `sqlx::Error` in `sqlx`.
fn storage_err(e: sqlx::Error) -> QueuectlError {
    QueuectlError::StorageError(e.to_string())
}

/// Extension for terse `.await.store_err()?` call sites below.
trait StoreErr<T> {
    fn store_err(self) -> Result<T, QueuectlError>;
}

impl<T> StoreErr<T> for Result<T, sqlx::Error> {
    fn store_err(self) -> Result<T, QueuectlError> {
        self.map_err(storage_err)
    }
}

/// SQLite-backed job store.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Open (creating if absent) the database file at `path`, with WAL
    /// journaling and a single-connection pool so every write is
    /// serialized the way spec §4.1 requires ("single-writer semantics
    /// suitable for one host").
    pub async fn connect(path: &str) -> Result<Self, QueuectlError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .store_err()?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .store_err()?;

        Ok(Self { pool })
    }

    /// Open a read-only pool, for the dashboard façade (spec §4.6: "MUST
    /// open the database read-only").
    pub async fn connect_read_only(path: &str) -> Result<Self, QueuectlError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .store_err()?
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .store_err()?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_job(row: SqliteRow) -> Result<Job, QueuectlError> {
    let state_str: String = row.try_get("state").store_err()?;
    let state = JobState::from_str(&state_str)?;

    Ok(Job {
        id: row.try_get("id").store_err()?,
        command: row.try_get("command").store_err()?,
        state,
        attempts: row.try_get("attempts").store_err()?,
        max_retries: row.try_get("max_retries").store_err()?,
        priority: row.try_get("priority").store_err()?,
        run_at: row.try_get("run_at").store_err()?,
        next_run_at: row.try_get("next_run_at").store_err()?,
        created_at: row.try_get("created_at").store_err()?,
        updated_at: row.try_get("updated_at").store_err()?,
        exit_code: row.try_get("exit_code").store_err()?,
        error: row.try_get("error").store_err()?,
        stdout: row.try_get("stdout").store_err()?,
        stderr: row.try_get("stderr").store_err()?,
        claimed_by: row.try_get("claimed_by").store_err()?,
        claimed_at: row.try_get("claimed_at").store_err()?,
    })
}

fn normalize_key(key: &str) -> String {
    queuectl_core::config::normalize_key(key)
}

#[async_trait]
impl Store for SqliteJobStore {
    async fn init(&self) -> Result<(), QueuectlError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                command TEXT NOT NULL,
                state TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                run_at TEXT NOT NULL,
                next_run_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                exit_code INTEGER,
                error TEXT,
                stdout TEXT NOT NULL DEFAULT '',
                stderr TEXT NOT NULL DEFAULT '',
                claimed_by TEXT,
                claimed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .store_err()?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs (state, priority DESC, next_run_at ASC, created_at ASC)",
        )
        .execute(&self.pool)
        .await
        .store_err()?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs (state)")
            .execute(&self.pool)
            .await
            .store_err()?;

        sqlx::query("CREATE TABLE IF NOT EXISTS config (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&self.pool)
            .await
            .store_err()?;

        Ok(())
    }

    async fn enqueue(&self, spec: JobSpec) -> Result<Job, QueuectlError> {
        if spec.command.trim().is_empty() {
            return Err(QueuectlError::InvalidInput("command is required".to_string()));
        }

        let id = spec.id.unwrap_or_else(queuectl_core::job::generate_id);

        let max_retries = match spec.max_retries {
            Some(v) => v,
            None => self
                .config_get(queuectl_core::config::KEY_MAX_RETRIES)
                .await?
                .and_then(|v| v.parse().ok())
                .unwrap_or(queuectl_core::config::DEFAULT_MAX_RETRIES),
        };
        let priority = spec.priority.unwrap_or(0);
        let now = Utc::now();
        let run_at = spec.run_at.unwrap_or(now);

        // No pre-check: the `id` PRIMARY KEY constraint is the single
        // source of truth for uniqueness, so two racing `enqueue` calls on
        // the same id can't both pass a check and then both insert. The
        // constraint violation is mapped to `DuplicateId` below instead.
        let insert = sqlx::query(
            r#"
            INSERT INTO jobs
                (id, command, state, attempts, max_retries, priority, run_at, next_run_at,
                 created_at, updated_at, exit_code, error, stdout, stderr, claimed_by, claimed_at)
            VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?5, ?5, ?6, ?6, NULL, NULL, '', '', NULL, NULL)
            "#,
        )
        .bind(&id)
        .bind(&spec.command)
        .bind(max_retries)
        .bind(priority)
        .bind(run_at)
        .bind(now)
        .execute(&self.pool)
        .await;

        if let Err(sqlx::Error::Database(ref db_err)) = insert {
            if db_err.is_unique_violation() {
                return Err(QueuectlError::DuplicateId(id));
            }
        }
        insert.store_err()?;

        Ok(self.get(&id).await?.expect("just inserted"))
    }

    async fn claim(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>, QueuectlError> {
        let mut conn = self.pool.acquire().await.store_err()?;

        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await.store_err()?;

        let select_candidate = format!(
            "SELECT id FROM jobs WHERE state = 'pending' AND next_run_at <= ?1 ORDER BY {CLAIM_ORDER_BY} LIMIT 1"
        );
        let candidate = sqlx::query(&select_candidate).bind(now).fetch_optional(&mut *conn).await;

        let candidate = match candidate {
            Ok(c) => c,
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(storage_err(e));
            }
        };

        let Some(row) = candidate else {
            sqlx::query("COMMIT").execute(&mut *conn).await.store_err()?;
            return Ok(None);
        };

        let id: String = row.try_get("id").store_err()?;

        let update = sqlx::query(
            "UPDATE jobs SET state = 'processing', claimed_by = ?1, claimed_at = ?2, updated_at = ?2 WHERE id = ?3",
        )
        .bind(worker_id)
        .bind(now)
        .bind(&id)
        .execute(&mut *conn)
        .await;

        if let Err(e) = update {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(storage_err(e));
        }

        let claimed = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(&id)
            .fetch_one(&mut *conn)
            .await;

        let claimed = match claimed {
            Ok(row) => row,
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(storage_err(e));
            }
        };

        sqlx::query("COMMIT").execute(&mut *conn).await.store_err()?;

        Ok(Some(row_to_job(claimed)?))
    }

    async fn complete(
        &self,
        id: &str,
        exit_code: i64,
        stdout: &str,
        stderr: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueuectlError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed',
                attempts = attempts + 1,
                exit_code = ?1,
                error = NULL,
                stdout = ?2,
                stderr = ?3,
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(exit_code)
        .bind(stdout)
        .bind(stderr)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .store_err()?;
        Ok(())
    }

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
    ) -> Result<(), QueuectlError> {
        let mut tx = self.pool.begin().await.store_err()?;

        let row = sqlx::query("SELECT attempts, max_retries FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .store_err()?;
        let Some(row) = row else {
            tx.rollback().await.store_err()?;
            return Err(QueuectlError::NotFound(format!("job '{id}' not found")));
        };
        let attempts: i64 = row.try_get("attempts").store_err()?;
        let attempts = attempts + 1;
        let max_retries: i64 = row.try_get("max_retries").store_err()?;

        if attempts >= max_retries {
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'dead',
                    attempts = ?1,
                    exit_code = ?2,
                    error = ?3,
                    stdout = ?4,
                    stderr = ?5,
                    claimed_by = NULL,
                    claimed_at = NULL,
                    updated_at = ?6
                WHERE id = ?7
                "#,
            )
            .bind(attempts)
            .bind(exit_code)
            .bind(error)
            .bind(stdout)
            .bind(stderr)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .store_err()?;
        } else {
            let delay_secs = backoff_base.saturating_pow(attempts as u32).min(backoff_cap_secs);
            let next_run_at = now + ChronoDuration::seconds(delay_secs);
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'pending',
                    attempts = ?1,
                    next_run_at = ?2,
                    exit_code = ?3,
                    error = ?4,
                    stdout = ?5,
                    stderr = ?6,
                    claimed_by = NULL,
                    claimed_at = NULL,
                    updated_at = ?7
                WHERE id = ?8
                "#,
            )
            .bind(attempts)
            .bind(next_run_at)
            .bind(exit_code)
            .bind(error)
            .bind(stdout)
            .bind(stderr)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .store_err()?;
        }

        tx.commit().await.store_err()?;
        Ok(())
    }

    async fn list(&self, state: Option<JobState>, limit: i64, offset: i64) -> Result<Vec<Job>, QueuectlError> {
        let rows = match state {
            Some(state) => {
                sqlx::query("SELECT * FROM jobs WHERE state = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3")
                    .bind(state.as_str())
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await
                    .store_err()?
            }
            None => {
                sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ?1 OFFSET ?2")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await
                    .store_err()?
            }
        };
        rows.into_iter().map(row_to_job).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, QueuectlError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .store_err()?;
        row.map(row_to_job).transpose()
    }

    async fn counts_by_state(&self) -> Result<BTreeMap<String, i64>, QueuectlError> {
        let rows = sqlx::query("SELECT state, COUNT(*) as n FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await
            .store_err()?;

        let mut counts: BTreeMap<String, i64> = [
            JobState::Pending,
            JobState::Processing,
            JobState::Completed,
            JobState::Failed,
            JobState::Dead,
        ]
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();

        for row in rows {
            let state: String = row.try_get("state").store_err()?;
            let n: i64 = row.try_get("n").store_err()?;
            counts.insert(state, n);
        }
        Ok(counts)
    }

    async fn dlq_retry(
        &self,
        id: &str,
        new_max_retries: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Job, QueuectlError> {
        let mut tx = self.pool.begin().await.store_err()?;

        let row = sqlx::query("SELECT state FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .store_err()?;
        let Some(row) = row else {
            tx.rollback().await.store_err()?;
            return Err(QueuectlError::NotFound(format!("job '{id}' not found")));
        };
        let state: String = row.try_get("state").store_err()?;
        if state != JobState::Dead.as_str() {
            tx.rollback().await.store_err()?;
            return Err(QueuectlError::NotFound(format!(
                "job '{id}' is not dead (state: {state})"
            )));
        }

        if let Some(max_retries) = new_max_retries {
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'pending', attempts = 0, next_run_at = ?1, run_at = ?1,
                    exit_code = NULL, error = NULL, stdout = '', stderr = '',
                    claimed_by = NULL, claimed_at = NULL, max_retries = ?2, updated_at = ?1
                WHERE id = ?3
                "#,
            )
            .bind(now)
            .bind(max_retries)
            .bind(id)
            .execute(&mut *tx)
            .await
            .store_err()?;
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'pending', attempts = 0, next_run_at = ?1, run_at = ?1,
                    exit_code = NULL, error = NULL, stdout = '', stderr = '',
                    claimed_by = NULL, claimed_at = NULL, updated_at = ?1
                WHERE id = ?2
                "#,
            )
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .store_err()?;
        }

        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .store_err()?;
        tx.commit().await.store_err()?;
        row_to_job(row)
    }

    async fn config_set(&self, key: &str, value: &str) -> Result<(), QueuectlError> {
        let key = normalize_key(key);
        sqlx::query(
            "INSERT INTO config (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .store_err()?;
        Ok(())
    }

    async fn config_get(&self, key: &str) -> Result<Option<String>, QueuectlError> {
        let key = normalize_key(key);
        let row = sqlx::query("SELECT value FROM config WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .store_err()?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn reclaim_expired(
        &self,
        lease: chrono::Duration,
        now: DateTime<Utc>,
        backoff_base: i64,
        backoff_cap_secs: i64,
    ) -> Result<u64, QueuectlError> {
        let threshold = now - lease;
        let expired = sqlx::query("SELECT id, attempts, max_retries FROM jobs WHERE state = 'processing' AND claimed_at < ?1")
            .bind(threshold)
            .fetch_all(&self.pool)
            .await
            .store_err()?;

        let mut reclaimed = 0u64;
        for row in expired {
            let id: String = row.try_get("id").store_err()?;
            let attempts: i64 = row.try_get("attempts").store_err()?;
            let attempts = attempts + 1;
            let max_retries: i64 = row.try_get("max_retries").store_err()?;

            if attempts >= max_retries {
                sqlx::query(
                    "UPDATE jobs SET state = 'dead', attempts = ?1, error = 'lease_expired', claimed_by = NULL, claimed_at = NULL, updated_at = ?2 WHERE id = ?3",
                )
                .bind(attempts)
                .bind(now)
                .bind(&id)
                .execute(&self.pool)
                .await
                .store_err()?;
            } else {
                let delay_secs = backoff_base.saturating_pow(attempts as u32).min(backoff_cap_secs);
                let next_run_at = now + ChronoDuration::seconds(delay_secs);
                sqlx::query(
                    "UPDATE jobs SET state = 'pending', attempts = ?1, next_run_at = ?2, error = 'lease_expired', claimed_by = NULL, claimed_at = NULL, updated_at = ?3 WHERE id = ?4",
                )
                .bind(attempts)
                .bind(next_run_at)
                .bind(now)
                .bind(&id)
                .execute(&self.pool)
                .await
                .store_err()?;
            }
            reclaimed += 1;
        }

        Ok(reclaimed)
    }

    async fn vacuum_completed(&self, older_than: DateTime<Utc>) -> Result<u64, QueuectlError> {
        let result = sqlx::query("DELETE FROM jobs WHERE state = 'completed' AND updated_at < ?1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .store_err()?;
        Ok(result.rows_affected())
    }
}
