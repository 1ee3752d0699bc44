//! The worker loop (spec §4.3): claim -> execute -> finalize.

use crate::config::ConfigSnapshot;
use crate::error::QueuectlError;
use crate::executor::Executor;
use crate::store::Store;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// A single logical worker. Runs as one `tokio::task` inside the manager
/// process (spec §9: "mechanism is free to change" from separate OS
/// processes, as long as `count` executions are truly concurrent).
pub struct Worker {
    pub id: String,
    store: Arc<dyn Store>,
    executor: Executor,
    poll_interval: std::time::Duration,
}

impl Worker {
    pub fn new(id: String, store: Arc<dyn Store>, executor: Executor, config: &ConfigSnapshot) -> Self {
        Self {
            id,
            store,
            executor,
            poll_interval: std::time::Duration::from_secs(config.worker_poll_interval_secs),
        }
    }

    /// Runs until `shutdown` is set. A job already claimed always runs to
    /// completion or timeout before the next shutdown check (spec §5:
    /// shutdown never aborts an in-flight child).
    pub async fn run(&self, shutdown: Arc<AtomicBool>, config: ConfigSnapshot) -> Result<(), QueuectlError> {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                debug!(worker_id = %self.id, "shutdown observed before claim");
                return Ok(());
            }

            let now = chrono::Utc::now();
            match self.store.claim(&self.id, now).await {
                Ok(Some(job)) => {
                    info!(worker_id = %self.id, job_id = %job.id, attempt = job.attempts + 1, "claimed job");
                    self.execute_and_finalize(&job, &config).await?;
                }
                Ok(None) => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "claim failed, backing off");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }

            if shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }
        }
    }

    async fn execute_and_finalize(
        &self,
        job: &crate::job::Job,
        config: &ConfigSnapshot,
    ) -> Result<(), QueuectlError> {
        let outcome = self.executor.run(&job.command).await;
        let now = chrono::Utc::now();

        if outcome.succeeded() {
            self.store
                .complete(&job.id, outcome.exit_code, &outcome.stdout, &outcome.stderr, now)
                .await?;
            info!(worker_id = %self.id, job_id = %job.id, "job completed");
        } else {
            let error = outcome.error.as_deref().unwrap_or("unknown_error");
            self.store
                .fail(
                    &job.id,
                    outcome.exit_code,
                    error,
                    &outcome.stdout,
                    &outcome.stderr,
                    now,
                    config.backoff_base,
                    crate::config::DEFAULT_BACKOFF_CAP_SECS,
                )
                .await?;
            warn!(worker_id = %self.id, job_id = %job.id, error, "job failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobSpec, JobState};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// An in-memory `Store` used only to exercise the worker loop's
    /// control flow; `queuectl-store-sqlite` owns the real contract tests.
    #[derive(Default)]
    struct MemoryStore {
        jobs: Mutex<Vec<Job>>,
    }

    #[async_trait]
    impl Store for MemoryStore {
        async fn init(&self) -> Result<(), QueuectlError> {
            Ok(())
        }

        async fn enqueue(&self, spec: JobSpec) -> Result<Job, QueuectlError> {
            let now = Utc::now();
            let job = Job {
                id: spec.id.unwrap_or_else(crate::job::generate_id),
                command: spec.command,
                state: JobState::Pending,
                attempts: 0,
                max_retries: spec.max_retries.unwrap_or(3),
                priority: spec.priority.unwrap_or(0),
                run_at: spec.run_at.unwrap_or(now),
                next_run_at: spec.run_at.unwrap_or(now),
                created_at: now,
                updated_at: now,
                exit_code: None,
                error: None,
                stdout: String::new(),
                stderr: String::new(),
                claimed_by: None,
                claimed_at: None,
            };
            self.jobs.lock().unwrap().push(job.clone());
            Ok(job)
        }

        async fn claim(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>, QueuectlError> {
            let mut jobs = self.jobs.lock().unwrap();
            let mut candidates: Vec<usize> = jobs
                .iter()
                .enumerate()
                .filter(|(_, j)| crate::policy::is_eligible(j, now))
                .map(|(i, _)| i)
                .collect();
            candidates.sort_by(|&a, &b| crate::policy::claim_order(&jobs[a], &jobs[b]));
            if let Some(&idx) = candidates.first() {
                jobs[idx].state = JobState::Processing;
                jobs[idx].claimed_by = Some(worker_id.to_string());
                jobs[idx].claimed_at = Some(now);
                Ok(Some(jobs[idx].clone()))
            } else {
                Ok(None)
            }
        }

        async fn complete(
            &self,
            id: &str,
            exit_code: i64,
            stdout: &str,
            stderr: &str,
            now: DateTime<Utc>,
        ) -> Result<(), QueuectlError> {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.iter_mut().find(|j| j.id == id).unwrap();
            job.state = JobState::Completed;
            job.attempts += 1;
            job.exit_code = Some(exit_code);
            job.stdout = stdout.to_string();
            job.stderr = stderr.to_string();
            job.claimed_by = None;
            job.claimed_at = None;
            job.updated_at = now;
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
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.iter_mut().find(|j| j.id == id).unwrap();
            job.attempts += 1;
            job.exit_code = Some(exit_code);
            job.error = Some(error.to_string());
            job.stdout = stdout.to_string();
            job.stderr = stderr.to_string();
            job.updated_at = now;
            if job.attempts >= job.max_retries {
                job.state = JobState::Dead;
                job.claimed_by = None;
                job.claimed_at = None;
            } else {
                let delay = backoff_base.pow(job.attempts as u32).min(backoff_cap_secs);
                job.state = JobState::Pending;
                job.next_run_at = now + chrono::Duration::seconds(delay);
                job.claimed_by = None;
                job.claimed_at = None;
            }
            Ok(())
        }

        async fn list(&self, _state: Option<JobState>, _limit: i64, _offset: i64) -> Result<Vec<Job>, QueuectlError> {
            Ok(self.jobs.lock().unwrap().clone())
        }

        async fn get(&self, id: &str) -> Result<Option<Job>, QueuectlError> {
            Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
        }

        async fn counts_by_state(&self) -> Result<BTreeMap<String, i64>, QueuectlError> {
            Ok(BTreeMap::new())
        }

        async fn dlq_retry(
            &self,
            _id: &str,
            _new_max_retries: Option<i64>,
            _now: DateTime<Utc>,
        ) -> Result<Job, QueuectlError> {
            unimplemented!("not exercised by worker loop tests")
        }

        async fn config_set(&self, _key: &str, _value: &str) -> Result<(), QueuectlError> {
            Ok(())
        }

        async fn config_get(&self, _key: &str) -> Result<Option<String>, QueuectlError> {
            Ok(None)
        }

        async fn reclaim_expired(
            &self,
            _lease: chrono::Duration,
            _now: DateTime<Utc>,
            _backoff_base: i64,
            _backoff_cap_secs: i64,
        ) -> Result<u64, QueuectlError> {
            Ok(0)
        }

        async fn vacuum_completed(&self, _older_than: DateTime<Utc>) -> Result<u64, QueuectlError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn claims_executes_and_completes_a_job() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        store.enqueue(JobSpec::new("printf hello")).await.unwrap();

        let worker = Worker::new(
            "w1".to_string(),
            store.clone(),
            Executor::new(std::time::Duration::from_secs(5)),
            &ConfigSnapshot::default(),
        );

        let job = store.claim("w1", Utc::now()).await.unwrap().unwrap();
        worker
            .execute_and_finalize(&job, &ConfigSnapshot::default())
            .await
            .unwrap();

        let updated = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(updated.state, JobState::Completed);
        assert_eq!(updated.attempts, 1);
        assert_eq!(updated.stdout, "hello");
        // The full claim->run() loop with shutdown handling is exercised by
        // queuectl-store-sqlite's integration tests against the real store.
    }

    #[tokio::test]
    async fn failing_job_retries_then_dies() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        let mut spec = JobSpec::new("exit 1");
        spec.max_retries = Some(2);
        store.enqueue(spec).await.unwrap();

        let mut config = ConfigSnapshot::default();
        config.backoff_base = 0; // keep retries immediately eligible in this test
        let worker = Worker::new(
            "w1".to_string(),
            store.clone(),
            Executor::new(std::time::Duration::from_secs(5)),
            &config,
        );

        for _ in 0..2 {
            let job = store.claim("w1", Utc::now()).await.unwrap().unwrap();
            worker.execute_and_finalize(&job, &config).await.unwrap();
        }

        let jobs = store.list(None, 10, 0).await.unwrap();
        let job = &jobs[0];
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.error.as_deref(), Some("nonzero_exit"));
    }
}
