//! Property and scenario tests from spec §8, run against the real SQLite
//! store (not the in-memory fake `queuectl-core::worker::tests` uses).

use chrono::{Duration, Utc};
use queuectl_core::{store::Store, JobSpec, JobState};
use queuectl_testing::TempStore;
use std::sync::Arc;

#[tokio::test]
async fn unique_ids_reject_duplicate_enqueue_without_mutating_the_store() {
    let fixture = TempStore::new().await.unwrap();
    let store = &fixture.store;

    let mut spec = JobSpec::new("printf first");
    spec.id = Some("dup".to_string());
    store.enqueue(spec).await.unwrap();

    let mut dup = JobSpec::new("printf second");
    dup.id = Some("dup".to_string());
    let err = store.enqueue(dup).await.unwrap_err();
    assert!(matches!(err, queuectl_core::QueuectlError::DuplicateId(_)));

    let job = store.get("dup").await.unwrap().unwrap();
    assert_eq!(job.command, "printf first");
}

#[tokio::test]
async fn enqueue_without_command_is_invalid_input() {
    let fixture = TempStore::new().await.unwrap();
    let spec = JobSpec::new("");
    let err = fixture.store.enqueue(spec).await.unwrap_err();
    assert!(matches!(err, queuectl_core::QueuectlError::InvalidInput(_)));
}

#[tokio::test]
async fn atomic_claim_never_double_assigns_under_concurrency() {
    let fixture = TempStore::new().await.unwrap();
    let store = Arc::new(fixture.store.clone());

    for i in 0..10 {
        let mut spec = JobSpec::new("printf hi");
        spec.id = Some(format!("job-{i}"));
        store.enqueue(spec).await.unwrap();
    }

    let mut handles = Vec::new();
    for w in 0..5 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                match store.claim(&format!("worker-{w}"), Utc::now()).await.unwrap() {
                    Some(job) => claimed.push(job.id),
                    None => break,
                }
            }
            claimed
        }));
    }

    let mut all_claimed = Vec::new();
    for h in handles {
        all_claimed.extend(h.await.unwrap());
    }

    assert_eq!(all_claimed.len(), 10, "every job claimed exactly once total");
    let mut unique = all_claimed.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 10, "no job claimed twice");
}

#[tokio::test]
async fn retry_bound_ends_dead_with_attempts_equal_to_max_retries() {
    let fixture = TempStore::new().await.unwrap();
    let store = &fixture.store;

    let mut spec = JobSpec::new("exit 1");
    spec.id = Some("always-fails".to_string());
    spec.max_retries = Some(3);
    store.enqueue(spec).await.unwrap();

    for _ in 0..3 {
        let job = store.claim("w1", Utc::now()).await.unwrap().unwrap();
        store
            .fail(&job.id, 1, "nonzero_exit", "", "", Utc::now(), 0, 3600)
            .await
            .unwrap();
    }

    let job = store.get("always-fails").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 3);
}

#[tokio::test]
async fn backoff_delay_is_at_least_base_pow_attempts_and_capped() {
    let fixture = TempStore::new().await.unwrap();
    let store = &fixture.store;

    let mut spec = JobSpec::new("exit 1");
    spec.id = Some("backoff".to_string());
    spec.max_retries = Some(5);
    store.enqueue(spec).await.unwrap();

    let job = store.claim("w1", Utc::now()).await.unwrap().unwrap();
    let now = Utc::now();
    store.fail(&job.id, 1, "nonzero_exit", "", "", now, 2, 3600).await.unwrap();

    let job = store.get("backoff").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    // attempt 1 -> delay 2^1 = 2s
    assert!(job.next_run_at >= now + Duration::seconds(2));
    assert!(!queuectl_core::policy::is_eligible(&job, now + Duration::milliseconds(500)));
}

#[tokio::test]
async fn priority_order_is_priority_then_next_run_at_then_created_at_then_id() {
    let fixture = TempStore::new().await.unwrap();
    let store = &fixture.store;

    for (id, priority) in [("low", 1), ("high", 10), ("mid", 5)] {
        let mut spec = JobSpec::new("true");
        spec.id = Some(id.to_string());
        spec.priority = Some(priority);
        store.enqueue(spec).await.unwrap();
    }

    let first = store.claim("w1", Utc::now()).await.unwrap().unwrap();
    let second = store.claim("w1", Utc::now()).await.unwrap().unwrap();
    let third = store.claim("w1", Utc::now()).await.unwrap().unwrap();

    assert_eq!(first.id, "high");
    assert_eq!(second.id, "mid");
    assert_eq!(third.id, "low");
}

#[tokio::test]
async fn scheduled_job_is_never_claimed_before_run_at() {
    let fixture = TempStore::new().await.unwrap();
    let store = &fixture.store;

    let now = Utc::now();
    let mut spec = JobSpec::new("printf ready");
    spec.id = Some("scheduled".to_string());
    spec.run_at = Some(now + Duration::seconds(5));
    store.enqueue(spec).await.unwrap();

    assert!(store.claim("w1", now + Duration::seconds(2)).await.unwrap().is_none());

    let claimed = store.claim("w1", now + Duration::seconds(8)).await.unwrap();
    assert_eq!(claimed.unwrap().id, "scheduled");
}

#[tokio::test]
async fn dlq_round_trip_preserves_id_and_resets_attempts() {
    let fixture = TempStore::new().await.unwrap();
    let store = &fixture.store;

    let mut spec = JobSpec::new("exit 1");
    spec.id = Some("b".to_string());
    spec.max_retries = Some(2);
    store.enqueue(spec).await.unwrap();

    for _ in 0..2 {
        let job = store.claim("w1", Utc::now()).await.unwrap().unwrap();
        store
            .fail(&job.id, 1, "nonzero_exit", "", "", Utc::now(), 1, 3600)
            .await
            .unwrap();
    }
    let dead = store.get("b").await.unwrap().unwrap();
    assert_eq!(dead.state, JobState::Dead);

    let retried = store.dlq_retry("b", Some(1), Utc::now()).await.unwrap();
    assert_eq!(retried.id, "b");
    assert_eq!(retried.attempts, 0);
    assert_eq!(retried.state, JobState::Pending);

    let job = store.claim("w1", Utc::now()).await.unwrap().unwrap();
    store.complete(&job.id, 0, "ok", "", Utc::now()).await.unwrap();

    let done = store.get("b").await.unwrap().unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.attempts, 1);
    assert_eq!(done.stdout, "ok");
}

#[tokio::test]
async fn dlq_retry_on_non_dead_job_is_not_found() {
    let fixture = TempStore::new().await.unwrap();
    let store = &fixture.store;
    let mut spec = JobSpec::new("true");
    spec.id = Some("alive".to_string());
    store.enqueue(spec).await.unwrap();

    let err = store.dlq_retry("alive", None, Utc::now()).await.unwrap_err();
    assert!(matches!(err, queuectl_core::QueuectlError::NotFound(_)));
}

#[tokio::test]
async fn persistence_survives_reopening_the_database_file() {
    let fixture = TempStore::new().await.unwrap();
    let db_path = fixture.db_path();

    let mut spec = JobSpec::new("true");
    spec.id = Some("pending-one".to_string());
    fixture.store.enqueue(spec).await.unwrap();

    let mut dead_spec = JobSpec::new("exit 1");
    dead_spec.id = Some("dead-one".to_string());
    dead_spec.max_retries = Some(1);
    fixture.store.enqueue(dead_spec).await.unwrap();
    let job = fixture.store.claim("w1", Utc::now()).await.unwrap().unwrap();
    fixture
        .store
        .fail(&job.id, 1, "nonzero_exit", "", "", Utc::now(), 1, 3600)
        .await
        .unwrap();

    drop(fixture.store);

    let reopened = queuectl_store_sqlite::SqliteJobStore::connect(db_path.to_str().unwrap())
        .await
        .unwrap();
    reopened.init().await.unwrap();

    let pending = reopened.get("pending-one").await.unwrap().unwrap();
    assert_eq!(pending.state, JobState::Pending);

    let dead = reopened.get("dead-one").await.unwrap().unwrap();
    assert_eq!(dead.state, JobState::Dead);

    let claimed = reopened.claim("w2", Utc::now()).await.unwrap();
    assert_eq!(claimed.unwrap().id, "pending-one");
}

#[tokio::test]
async fn config_set_treats_hyphen_and_underscore_keys_as_equivalent() {
    let fixture = TempStore::new().await.unwrap();
    let store = &fixture.store;

    store.config_set("max-retries", "5").await.unwrap();
    assert_eq!(store.config_get("max_retries").await.unwrap().as_deref(), Some("5"));

    store.config_set("max_retries", "7").await.unwrap();
    assert_eq!(store.config_get("max-retries").await.unwrap().as_deref(), Some("7"));
}

#[tokio::test]
async fn reclaim_expired_moves_stale_processing_jobs_back_with_lease_expired() {
    let fixture = TempStore::new().await.unwrap();
    let store = &fixture.store;

    let mut spec = JobSpec::new("sleep 100");
    spec.id = Some("stuck".to_string());
    spec.max_retries = Some(3);
    store.enqueue(spec).await.unwrap();
    store.claim("crashed-worker", Utc::now()).await.unwrap();

    let reclaimed = store
        .reclaim_expired(Duration::seconds(0), Utc::now() + Duration::seconds(1), 2, 3600)
        .await
        .unwrap();
    assert_eq!(reclaimed, 1);

    let job = store.get("stuck").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.error.as_deref(), Some("lease_expired"));
    assert!(job.claimed_by.is_none());
}

#[tokio::test]
async fn vacuum_completed_deletes_only_old_completed_jobs() {
    let fixture = TempStore::new().await.unwrap();
    let store = &fixture.store;

    let mut spec = JobSpec::new("true");
    spec.id = Some("done".to_string());
    store.enqueue(spec).await.unwrap();
    let job = store.claim("w1", Utc::now()).await.unwrap().unwrap();
    store.complete(&job.id, 0, "", "", Utc::now()).await.unwrap();

    let deleted = store.vacuum_completed(Utc::now() + Duration::seconds(1)).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(store.get("done").await.unwrap().is_none());
}
