//! Scheduler policy (spec §4.5). Not a standalone component — the
//! selection predicate and ordering rule `Store::claim` must enforce.
//! Kept as a pure, DB-free module so the ordering rule itself is unit
//! tested without a database.

use crate::job::{Job, JobState};
use chrono::{DateTime, Utc};

/// `ORDER BY` fragment `claim`'s selection query must use.
pub const CLAIM_ORDER_BY: &str = "priority DESC, next_run_at ASC, created_at ASC, id ASC";

/// A job is eligible for claim when pending and due.
pub fn is_eligible(job: &Job, now: DateTime<Utc>) -> bool {
    job.state == JobState::Pending && job.next_run_at <= now
}

/// Total order matching `CLAIM_ORDER_BY`, used by tests that assert
/// dispatch order without a database round-trip.
pub fn claim_order(a: &Job, b: &Job) -> std::cmp::Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.next_run_at.cmp(&b.next_run_at))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use chrono::Duration;

    fn job(id: &str, priority: i64, next_run_at: DateTime<Utc>, created_at: DateTime<Utc>) -> Job {
        Job {
            id: id.to_string(),
            command: "true".to_string(),
            state: JobState::Pending,
            attempts: 0,
            max_retries: 3,
            priority,
            run_at: next_run_at,
            next_run_at,
            created_at,
            updated_at: created_at,
            exit_code: None,
            error: None,
            stdout: String::new(),
            stderr: String::new(),
            claimed_by: None,
            claimed_at: None,
        }
    }

    #[test]
    fn priority_wins_over_arrival_order() {
        let now = Utc::now();
        let low = job("low", 1, now, now);
        let high = job("high", 10, now, now);
        let mid = job("mid", 5, now, now);
        let mut jobs = vec![low.clone(), high.clone(), mid.clone()];
        jobs.sort_by(claim_order);
        let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[test]
    fn earliest_next_run_at_wins_within_same_priority() {
        let now = Utc::now();
        let later = job("later", 0, now + Duration::seconds(5), now);
        let earlier = job("earlier", 0, now, now);
        let mut jobs = vec![later.clone(), earlier.clone()];
        jobs.sort_by(claim_order);
        assert_eq!(jobs[0].id, "earlier");
    }

    #[test]
    fn created_at_breaks_ties_then_id_is_final_tiebreak() {
        let now = Utc::now();
        let a = job("b-job", 0, now, now);
        let b = job("a-job", 0, now, now);
        let mut jobs = vec![a.clone(), b.clone()];
        jobs.sort_by(claim_order);
        // same priority, next_run_at and created_at: lexicographic id wins
        assert_eq!(jobs[0].id, "a-job");
    }

    #[test]
    fn future_run_at_is_not_eligible() {
        let now = Utc::now();
        let j = job("future", 0, now + Duration::seconds(5), now);
        assert!(!is_eligible(&j, now));
        assert!(is_eligible(&j, now + Duration::seconds(6)));
    }
}
