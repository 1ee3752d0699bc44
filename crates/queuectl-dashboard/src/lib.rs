//! Read-only HTTP dashboard over the job store (spec §4.6).
//!
//! This façade MUST NOT mutate the store — it only calls
//! [`queuectl_core::Store::counts_by_state`] and [`queuectl_core::Store::list`]
//! — and it is expected to be handed a store opened read-only (the concrete
//! store implementation's own read-only constructor). Depending only on
//! [`queuectl_core::Store`], never a concrete driver, means this crate can
//! be added, removed, or replaced without touching any core invariant
//! (spec §9).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use queuectl_core::{JobState, Store};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct DashboardState {
    store: Arc<dyn Store>,
}

pub fn router(store: Arc<dyn Store>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/api/jobs", get(jobs))
        .layer(TraceLayer::new_for_http())
        .with_state(DashboardState { store })
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusResponse {
    pending: i64,
    processing: i64,
    completed: i64,
    failed: i64,
    dead: i64,
}

async fn status(State(state): State<DashboardState>) -> Result<Json<StatusResponse>, ApiError> {
    let counts: BTreeMap<String, i64> = state.store.counts_by_state().await.map_err(ApiError)?;
    Ok(Json(StatusResponse {
        pending: *counts.get("pending").unwrap_or(&0),
        processing: *counts.get("processing").unwrap_or(&0),
        completed: *counts.get("completed").unwrap_or(&0),
        failed: *counts.get("failed").unwrap_or(&0),
        dead: *counts.get("dead").unwrap_or(&0),
    }))
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    state: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// A trimmed view of a job for the jobs list: the full `Job` minus the
/// potentially large `stdout`/`stderr` fields.
#[derive(Debug, Serialize, Deserialize)]
struct JobSummary {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    priority: i64,
    run_at: chrono::DateTime<chrono::Utc>,
    next_run_at: chrono::DateTime<chrono::Utc>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    exit_code: Option<i64>,
    error: Option<String>,
}

impl From<queuectl_core::Job> for JobSummary {
    fn from(job: queuectl_core::Job) -> Self {
        Self {
            id: job.id,
            command: job.command,
            state: job.state.as_str().to_string(),
            attempts: job.attempts,
            max_retries: job.max_retries,
            priority: job.priority,
            run_at: job.run_at,
            next_run_at: job.next_run_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
            exit_code: job.exit_code,
            error: job.error,
        }
    }
}

async fn jobs(
    State(state): State<DashboardState>,
    Query(params): Query<JobsQuery>,
) -> Result<Json<Vec<JobSummary>>, ApiError> {
    let filter = match params.state {
        Some(s) => Some(JobState::from_str(&s).map_err(ApiError)?),
        None => None,
    };
    let limit = params.limit.unwrap_or(50);
    let offset = params.offset.unwrap_or(0);

    let jobs = state.store.list(filter, limit, offset).await.map_err(ApiError)?;
    Ok(Json(jobs.into_iter().map(JobSummary::from).collect()))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>queuectl dashboard</title>
<style>
body { font-family: system-ui, sans-serif; margin: 2rem; }
table { border-collapse: collapse; width: 100%; }
td, th { border: 1px solid #ccc; padding: 0.4rem 0.6rem; text-align: left; }
#status span { margin-right: 1rem; font-weight: 600; }
</style>
</head>
<body>
<h1>queuectl</h1>
<div id="status">loading...</div>
<table id="jobs"><thead>
<tr><th>id</th><th>state</th><th>attempts</th><th>priority</th><th>updated_at</th></tr>
</thead><tbody></tbody></table>
<script>
async function refresh() {
  const status = await (await fetch('/api/status')).json();
  document.getElementById('status').innerHTML = Object.entries(status)
    .map(([k, v]) => `<span>${k}: ${v}</span>`).join('');
  const jobs = await (await fetch('/api/jobs?limit=50')).json();
  document.querySelector('#jobs tbody').innerHTML = jobs.map(j =>
    `<tr><td>${j.id}</td><td>${j.state}</td><td>${j.attempts}/${j.max_retries}</td><td>${j.priority}</td><td>${j.updated_at}</td></tr>`
  ).join('');
}
refresh();
setInterval(refresh, 2000);
</script>
</body>
</html>"#;

struct ApiError(queuectl_core::QueuectlError);

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let code = match &self.0 {
            queuectl_core::QueuectlError::NotFound(_) => StatusCode::NOT_FOUND,
            queuectl_core::QueuectlError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, self.0.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use queuectl_core::JobSpec;
    use queuectl_testing::TempStore;
    use tower::ServiceExt;

    #[tokio::test]
    async fn status_reports_zero_counts_on_an_empty_store() {
        let fixture = TempStore::new().await.unwrap();
        let app = router(Arc::new(fixture.store.clone()));

        let response = app
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let status: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(status.pending, 0);
    }

    #[tokio::test]
    async fn jobs_endpoint_lists_enqueued_jobs() {
        let fixture = TempStore::new().await.unwrap();
        queuectl_core::store::Store::enqueue(&fixture.store, JobSpec::new("true"))
            .await
            .unwrap();
        let app = router(Arc::new(fixture.store.clone()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/jobs?state=pending")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let jobs: Vec<JobSummary> = serde_json::from_slice(&body).unwrap();
        assert_eq!(jobs.len(), 1);
    }
}
