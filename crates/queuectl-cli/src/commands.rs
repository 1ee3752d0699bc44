//! One function per subcommand. Each opens its own store handle (a CLI
//! invocation is short-lived; see SPEC_FULL.md §2 on config being a
//! one-shot snapshot, not a process-wide singleton) and returns
//! `QueuectlError` directly so `main` can map it to the documented exit
//! codes without re-parsing anything.

use crate::cli::{ConfigAction, DashboardAction, DlqAction, WorkerAction};
use crate::table;
use chrono::{DateTime, Utc};
use queuectl_core::config::{self, ConfigSnapshot};
use queuectl_core::{JobSpec, JobState, ManagerPaths, QueuectlError, Store, WorkerManager};
use queuectl_store_sqlite::SqliteJobStore;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Resolves the database path: the `--db` flag wins, otherwise the
/// documented default. The `db_path` config key is recorded inside that
/// same database, so it can describe where a store lives but cannot
/// relocate the bootstrap open that would be needed to read it.
pub fn resolve_db_path(flag: Option<&str>) -> String {
    flag.map(str::to_string).unwrap_or_else(|| config::DEFAULT_DB_PATH.to_string())
}

async fn open_store(db_path: &str) -> Result<SqliteJobStore, QueuectlError> {
    let store = SqliteJobStore::connect(db_path).await?;
    store.init().await?;
    Ok(store)
}

pub async fn init_db(db_path: &str) -> Result<(), QueuectlError> {
    open_store(db_path).await?;
    println!("initialized database at {db_path}");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn enqueue(
    db_path: &str,
    json: Option<String>,
    command_flag: Option<String>,
    id: Option<String>,
    max_retries: Option<i64>,
    priority: Option<i64>,
    run_at: Option<String>,
) -> Result<(), QueuectlError> {
    let store = open_store(db_path).await?;

    let spec = if let Some(json) = json {
        serde_json::from_str::<JobSpec>(&json)
            .map_err(|e| QueuectlError::InvalidInput(format!("malformed JSON: {e}")))?
    } else {
        let command = command_flag.ok_or_else(|| QueuectlError::InvalidInput("command is required".into()))?;
        let run_at = match run_at {
            Some(s) => Some(
                DateTime::parse_from_rfc3339(&s)
                    .map_err(|e| QueuectlError::InvalidInput(format!("unparsable --run-at: {e}")))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        JobSpec {
            id,
            command,
            max_retries,
            priority,
            run_at,
        }
    };

    let job = store.enqueue(spec).await?;
    println!("{}", job.id);
    Ok(())
}

pub fn current_exe() -> Result<std::path::PathBuf, QueuectlError> {
    std::env::current_exe().map_err(QueuectlError::Io)
}

pub async fn worker(db_path: &str, action: WorkerAction) -> Result<(), QueuectlError> {
    let paths = ManagerPaths::beside_db(std::path::Path::new(db_path));
    let manager = WorkerManager::new(paths);

    match action {
        WorkerAction::Start { count } => {
            // Make sure the schema exists before the detached process tries
            // to touch it; a manager crash on a missing table is much
            // harder to diagnose than a clean failure here.
            open_store(db_path).await?;

            let exe = current_exe()?;
            let args = vec![
                "__run-manager".to_string(),
                "--count".to_string(),
                count.to_string(),
                "--db".to_string(),
                db_path.to_string(),
            ];
            let pid = manager.start(&exe, &args, count)?;
            println!("worker manager started (pid {pid}, {count} workers)");
        }
        WorkerAction::Stop => {
            manager.stop(Duration::from_secs(config::DEFAULT_STOP_GRACE_SECS))?;
            println!("worker manager stopped");
        }
    }
    Ok(())
}

/// The body of the hidden `__run-manager` entry point: runs in the
/// detached process spawned by `worker start`, never invoked directly by a
/// user.
pub async fn run_manager(db_path: &str, count: usize) -> Result<(), QueuectlError> {
    let log_dir = std::path::Path::new(db_path).parent().unwrap_or_else(|| std::path::Path::new("."));
    let _guard = crate::logging::init_manager(log_dir);

    let store = Arc::new(open_store(db_path).await?);
    let config = ConfigSnapshot::load(store.as_ref()).await?;
    let paths = ManagerPaths::beside_db(std::path::Path::new(db_path));
    let manager = WorkerManager::new(paths);

    let execution_timeout = Duration::from_secs(config::DEFAULT_EXECUTION_TIMEOUT_SECS);
    manager.run_manager(store, count, config, execution_timeout).await
}

pub async fn status(db_path: &str) -> Result<(), QueuectlError> {
    let store = open_store(db_path).await?;
    let counts = store.counts_by_state().await?;
    print!("{}", table::render_counts(&counts));

    let paths = ManagerPaths::beside_db(std::path::Path::new(db_path));
    let manager_status = WorkerManager::new(paths).status();
    if manager_status.running {
        println!("worker manager: running ({} workers)", manager_status.active_workers);
    } else {
        println!("worker manager: not running");
    }
    Ok(())
}

pub async fn list(db_path: &str, state: Option<String>, limit: i64, offset: i64) -> Result<(), QueuectlError> {
    let store = open_store(db_path).await?;
    let filter = state.map(|s| JobState::from_str(&s)).transpose()?;
    let jobs = store.list(filter, limit, offset).await?;
    print!("{}", table::render_jobs(&jobs));
    Ok(())
}

pub async fn show(db_path: &str, id: &str) -> Result<(), QueuectlError> {
    let store = open_store(db_path).await?;
    let job = store.get(id).await?.ok_or_else(|| QueuectlError::NotFound(id.to_string()))?;
    print!("{}", table::render_job_detail(&job));
    Ok(())
}

pub async fn dlq(db_path: &str, action: DlqAction) -> Result<(), QueuectlError> {
    let store = open_store(db_path).await?;
    match action {
        DlqAction::List { limit, offset } => {
            let jobs = store.dlq_list(limit, offset).await?;
            print!("{}", table::render_jobs(&jobs));
        }
        DlqAction::Retry { id, max_retries } => {
            let job = store.dlq_retry(&id, max_retries, Utc::now()).await?;
            println!("requeued {} (attempts reset, max_retries={})", job.id, job.max_retries);
        }
    }
    Ok(())
}

pub async fn config(db_path: &str, action: ConfigAction) -> Result<(), QueuectlError> {
    let store = open_store(db_path).await?;
    match action {
        ConfigAction::Set { key, value } => {
            store.config_set(&key, &value).await?;
            println!("{} = {}", config::normalize_key(&key), value);
        }
        ConfigAction::Get { key } => match store.config_get(&key).await? {
            Some(value) => println!("{value}"),
            None => println!("(unset)"),
        },
    }
    Ok(())
}

pub async fn dashboard(db_path: &str, action: DashboardAction) -> Result<(), QueuectlError> {
    let DashboardAction::Start { host, port } = action;
    let store = SqliteJobStore::connect_read_only(db_path).await?;
    let router = queuectl_dashboard::router(Arc::new(store));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("dashboard listening on http://{addr}");
    axum::serve(listener, router).await?;
    Ok(())
}

pub async fn gc(db_path: &str, older_than: &str) -> Result<(), QueuectlError> {
    let store = open_store(db_path).await?;
    let age = parse_duration(older_than)?;
    let cutoff = Utc::now() - age;
    let deleted = store.vacuum_completed(cutoff).await?;
    println!("deleted {deleted} completed job(s) older than {older_than}");
    Ok(())
}

/// Parses durations of the form `<n><unit>` where unit is `s`, `m`, `h`, or
/// `d`. Not a general-purpose duration parser — just enough for `gc
/// --older-than`.
fn parse_duration(s: &str) -> Result<chrono::Duration, QueuectlError> {
    let invalid = || QueuectlError::InvalidInput(format!("invalid duration '{s}'"));
    let unit = s.chars().last().ok_or_else(invalid)?;
    let (digits, multiplier) = match unit {
        's' => (&s[..s.len() - 1], 1),
        'm' => (&s[..s.len() - 1], 60),
        'h' => (&s[..s.len() - 1], 3600),
        'd' => (&s[..s.len() - 1], 86400),
        _ => (s.as_str(), 1),
    };
    let n: i64 = digits.parse().map_err(|_| invalid())?;
    Ok(chrono::Duration::seconds(n * multiplier))
}
