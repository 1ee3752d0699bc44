//! The worker-manager lifecycle (spec §4.4).
//!
//! The manager is a detached OS process — started by re-invoking the
//! current executable with a hidden entry point, the same self-re-exec
//! pattern used elsewhere in the corpus for long-running supervisors —
//! so `queuectl worker start` returns immediately while the manager keeps
//! running. Inside that one process, `count` workers run as concurrent
//! `tokio::task`s (spec §9: the contract is concurrency, not OS process
//! count per worker).

use crate::config::ConfigSnapshot;
use crate::error::QueuectlError;
use crate::executor::Executor;
use crate::store::Store;
use crate::worker::Worker;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LifecycleRecord {
    pid: u32,
    worker_count: usize,
    started_at: chrono::DateTime<chrono::Utc>,
}

/// Paths to the manager lifecycle file and shutdown marker, both living
/// next to the database file (spec §4.4).
#[derive(Debug, Clone)]
pub struct ManagerPaths {
    pub pid_file: PathBuf,
    pub shutdown_file: PathBuf,
}

impl ManagerPaths {
    pub fn beside_db(db_path: &Path) -> Self {
        let dir = db_path.parent().unwrap_or_else(|| Path::new("."));
        Self {
            pid_file: dir.join("worker_manager.pid"),
            shutdown_file: dir.join("worker_manager.shutdown"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ManagerStatus {
    pub running: bool,
    pub active_workers: usize,
}

pub struct WorkerManager {
    paths: ManagerPaths,
}

impl WorkerManager {
    pub fn new(paths: ManagerPaths) -> Self {
        Self { paths }
    }

    fn read_record(&self) -> Option<LifecycleRecord> {
        let contents = std::fs::read_to_string(&self.paths.pid_file).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Starts the manager as a detached child process running
    /// `exe manager_args... `. `exe`/`manager_args` let the CLI supply its
    /// own hidden re-exec entry point without this crate knowing about
    /// clap at all.
    pub fn start(&self, exe: &Path, manager_args: &[String], count: usize) -> Result<u32, QueuectlError> {
        if let Some(record) = self.read_record() {
            if process_is_alive(record.pid) {
                return Err(QueuectlError::AlreadyRunning(record.pid));
            }
            info!(pid = record.pid, "stale lifecycle file found, overwriting");
        }

        if let Some(dir) = self.paths.pid_file.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let _ = std::fs::remove_file(&self.paths.shutdown_file);

        let child = std::process::Command::new(exe)
            .args(manager_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let record = LifecycleRecord {
            pid: child.id(),
            worker_count: count,
            started_at: chrono::Utc::now(),
        };
        write_atomically(&self.paths.pid_file, &serde_json::to_string(&record).unwrap())?;
        Ok(record.pid)
    }

    /// Writes the shutdown marker, waits up to `grace` for the manager to
    /// exit on its own, then escalates to a forceful kill.
    pub fn stop(&self, grace: Duration) -> Result<(), QueuectlError> {
        let record = self.read_record().filter(|r| process_is_alive(r.pid));
        let Some(record) = record else {
            let _ = std::fs::remove_file(&self.paths.pid_file);
            return Err(QueuectlError::NotRunning);
        };

        std::fs::write(&self.paths.shutdown_file, b"")?;

        let deadline = std::time::Instant::now() + grace;
        while std::time::Instant::now() < deadline {
            if !process_is_alive(record.pid) {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        if process_is_alive(record.pid) {
            warn!(pid = record.pid, "manager did not stop in time, killing");
            kill_process(record.pid, true);
        }

        let _ = std::fs::remove_file(&self.paths.pid_file);
        let _ = std::fs::remove_file(&self.paths.shutdown_file);
        Ok(())
    }

    pub fn status(&self) -> ManagerStatus {
        match self.read_record() {
            Some(record) if process_is_alive(record.pid) => ManagerStatus {
                running: true,
                active_workers: record.worker_count,
            },
            _ => ManagerStatus {
                running: false,
                active_workers: 0,
            },
        }
    }

    /// The body of the detached manager process itself: spawns `count`
    /// worker tasks plus a periodic lease-reclaim sweeper, and exits once
    /// the shutdown marker appears.
    pub async fn run_manager(
        &self,
        store: Arc<dyn Store>,
        count: usize,
        config: ConfigSnapshot,
        execution_timeout: Duration,
    ) -> Result<(), QueuectlError> {
        let shutdown = Arc::new(AtomicBool::new(false));

        // Recover leases left by a crashed prior manager before accepting new work.
        let reclaimed = store
            .reclaim_expired(
                chrono::Duration::seconds(2 * execution_timeout.as_secs() as i64),
                chrono::Utc::now(),
                config.backoff_base,
                crate::config::DEFAULT_BACKOFF_CAP_SECS,
            )
            .await
            .unwrap_or(0);
        if reclaimed > 0 {
            info!(reclaimed, "reclaimed expired leases at startup");
        }

        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            let worker = Worker::new(
                format!("worker-{i}-{}", std::process::id()),
                store.clone(),
                Executor::new(execution_timeout),
                &config,
            );
            let shutdown = shutdown.clone();
            let config = config.clone();
            handles.push(tokio::spawn(async move { worker.run(shutdown, config).await }));
        }

        let sweeper_store = store.clone();
        let sweeper_config = config.clone();
        let sweeper_shutdown = shutdown.clone();
        let sweeper = tokio::spawn(async move {
            const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
            const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

            let mut waited = Duration::ZERO;
            while !sweeper_shutdown.load(Ordering::Relaxed) {
                if waited < SWEEP_INTERVAL {
                    tokio::time::sleep(SHUTDOWN_POLL).await;
                    waited += SHUTDOWN_POLL;
                    continue;
                }
                waited = Duration::ZERO;

                if let Ok(n) = sweeper_store
                    .reclaim_expired(
                        chrono::Duration::seconds(2 * execution_timeout.as_secs() as i64),
                        chrono::Utc::now(),
                        sweeper_config.backoff_base,
                        crate::config::DEFAULT_BACKOFF_CAP_SECS,
                    )
                    .await
                {
                    if n > 0 {
                        info!(reclaimed = n, "periodic lease sweep");
                    }
                }
            }
        });

        let shutdown_file = self.paths.shutdown_file.clone();
        let watcher_shutdown = shutdown.clone();
        let watcher = tokio::spawn(async move {
            loop {
                if shutdown_file.exists() {
                    watcher_shutdown.store(true, Ordering::Relaxed);
                    return;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        });

        for handle in handles {
            let _ = handle.await;
        }
        shutdown.store(true, Ordering::Relaxed);
        let _ = sweeper.await;
        let _ = watcher.await;
        Ok(())
    }
}

fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    // kill(pid, 0) checks for existence/permission without signaling.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    // Best-effort only: non-Unix hosts are not a target of this CLI tool
    // (spec §1 scopes it to a single host, and the corpus's own process
    // supervision code is Unix-oriented). Treat the lifecycle file's mere
    // presence as "running".
    true
}

#[cfg(unix)]
fn kill_process(pid: u32, force: bool) {
    let sig = if force { libc::SIGKILL } else { libc::SIGTERM };
    unsafe {
        libc::kill(pid as libc::pid_t, sig);
    }
}

#[cfg(not(unix))]
fn kill_process(_pid: u32, _force: bool) {}
