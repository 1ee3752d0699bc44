//! Runs a single job's command as a child process (spec §4.2).

use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

/// Outcome of one execution attempt. Never an `Err` from the worker's point
/// of view — spec §7 requires `Timeout`/`ExecutionFailure` to be recorded
/// as data, never surfaced as a propagated error.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub exit_code: i64,
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone)]
pub struct Executor {
    pub timeout: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::config::DEFAULT_EXECUTION_TIMEOUT_SECS),
        }
    }
}

impl Executor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Spawn `command` in a platform shell, capture stdout/stderr, and wait
    /// up to `self.timeout`. On timeout the child (and its process group on
    /// Unix) is killed and the result carries `error: "timeout"`,
    /// `exit_code: -1`.
    pub async fn run(&self, command: &str) -> ExecutionOutcome {
        let mut cmd = shell_command(command);
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        #[cfg(unix)]
        unsafe {
            use std::os::unix::process::CommandExt;
            cmd.pre_exec(|| {
                // Put the child in its own process group so a timeout can
                // kill the whole tree, not just the shell.
                libc_setsid();
                Ok(())
            });
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionOutcome {
                    exit_code: -1,
                    error: Some(e.to_string()),
                    stdout: String::new(),
                    stderr: format!("failed to spawn command: {e}"),
                };
            }
        };
        let pid = child.id();

        match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1) as i64;
                let error = if exit_code != 0 {
                    Some("nonzero_exit".to_string())
                } else {
                    None
                };
                ExecutionOutcome {
                    exit_code,
                    error,
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }
            }
            Ok(Err(e)) => ExecutionOutcome {
                exit_code: -1,
                error: Some(e.to_string()),
                stdout: String::new(),
                stderr: format!("error waiting on child: {e}"),
            },
            Err(_elapsed) => {
                // `wait_with_output`'s future owned `child`; it was just
                // dropped without killing the process, so the only way
                // left to reach it is by pid. `setsid()` above made the
                // child its own process-group leader, so killing -pid
                // takes the whole tree with it.
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                warn!(%command, timeout = ?self.timeout, "job timed out, terminating child");
                ExecutionOutcome {
                    exit_code: -1,
                    error: Some("timeout".to_string()),
                    stdout: String::new(),
                    stderr: format!("command exceeded {:?} timeout", self.timeout),
                }
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Commands are opaque shell command lines, executed as-is: no parsing, no
/// quoting rewrite, no sandboxing. Job authors trust the host (spec §4.2).
fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command);
        cmd
    }
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}

#[cfg(unix)]
fn libc_setsid() {
    // Safety: setsid() is async-signal-safe and valid to call in a
    // pre_exec hook; failure (already a session leader) is harmless here.
    unsafe {
        libc::setsid();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let executor = Executor::new(Duration::from_secs(5));
        let outcome = executor.run("printf hello").await;
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.stdout, "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_recorded_as_data_not_error() {
        let executor = Executor::new(Duration::from_secs(5));
        let outcome = executor.run("exit 1").await;
        assert_eq!(outcome.exit_code, 1);
        assert_eq!(outcome.error.as_deref(), Some("nonzero_exit"));
    }

    #[tokio::test]
    async fn timeout_kills_child_and_reports_timeout_error() {
        let executor = Executor::new(Duration::from_millis(50));
        let outcome = executor.run("sleep 5").await;
        assert_eq!(outcome.exit_code, -1);
        assert_eq!(outcome.error.as_deref(), Some("timeout"));
    }
}
