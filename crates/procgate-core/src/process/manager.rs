//! Named child processes launched and stopped on request.

use crate::config::ProcessConfig;
use crate::error::{ProcgateError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Snapshot of a managed process.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
    pub program: String,
    pub args: Vec<String>,
    pub started_at: DateTime<Utc>,
}

struct ManagedProcess {
    info: ProcessInfo,
    child: Child,
}

/// Launches named child processes and keeps track of them.
///
/// Each child's stdout and stderr go to `<log_dir>/<name>.log`.
pub struct ProcessManager {
    log_dir: PathBuf,
    processes: Mutex<BTreeMap<String, ManagedProcess>>,
}

impl ProcessManager {
    /// Create a manager writing child logs under `log_dir`.
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir)?;
        Ok(Self {
            log_dir,
            processes: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Log file path for a process name.
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.log_dir
            .join(format!("{}.{}", name, ProcessConfig::LOG_FILE_SUFFIX))
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, ManagedProcess>> {
        self.processes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Launch `program` under `name`.
    pub fn start_process(&self, name: &str, program: &str, args: &[String]) -> Result<ProcessInfo> {
        validate_name(name)?;

        let mut processes = self.lock();
        reap_exited(&mut processes);
        if processes.contains_key(name) {
            return Err(ProcgateError::ProcessAlreadyRunning {
                name: name.to_string(),
            });
        }

        let log_path = self.log_path(name);
        let stdout = File::create(&log_path).map_err(|e| launch_failed(name, &e))?;
        let stderr = stdout.try_clone().map_err(|e| launch_failed(name, &e))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| launch_failed(name, &e))?;

        let info = ProcessInfo {
            name: name.to_string(),
            pid: child.id(),
            program: program.to_string(),
            args: args.to_vec(),
            started_at: Utc::now(),
        };
        info!(
            "Started process {} (pid {}): {} {:?}",
            name, info.pid, program, args
        );

        processes.insert(
            name.to_string(),
            ManagedProcess {
                info: info.clone(),
                child,
            },
        );
        Ok(info)
    }

    /// Stop the process registered under `name`.
    ///
    /// Returns `false` if it had already exited on its own.
    pub fn stop_process(&self, name: &str, timeout: Duration) -> Result<bool> {
        let managed = self
            .lock()
            .remove(name)
            .ok_or_else(|| ProcgateError::ProcessNotFound {
                name: name.to_string(),
            })?;
        stop_child(managed, timeout)
    }

    /// Stop every managed process, returning the names that were stopped.
    pub fn stop_all(&self, timeout: Duration) -> Result<Vec<String>> {
        let drained: Vec<ManagedProcess> = {
            let mut processes = self.lock();
            std::mem::take(&mut *processes).into_values().collect()
        };

        let mut stopped = Vec::with_capacity(drained.len());
        let mut first_error = None;
        for managed in drained {
            let name = managed.info.name.clone();
            match stop_child(managed, timeout) {
                Ok(_) => stopped.push(name),
                Err(e) => {
                    warn!("Failed to stop process {}: {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(stopped),
        }
    }

    /// Names of processes that are still running, sorted.
    pub fn list_running(&self) -> Vec<String> {
        let mut processes = self.lock();
        reap_exited(&mut processes);
        processes.keys().cloned().collect()
    }

    /// Details of every running process, sorted by name.
    pub fn process_view(&self) -> Vec<ProcessInfo> {
        let mut processes = self.lock();
        reap_exited(&mut processes);
        processes.values().map(|m| m.info.clone()).collect()
    }

    pub fn process_count(&self) -> usize {
        let mut processes = self.lock();
        reap_exited(&mut processes);
        processes.len()
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        if let Err(e) = self.stop_all(ProcessConfig::STOP_TIMEOUT) {
            warn!("Failed to stop managed processes on drop: {}", e);
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(ProcgateError::invalid_params(format!(
            "Invalid process name: {:?}",
            name
        )))
    }
}

fn launch_failed(name: &str, err: &std::io::Error) -> ProcgateError {
    ProcgateError::LaunchFailed {
        name: name.to_string(),
        message: err.to_string(),
    }
}

/// Drop entries whose child has already exited.
fn reap_exited(processes: &mut BTreeMap<String, ManagedProcess>) {
    processes.retain(|name, managed| match managed.child.try_wait() {
        Ok(Some(status)) => {
            debug!("Process {} exited with {}", name, status);
            false
        }
        Ok(None) => true,
        Err(e) => {
            warn!("Failed to poll process {}: {}", name, e);
            true
        }
    });
}

fn stop_child(mut managed: ManagedProcess, timeout: Duration) -> Result<bool> {
    let name = &managed.info.name;
    if let Some(status) = managed.child.try_wait()? {
        debug!("Process {} already exited with {}", name, status);
        return Ok(false);
    }

    request_termination(&managed.child);

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = managed.child.try_wait()? {
            info!("Process {} stopped with {}", name, status);
            return Ok(true);
        }
        std::thread::sleep(ProcessConfig::STOP_POLL_INTERVAL);
    }

    debug!("Process {} still running, killing", name);
    managed.child.kill()?;
    let status = managed.child.wait()?;
    info!("Process {} killed ({})", name, status);
    Ok(true)
}

#[cfg(unix)]
fn request_termination(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    debug!("Sending SIGTERM to process {}", child.id());
    if let Err(e) = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
        warn!("Failed to send SIGTERM to {}: {}", child.id(), e);
    }
}

#[cfg(not(unix))]
fn request_termination(_child: &Child) {
    // No graceful signal here; the kill after the timeout does the work.
}
