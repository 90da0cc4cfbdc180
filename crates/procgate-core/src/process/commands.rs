//! Remote command table for [`ProcessManager`].

use super::manager::ProcessManager;
use crate::config::ProcessConfig;
use crate::error::{ProcgateError, Result};
use crate::proxy::{CallArgs, Command, CommandTable};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Methods the binary allow-lists by default.
pub const DEFAULT_ALLOWLIST: &[&str] = &[
    "list_running",
    "process_view",
    "process_count",
    "start_process",
    "stop_process",
    "signal_termination",
];

impl ProcessManager {
    /// Every operation a proxy may expose, with parameter schemas.
    pub fn command_table() -> CommandTable<ProcessManager> {
        CommandTable::new()
            .with(Command::from_fn(
                "list_running",
                &[],
                |pm: &ProcessManager, _| Ok(json!(pm.list_running())),
            ))
            .with(Command::from_fn(
                "process_view",
                &[],
                |pm: &ProcessManager, _| Ok(serde_json::to_value(pm.process_view())?),
            ))
            .with(Command::from_fn(
                "process_count",
                &[],
                |pm: &ProcessManager, _| Ok(json!(pm.process_count())),
            ))
            .with(Command::from_fn(
                "start_process",
                &["name", "program", "args"],
                |pm: &ProcessManager, args: CallArgs| {
                    let name = args.required_str(0, "name")?;
                    let program = args.required_str(1, "program")?;
                    let argv = args.string_list(2, "args")?;
                    Ok(serde_json::to_value(pm.start_process(name, program, &argv)?)?)
                },
            ))
            .with(Command::new(
                "stop_process",
                &["name", "timeout_ms"],
                |pm: Arc<ProcessManager>, args: CallArgs| async move {
                    let name = args.required_str(0, "name")?.to_string();
                    let timeout = stop_timeout(&args, 1)?;
                    let stopped = blocking(move || pm.stop_process(&name, timeout)).await?;
                    Ok(json!(stopped))
                },
            ))
            .with(Command::new(
                "stop_all",
                &["timeout_ms"],
                |pm: Arc<ProcessManager>, args: CallArgs| async move {
                    let timeout = stop_timeout(&args, 0)?;
                    let stopped = blocking(move || pm.stop_all(timeout)).await?;
                    Ok(json!(stopped))
                },
            ))
    }
}

fn stop_timeout(args: &CallArgs, index: usize) -> Result<Duration> {
    match args.optional_i64(index, "timeout_ms")? {
        None => Ok(ProcessConfig::STOP_TIMEOUT),
        Some(ms) if ms >= 0 => Ok(Duration::from_millis(ms as u64)),
        Some(ms) => Err(ProcgateError::invalid_params(format!(
            "timeout_ms must not be negative, got {}",
            ms
        ))),
    }
}

/// Run blocking process work off the async worker threads.
async fn blocking<F, R>(work: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ProcgateError::Other(format!("Process task failed: {}", e)))?
}
