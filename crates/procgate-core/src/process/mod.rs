//! Reference process manager exposed by the `procgate-rpc` binary.
//!
//! Launches named child processes, tracks them, and stops them on request.
//! [`ProcessManager::command_table`] declares the remote surface.
//!
//! # Example
//!
//! ```rust,no_run
//! use procgate_core::process::ProcessManager;
//! use std::time::Duration;
//!
//! fn main() -> procgate_core::Result<()> {
//!     let manager = ProcessManager::new("/tmp/procgate-logs")?;
//!     manager.start_process("worker-1", "sleep", &["60".to_string()])?;
//!
//!     for info in manager.process_view() {
//!         println!("{} pid={} since {}", info.name, info.pid, info.started_at);
//!     }
//!
//!     manager.stop_process("worker-1", Duration::from_secs(2))?;
//!     Ok(())
//! }
//! ```

mod commands;
mod manager;

pub use commands::DEFAULT_ALLOWLIST;
pub use manager::{ProcessInfo, ProcessManager};
