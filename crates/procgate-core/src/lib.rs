//! # procgate
//!
//! A restricted remote-control proxy: exposes an allow-listed subset of one
//! local object's commands to remote callers.
//!
//! ## Modules
//!
//! - [`proxy`]: dispatch engine, command tables, keyword overlay, introspection
//! - [`shutdown`]: shutdown token shared by the serve loop and signal handlers
//! - [`process`]: reference process manager exposed by the binary
//! - [`config`]: constants and endpoint configuration
//! - [`error`]: error type and JSON-RPC error codes

pub mod config;
pub mod error;
pub mod process;
pub mod proxy;
pub mod shutdown;

pub use config::{NetworkConfig, ProcessConfig, ProxyConfig, RpcEndpoint};
pub use error::{ProcgateError, Result};
pub use proxy::{CallArgs, Command, CommandTable, ExitHookStatus, ProxyContext, RpcProxy};
pub use shutdown::{ShutdownReason, ShutdownToken};
