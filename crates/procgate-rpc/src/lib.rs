//! JSON-RPC transport for procgate.
//!
//! - [`server`]: binds one URL path and funnels every call into an `RpcProxy`
//! - [`client`]: caller-side stub speaking the same wire format
//! - [`handler`]: JSON-RPC 2.0 request/response types and the axum handler

pub mod client;
pub mod handler;
pub mod server;

pub use client::RpcClient;
pub use server::{listen_for_signals, serve, RpcServer, ServeOutcome};
