//! Centralized configuration for procgate.
//!
//! This module provides the constants shared by the proxy, the transport
//! server and the reference process manager, plus the endpoint description
//! the server binds to.

use std::fmt;
use std::time::Duration;

/// Proxy-level configuration.
pub struct ProxyConfig;

impl ProxyConfig {
    /// Prefix marking a trailing positional argument as a JSON keyword overlay.
    pub const OVERLAY_PREFIX: &'static str = "js:";

    /// Names that can never be placed on an allowlist.
    ///
    /// `get_exposed_object` hands out the privileged object itself and only
    /// exists for same-process callers.
    pub const RESERVED_METHODS: &'static [&'static str] = &["get_exposed_object"];

    pub const EXAMPLE_METHOD: &'static str = "example_method";
    pub const EXAMPLE_METHOD_HELP: &'static str = "example_method(2,3) => 5";
    pub const SIGNATURES_NOT_SUPPORTED: &'static str = "signatures not supported";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 8500;
    pub const DEFAULT_RPC_PATH: &'static str = "/rpc";
    pub const CLIENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Process manager configuration.
pub struct ProcessConfig;

impl ProcessConfig {
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);
    pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);
    pub const LOG_FILE_SUFFIX: &'static str = "log";
}

/// The address and URL path a transport server answers on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    pub host: String,
    pub port: u16,
    /// Always starts with exactly one `/`.
    pub path: String,
}

impl RpcEndpoint {
    /// Create an endpoint, normalizing `path` to a single leading slash.
    pub fn new(host: impl Into<String>, port: u16, path: &str) -> Self {
        Self {
            host: host.into(),
            port,
            path: normalize_path(path),
        }
    }

    /// Socket address string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full HTTP URL of the endpoint.
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

impl Default for RpcEndpoint {
    fn default() -> Self {
        Self::new(
            NetworkConfig::DEFAULT_HOST,
            NetworkConfig::DEFAULT_PORT,
            NetworkConfig::DEFAULT_RPC_PATH,
        )
    }
}

impl fmt::Display for RpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}
