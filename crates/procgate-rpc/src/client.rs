//! Caller-side handle to a remote procgate endpoint.

use crate::handler::{JsonRpcRequest, JsonRpcResponse};
use procgate_core::proxy::encode_overlay;
use procgate_core::{NetworkConfig, ProcgateError, Result};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// Thin JSON-RPC client bound to one endpoint URL (`http://host:port/path`).
#[derive(Debug)]
pub struct RpcClient {
    endpoint: Url,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| ProcgateError::Configuration {
            message: format!("Invalid endpoint {}: {}", endpoint, e),
        })?;
        let http = reqwest::Client::builder()
            .timeout(NetworkConfig::CLIENT_REQUEST_TIMEOUT)
            .build()
            .map_err(network_error)?;

        Ok(Self {
            endpoint,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Call `method` with positional arguments.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, json!(id));

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProcgateError::Network {
                message: format!("{} answered {}", self.endpoint, status),
            });
        }

        let reply: JsonRpcResponse = response.json().await.map_err(network_error)?;
        match reply.error {
            Some(error) => Err(ProcgateError::Fault {
                code: error.code,
                message: error.message,
            }),
            None => Ok(reply.result.unwrap_or(Value::Null)),
        }
    }

    /// Call `method`, sending `keywords` as a trailing overlay argument.
    pub async fn call_with_keywords(
        &self,
        method: &str,
        mut params: Vec<Value>,
        keywords: Map<String, Value>,
    ) -> Result<Value> {
        if !keywords.is_empty() {
            params.push(encode_overlay(&keywords));
        }
        self.call(method, params).await
    }

    pub async fn list_methods(&self) -> Result<Vec<String>> {
        let value = self.call("system.listMethods", Vec::new()).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn method_help(&self, method: &str) -> Result<String> {
        let value = self.call("system.methodHelp", vec![json!(method)]).await?;
        Ok(serde_json::from_value(value)?)
    }
}

fn network_error(err: reqwest::Error) -> ProcgateError {
    ProcgateError::Network {
        message: err.to_string(),
    }
}
