//! JSON-RPC request handling.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use procgate_core::{ProcgateError, RpcProxy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Body is not valid JSON.
pub const PARSE_ERROR: i32 = -32700;
/// Body is JSON but not a request object, or was sent with the wrong content type.
pub const INVALID_REQUEST: i32 = -32600;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: Some(Value::Array(params)),
            id: Some(id),
        }
    }
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }

    /// Fault response for a failed call.
    pub fn fault(id: Option<Value>, err: &ProcgateError) -> Self {
        Self::error(id, err.to_rpc_error_code(), err.to_string())
    }
}

/// The wire carries positional arguments only.
fn positional_params(params: Option<Value>) -> Result<Vec<Value>, ProcgateError> {
    match params {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ProcgateError::invalid_params(
            "params must be a positional array",
        )),
    }
}

/// Fault for a body that never became a request.
fn rejection_fault(rejection: &JsonRejection) -> JsonRpcResponse {
    let code = match rejection {
        JsonRejection::JsonSyntaxError(_) => PARSE_ERROR,
        _ => INVALID_REQUEST,
    };
    warn!("Rejected malformed RPC request: {}", rejection.body_text());
    JsonRpcResponse::error(None, code, rejection.body_text())
}

/// Main JSON-RPC handler: every call goes to the proxy.
pub async fn handle_rpc<T: Send + Sync + 'static>(
    State(proxy): State<Arc<RpcProxy<T>>>,
    payload: Result<Json<JsonRpcRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return (StatusCode::OK, Json(rejection_fault(&rejection))),
    };
    let id = request.id.clone();
    debug!("RPC request: {}({:?})", request.method, request.params);

    let result = match positional_params(request.params) {
        Ok(params) => proxy.handle(&request.method, params).await,
        Err(e) => Err(e),
    };

    let response = match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        // Failures are logged by the proxy itself.
        Err(e) => JsonRpcResponse::fault(id, &e),
    };
    (StatusCode::OK, Json(response))
}
