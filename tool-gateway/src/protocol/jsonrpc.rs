//! JSON-RPC 2.0 envelopes as carried over the MCP HTTP endpoint.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// No resolvable caller identity, or the credential could not be parsed.
pub const AUTHENTICATION_REQUIRED: i64 = -32001;
/// Caller is known but not entitled to the requested tool.
pub const AUTHORIZATION_DENIED: i64 = -32003;

/// Inbound request. `id` is absent for notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Why a request body could not be decoded into a [`JsonRpcRequest`].
#[derive(Debug, Error)]
pub enum RequestParseError {
    #[error("parse error: {0}")]
    Parse(serde_json::Error),

    #[error("invalid request: {source}")]
    Invalid { id: Value, source: serde_json::Error },
}

impl RequestParseError {
    pub fn to_response(&self) -> JsonRpcResponse {
        match self {
            RequestParseError::Parse(_) => JsonRpcResponse::error(Value::Null, PARSE_ERROR, self.to_string()),
            RequestParseError::Invalid { id, .. } => {
                JsonRpcResponse::error(id.clone(), INVALID_REQUEST, self.to_string())
            }
        }
    }
}

impl JsonRpcRequest {
    /// Decode a request body through `serde_json::Value`.
    ///
    /// Every reader of a request body goes through here so that they agree on
    /// its meaning. A key repeated in an object resolves to its last value.
    pub fn from_slice(body: &[u8]) -> Result<Self, RequestParseError> {
        let raw: Value = serde_json::from_slice(body).map_err(RequestParseError::Parse)?;
        let id = raw.get("id").cloned().unwrap_or(Value::Null);
        serde_json::from_value(raw).map_err(|source| RequestParseError::Invalid { id, source })
    }

    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Request id echoed on responses; `null` for notifications.
    pub fn response_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }

    /// Target tool of a `tools/call`, when present and a string.
    pub fn tool_name(&self) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn with_error_data(mut self, data: Value) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.data = Some(data);
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC errors travel in a 200 response; the envelope carries the code.
impl IntoResponse for JsonRpcResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tools_call() {
        let request: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": { "name": "list_pipelines", "arguments": {} }
        }))
        .unwrap();

        assert_eq!(request.method, "tools/call");
        assert_eq!(request.tool_name(), Some("list_pipelines"));
        assert_eq!(request.response_id(), json!(7));
        assert!(!request.is_notification());
    }

    #[test]
    fn test_notification_has_null_response_id() {
        let request: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();

        assert!(request.is_notification());
        assert_eq!(request.response_id(), Value::Null);
        assert_eq!(request.tool_name(), None);
    }

    #[test]
    fn test_empty_tool_name_is_absent() {
        let request = JsonRpcRequest::new(1, "tools/call", Some(json!({ "name": "" })));
        assert_eq!(request.tool_name(), None);
    }

    #[test]
    fn test_error_envelope_shape() {
        let response = JsonRpcResponse::error(json!("abc"), AUTHORIZATION_DENIED, "denied")
            .with_error_data(json!({ "tool": "x" }));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], "abc");
        assert_eq!(value["error"]["code"], -32003);
        assert_eq!(value["error"]["data"]["tool"], "x");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_from_slice_repeated_keys_take_last_value() {
        let body = br#"{"jsonrpc":"2.0","id":1,"id":2,"method":"ping","method":"tools/call","params":{"name":"a","name":"b"}}"#;
        let request = JsonRpcRequest::from_slice(body).unwrap();

        assert_eq!(request.response_id(), json!(2));
        assert_eq!(request.method, "tools/call");
        assert_eq!(request.tool_name(), Some("b"));
    }

    #[test]
    fn test_from_slice_errors() {
        let err = JsonRpcRequest::from_slice(b"{not json").unwrap_err();
        let response = err.to_response();
        assert_eq!(response.id, Value::Null);
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);

        let err = JsonRpcRequest::from_slice(br#"{"jsonrpc":"2.0","id":5}"#).unwrap_err();
        let response = err.to_response();
        assert_eq!(response.id, json!(5));
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }
}
