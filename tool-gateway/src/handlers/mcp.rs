//! JSON-RPC dispatch for the MCP endpoint.

use axum::{
    Extension,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::{AuthMaterial, Scope};
use crate::protocol::jsonrpc::{
    AUTHENTICATION_REQUIRED, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION,
    METHOD_NOT_FOUND,
};
use crate::protocol::mcp::{
    METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    PROTOCOL_VERSION,
};
use crate::protocol::{CallToolResult, JsonRpcRequest, JsonRpcResponse};
use crate::startup::AppState;
use crate::toolsets::{ToolContext, ToolError};

pub const SERVER_NAME: &str = "tool-gateway";

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub async fn handle_mcp(
    State(state): State<AppState>,
    scope: Option<Extension<Scope>>,
    credential: Option<Extension<AuthMaterial>>,
    body: Bytes,
) -> Response {
    let request = match JsonRpcRequest::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return err.to_response().into_response(),
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return JsonRpcResponse::error(request.response_id(), INVALID_REQUEST, "jsonrpc must be \"2.0\"")
            .into_response();
    }

    if request.is_notification() {
        tracing::debug!(method = %request.method, "Notification received");
        return StatusCode::ACCEPTED.into_response();
    }

    let id = request.response_id();
    let response = match request.method.as_str() {
        METHOD_INITIALIZE => JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        METHOD_PING => JsonRpcResponse::success(id, json!({})),
        METHOD_TOOLS_LIST => {
            JsonRpcResponse::success(id, json!({ "tools": state.registry.descriptors() }))
        }
        METHOD_TOOLS_CALL => {
            call_tool(
                &state,
                id,
                request.params,
                scope.map(|Extension(s)| s),
                credential.map(|Extension(c)| c),
            )
            .await
        }
        METHOD_INITIALIZED => JsonRpcResponse::success(id, json!({})),
        other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("method not found: {}", other)),
    };

    response.into_response()
}

async fn call_tool(
    state: &AppState,
    id: Value,
    params: Option<Value>,
    scope: Option<Scope>,
    credential: Option<AuthMaterial>,
) -> JsonRpcResponse {
    let Some(scope) = scope else {
        return JsonRpcResponse::error(id, AUTHENTICATION_REQUIRED, "authentication required");
    };

    let params: CallToolParams = match params.map(serde_json::from_value) {
        Some(Ok(params)) => params,
        Some(Err(err)) => {
            return JsonRpcResponse::error(id, INVALID_PARAMS, format!("invalid params: {}", err));
        }
        None => return JsonRpcResponse::error(id, INVALID_PARAMS, "missing params"),
    };

    let Some(tool) = state.registry.find(&params.name) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, format!("unknown tool: {}", params.name));
    };

    let ctx = ToolContext { scope, credential };
    let result = match tool.handler.call(&ctx, params.arguments).await {
        Ok(result) => result,
        Err(ToolError::InvalidArguments(reason)) => {
            return JsonRpcResponse::error(id, INVALID_PARAMS, reason);
        }
        Err(err) => {
            tracing::warn!(
                tool = %params.name,
                account_id = %ctx.scope.account_id,
                error = %err,
                "Tool call failed"
            );
            CallToolResult::error_text(err.to_string())
        }
    };

    match serde_json::to_value(&result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(err) => JsonRpcResponse::error(id, INTERNAL_ERROR, err.to_string()),
    }
}
