//! Entitlement gate in front of the MCP endpoint.
//!
//! `tools/list` responses are filtered down to the caller's allowed toolsets
//! and `tools/call` requests for other toolsets are refused before they reach
//! a handler. Everything else passes through untouched.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{Method, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use metrics::counter;
use serde_json::{Value, json};
use service_core::error::AppError;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::auth::{AuthError, AuthRejection, Scope, ScopeResolver};
use crate::license::{LicenseCache, LicenseLookup};
use crate::modules::ModuleRegistry;
use crate::protocol::jsonrpc::{AUTHENTICATION_REQUIRED, AUTHORIZATION_DENIED, INVALID_PARAMS};
use crate::protocol::mcp::{METHOD_TOOLS_CALL, METHOD_TOOLS_LIST};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::toolsets::ToolGroupIndex;

pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolAuthzError {
    #[error("authentication required")]
    AuthenticationMissing,

    #[error("malformed credentials: {0}")]
    AuthenticationMalformed(String),

    #[error(
        "tool '{tool}' is not available to this account; allowed toolsets: {}",
        comma_list(.allowed)
    )]
    AuthorizationDenied {
        tool: String,
        toolset: Option<String>,
        allowed: BTreeSet<String>,
    },

    #[error("invalid params: {0}")]
    InvalidParams(String),
}

fn comma_list(values: &BTreeSet<String>) -> String {
    values.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl From<AuthError> for ToolAuthzError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing => ToolAuthzError::AuthenticationMissing,
            AuthError::Malformed(reason) => ToolAuthzError::AuthenticationMalformed(reason),
        }
    }
}

impl ToolAuthzError {
    /// JSON-RPC error code for this failure.
    pub fn code(&self) -> i64 {
        match self {
            ToolAuthzError::AuthenticationMissing | ToolAuthzError::AuthenticationMalformed(_) => {
                AUTHENTICATION_REQUIRED
            }
            ToolAuthzError::AuthorizationDenied { .. } => AUTHORIZATION_DENIED,
            ToolAuthzError::InvalidParams(_) => INVALID_PARAMS,
        }
    }

    /// Label for `tool_calls_denied_total`.
    pub fn reason(&self) -> &'static str {
        match self {
            ToolAuthzError::AuthenticationMissing => "unauthenticated",
            ToolAuthzError::AuthenticationMalformed(_) => "malformed_credentials",
            ToolAuthzError::AuthorizationDenied { .. } => "not_entitled",
            ToolAuthzError::InvalidParams(_) => "invalid_params",
        }
    }

    pub fn to_response(&self, id: Value) -> JsonRpcResponse {
        let response = JsonRpcResponse::error(id, self.code(), self.to_string());
        match self {
            ToolAuthzError::AuthorizationDenied {
                tool,
                toolset,
                allowed,
            } => response.with_error_data(json!({
                "tool": tool,
                "toolset": toolset,
                "allowedToolsets": allowed,
            })),
            _ => response,
        }
    }
}

/// Removes tools whose toolset is not in `allowed`, keeping input order.
///
/// Entries without a string `name`, and tools the index does not know, are
/// dropped.
pub fn filter_tools(tools: &[Value], index: &ToolGroupIndex, allowed: &BTreeSet<String>) -> Vec<Value> {
    tools
        .iter()
        .filter(|tool| {
            tool.get("name")
                .and_then(Value::as_str)
                .and_then(|name| index.group_of(name))
                .is_some_and(|toolset| allowed.contains(toolset))
        })
        .cloned()
        .collect()
}

/// License-aware authorization shared by every request.
pub struct ToolAuthorizer {
    cache: Arc<LicenseCache>,
    lookup: Arc<dyn LicenseLookup>,
    modules: Arc<ModuleRegistry>,
    index: Arc<ToolGroupIndex>,
    resolver: Option<Arc<ScopeResolver>>,
    max_body_bytes: usize,
}

impl ToolAuthorizer {
    pub fn new(
        cache: Arc<LicenseCache>,
        lookup: Arc<dyn LicenseLookup>,
        modules: Arc<ModuleRegistry>,
        index: Arc<ToolGroupIndex>,
    ) -> Self {
        Self {
            cache,
            lookup,
            modules,
            index,
            resolver: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Resolve scope from headers when no upstream middleware attached one.
    pub fn with_scope_resolver(mut self, resolver: Arc<ScopeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Licensed module ids for `account_id`.
    ///
    /// Served from the cache when fresh. Failed lookups are not cached and
    /// degrade this request to the baseline modules.
    pub async fn licensed_modules(&self, account_id: &str) -> HashSet<String> {
        if let Some(modules) = self.cache.get(account_id).await {
            counter!("license_cache_hits_total").increment(1);
            tracing::debug!(account_id, cache = "hit", "License cache hit");
            return modules;
        }

        counter!("license_cache_misses_total").increment(1);
        tracing::debug!(account_id, cache = "miss", "License cache miss");

        match self.lookup.fetch_licenses(account_id).await {
            Ok(modules) => {
                self.cache.set(account_id, modules.clone()).await;
                modules
            }
            Err(err) => {
                counter!("license_lookup_failures_total").increment(1);
                tracing::warn!(
                    account_id,
                    error = %err,
                    "License lookup failed, using baseline entitlement for this request"
                );
                self.modules.baseline_module_ids()
            }
        }
    }

    pub async fn allowed_toolsets(&self, account_id: &str) -> BTreeSet<String> {
        let licensed = self.licensed_modules(account_id).await;
        self.modules.compute_allowed_toolsets(&licensed)
    }

    /// Decide whether `account_id` may invoke `tool`.
    ///
    /// Tools missing from the index are refused.
    pub async fn authorize_tool(&self, account_id: &str, tool: &str) -> Result<(), ToolAuthzError> {
        let allowed = self.allowed_toolsets(account_id).await;

        match self.index.group_of(tool) {
            Some(toolset) if allowed.contains(toolset) => {
                tracing::debug!(account_id, tool, toolset, "Tool call authorized");
                Ok(())
            }
            toolset => Err(ToolAuthzError::AuthorizationDenied {
                tool: tool.to_string(),
                toolset: toolset.map(str::to_string),
                allowed,
            }),
        }
    }

    fn resolve_scope(&self, parts: &mut Parts) -> Result<Scope, ToolAuthzError> {
        if let Some(scope) = parts.extensions.get::<Scope>() {
            return Ok(scope.clone());
        }

        if let Some(AuthRejection(err)) = parts.extensions.get::<AuthRejection>() {
            return Err(err.clone().into());
        }

        let Some(resolver) = &self.resolver else {
            return Err(ToolAuthzError::AuthenticationMissing);
        };

        let (scope, material) = resolver.resolve(&parts.headers)?;
        parts.extensions.insert(scope.clone());
        parts.extensions.insert(material);
        Ok(scope)
    }

    async fn discover(&self, rpc: JsonRpcRequest, mut parts: Parts, body: Bytes, next: Next) -> Response {
        let scope = match self.resolve_scope(&mut parts) {
            Ok(scope) => scope,
            Err(err) => {
                tracing::debug!(error = %err, "Tool discovery without identity, returning no tools");
                return JsonRpcResponse::success(rpc.response_id(), json!({ "tools": [] }))
                    .into_response();
            }
        };

        let allowed = self.allowed_toolsets(&scope.account_id).await;
        let response = next.run(Request::from_parts(parts, Body::from(body))).await;

        filter_listing(response, &self.index, &allowed, &scope.account_id).await
    }

    async fn invoke(&self, rpc: JsonRpcRequest, mut parts: Parts, body: Bytes, next: Next) -> Response {
        let decision = match self.resolve_scope(&mut parts) {
            Ok(scope) => match rpc.tool_name() {
                Some(tool) => self.authorize_tool(&scope.account_id, tool).await,
                None => Err(ToolAuthzError::InvalidParams(
                    "tools/call requires a tool name".to_string(),
                )),
            },
            Err(err) => Err(err),
        };

        match decision {
            Ok(()) => next.run(Request::from_parts(parts, Body::from(body))).await,
            Err(err) => {
                counter!("tool_calls_denied_total", "reason" => err.reason()).increment(1);
                tracing::warn!(
                    tool = rpc.tool_name().unwrap_or("-"),
                    reason = err.reason(),
                    error = %err,
                    "Tool call refused"
                );
                err.to_response(rpc.response_id()).into_response()
            }
        }
    }
}

/// Rewrite a `tools/list` response in place, keeping the envelope intact.
async fn filter_listing(
    response: Response,
    index: &ToolGroupIndex,
    allowed: &BTreeSet<String>,
    account_id: &str,
) -> Response {
    let (mut parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            tracing::error!(error = %err, "Failed to buffer tool listing");
            return AppError::InternalError(anyhow::anyhow!("failed to read tool listing")).into_response();
        }
    };

    let Ok(mut envelope) = serde_json::from_slice::<Value>(&bytes) else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    let Some(tools) = envelope.pointer_mut("/result/tools").and_then(Value::as_array_mut) else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    let total = tools.len();
    let visible = filter_tools(tools, index, allowed);
    *tools = visible;
    tracing::debug!(
        account_id,
        total,
        visible = tools.len(),
        allowed_toolsets = allowed.len(),
        "Filtered tool listing"
    );

    match serde_json::to_vec(&envelope) {
        Ok(body) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(body))
        }
        Err(err) => AppError::InternalError(anyhow::Error::new(err)).into_response(),
    }
}

pub async fn tool_authorization_middleware(
    State(authz): State<Arc<ToolAuthorizer>>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() != Method::POST {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let bytes = match Limited::new(body, authz.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            return AppError::PayloadTooLarge(format!(
                "request body exceeds {} bytes",
                authz.max_body_bytes
            ))
            .into_response();
        }
        Err(err) => {
            return AppError::BadRequest(anyhow::anyhow!("failed to read request body: {}", err))
                .into_response();
        }
    };

    // Undecodable bodies are answered here rather than forwarded.
    let rpc = match JsonRpcRequest::from_slice(&bytes) {
        Ok(rpc) => rpc,
        Err(err) => {
            tracing::debug!(error = %err, "Rejecting undecodable JSON-RPC body");
            return err.to_response().into_response();
        }
    };

    match rpc.method.as_str() {
        METHOD_TOOLS_LIST => authz.discover(rpc, parts, bytes, next).await,
        METHOD_TOOLS_CALL => authz.invoke(rpc, parts, bytes, next).await,
        _ => next.run(Request::from_parts(parts, Body::from(bytes))).await,
    }
}
