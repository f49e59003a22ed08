#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tool_gateway::auth::{AuthExtractor, ScopeResolver};
use tool_gateway::config::McpConfig;
use tool_gateway::license::{LicenseCache, LicenseError, LicenseLookup};
use tool_gateway::middleware::{DEFAULT_MAX_BODY_BYTES, ToolAuthorizer};
use tool_gateway::modules::{CORE_MODULE_ID, ModuleRegistry, UNLICENSED_MODULE_ID};
use tool_gateway::protocol::{CallToolResult, ToolDescriptor};
use tool_gateway::toolsets::{
    Tool, ToolContext, ToolError, ToolGroupIndex, ToolHandler, Toolset, ToolsetRegistry,
};
use tool_gateway::{AppState, build_router};
use tower::ServiceExt;

pub const ACCOUNT_ID: &str = "acc-123";
pub const API_KEY: &str = "pat.acc-123.tok.secret";

/// Baseline toolset ("pipelines"), CD toolset ("services") and STO toolset ("sto").
pub const BASELINE_TOOL: &str = "list_pipelines";
pub const CD_TOOL: &str = "list_services";
pub const STO_TOOL: &str = "list_security_issues";

/// License source returning a fixed answer and counting lookups.
pub struct StubLookup {
    active: Option<HashSet<String>>,
    calls: AtomicUsize,
}

impl StubLookup {
    pub fn active(modules: &[&str]) -> Arc<Self> {
        let mut active: HashSet<String> = modules.iter().map(|m| m.to_string()).collect();
        active.insert(CORE_MODULE_ID.to_string());
        active.insert(UNLICENSED_MODULE_ID.to_string());
        Arc::new(Self {
            active: Some(active),
            calls: AtomicUsize::new(0),
        })
    }

    /// Every lookup fails as if the licensing service timed out.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            active: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LicenseLookup for StubLookup {
    async fn fetch_licenses(&self, _account_id: &str) -> Result<HashSet<String>, LicenseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.active
            .clone()
            .ok_or(LicenseError::DeadlineExceeded(Duration::from_secs(5)))
    }
}

/// Tool handler that records how often it ran.
pub struct CountingHandler {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolHandler for CountingHandler {
    async fn call(&self, ctx: &ToolContext, _arguments: Value) -> Result<CallToolResult, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CallToolResult::text(format!("ran for {}", ctx.scope.account_id)))
    }
}

pub struct TestGateway {
    pub router: Router,
    pub lookup: Arc<StubLookup>,
    pub cache: Arc<LicenseCache>,
    handler_calls: Arc<AtomicUsize>,
}

impl TestGateway {
    pub fn new(lookup: Arc<StubLookup>) -> Self {
        Self::with_ttl(lookup, Duration::from_secs(300))
    }

    pub fn with_ttl(lookup: Arc<StubLookup>, ttl: Duration) -> Self {
        let handler_calls = Arc::new(AtomicUsize::new(0));
        let registry = test_registry(&handler_calls);
        let index = ToolGroupIndex::from_registry(&registry).expect("test registry is consistent");

        let resolver = Arc::new(ScopeResolver::new(AuthExtractor::default(), None, None));
        let cache = Arc::new(LicenseCache::new(ttl));
        let authorizer = Arc::new(ToolAuthorizer::new(
            cache.clone(),
            lookup.clone(),
            Arc::new(ModuleRegistry::default()),
            Arc::new(index),
        ));

        let state = AppState {
            registry: Arc::new(registry),
            license_cache: cache.clone(),
        };
        let mcp = McpConfig {
            path: "/mcp".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        };

        Self {
            router: build_router(state, resolver, authorizer, &mcp),
            lookup,
            cache,
            handler_calls,
        }
    }

    pub fn handler_calls(&self) -> usize {
        self.handler_calls.load(Ordering::SeqCst)
    }

    /// POST a JSON-RPC body to `/mcp`, returning status and parsed body.
    pub async fn rpc(&self, body: Value, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        self.rpc_raw(&body.to_string(), headers).await
    }

    /// POST `body` exactly as given, for payloads `json!` cannot express.
    pub async fn rpc_raw(&self, body: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let response = self
            .router
            .clone()
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

fn test_registry(calls: &Arc<AtomicUsize>) -> ToolsetRegistry {
    let tool = |name: &str| {
        Tool::new(
            ToolDescriptor::with_string_params(name, "test tool", &[]),
            Arc::new(CountingHandler {
                calls: calls.clone(),
            }),
        )
    };

    let mut registry = ToolsetRegistry::new();
    for (toolset, tool_name) in [
        ("pipelines", BASELINE_TOOL),
        ("services", CD_TOOL),
        ("sto", STO_TOOL),
    ] {
        registry
            .register(Toolset::new(toolset, toolset).with_tool(tool(tool_name)))
            .expect("unique test tools");
    }
    registry
}

pub fn list_request(id: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": "tools/list" })
}

pub fn call_request(id: Value, tool: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": tool, "arguments": {} }
    })
}

pub fn tool_names(body: &Value) -> Vec<String> {
    body["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect()
}
