use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use service_core::observability::extract_request_id;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthExtractor, ScopeResolver, auth_middleware};
use crate::config::{GatewayConfig, McpConfig};
use crate::handlers;
use crate::license::{LicenseCache, LicenseClient, LicenseLookup};
use crate::middleware::{ToolAuthorizer, tool_authorization_middleware};
use crate::modules::ModuleRegistry;
use crate::toolsets::{PlatformClient, ToolGroupIndex, ToolsetRegistry, default_registry};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolsetRegistry>,
    pub license_cache: Arc<LicenseCache>,
}

/// Routes plus the middleware stack.
///
/// Outermost first: request id, tracing, HTTP metrics. The MCP route is
/// additionally wrapped by scope resolution and then tool authorization.
pub fn build_router(
    state: AppState,
    resolver: Arc<ScopeResolver>,
    authorizer: Arc<ToolAuthorizer>,
    mcp: &McpConfig,
) -> Router {
    let mcp_routes = Router::new()
        .route(&mcp.path, post(handlers::handle_mcp))
        .layer(from_fn_with_state(authorizer, tool_authorization_middleware))
        .layer(from_fn_with_state(resolver, auth_middleware))
        .layer(DefaultBodyLimit::max(mcp.max_body_bytes));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .merge(mcp_routes)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
            let request_id = extract_request_id(req.headers()).unwrap_or_default();
            tracing::info_span!(
                "http_request",
                method = %req.method(),
                uri = %req.uri(),
                request_id = %request_id,
            )
        }))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
    shutdown: CancellationToken,
    sweeper: JoinHandle<()>,
}

impl Application {
    pub async fn build(config: GatewayConfig) -> Result<Self, AppError> {
        let client_config = config.license_client_config()?;
        let lookup = LicenseClient::new(client_config).map_err(|e| {
            tracing::error!("Failed to initialize license client: {}", e);
            AppError::ConfigError(anyhow::Error::new(e))
        })?;

        Self::build_with_lookup(config, Arc::new(lookup)).await
    }

    /// Wire the gateway around an arbitrary license source.
    pub async fn build_with_lookup(
        config: GatewayConfig,
        lookup: Arc<dyn LicenseLookup>,
    ) -> Result<Self, AppError> {
        let platform = PlatformClient::new(config.platform_url()?, config.request_timeout())?;

        let registry = default_registry(&platform)
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
        let index = ToolGroupIndex::from_registry(&registry)
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

        let extractor = AuthExtractor::new(config.auth.fallback_api_key.as_ref())
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("auth.fallback_api_key: {}", e)))?;
        let resolver = Arc::new(ScopeResolver::new(
            extractor,
            config.auth.default_org_id.clone(),
            config.auth.default_project_id.clone(),
        ));

        let license_cache = Arc::new(LicenseCache::new(config.cache_ttl()));
        let shutdown = CancellationToken::new();
        let sweeper = license_cache.spawn_sweeper(config.sweep_interval(), shutdown.clone());

        let authorizer = Arc::new(
            ToolAuthorizer::new(
                license_cache.clone(),
                lookup,
                Arc::new(ModuleRegistry::default()),
                Arc::new(index),
            )
            .with_scope_resolver(resolver.clone())
            .with_max_body_bytes(config.mcp.max_body_bytes),
        );

        let state = AppState {
            registry: Arc::new(registry),
            license_cache,
        };
        let router = build_router(state.clone(), resolver, authorizer, &config.mcp);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, mcp_path = %config.mcp.path, "Listening");

        Ok(Self {
            port,
            listener,
            router,
            state,
            shutdown,
            sweeper,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Cancelling this token stops the server and the cache sweeper.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until `signal` resolves or the shutdown token is cancelled.
    pub async fn run_until_stopped<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.clone();
        let result = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = signal => {},
                    _ = token.cancelled() => {},
                }
            })
            .await;

        self.shutdown.cancel();
        if let Err(e) = self.sweeper.await {
            tracing::warn!("License cache sweeper did not stop cleanly: {}", e);
        }

        result
    }
}
