use service_core::observability::init_tracing;
use tokio::signal;
use tool_gateway::config::GatewayConfig;
use tool_gateway::services::init_metrics;
use tool_gateway::startup::Application;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::load()?;

    init_tracing(
        "tool-gateway",
        &config.server.log_level,
        config.server.otlp_endpoint.as_deref(),
    )?;
    init_metrics()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = %config.platform.base_url,
        cache_ttl_secs = config.license.cache_ttl_secs,
        fallback_key = config.auth.fallback_api_key.is_some(),
        "Starting tool gateway"
    );

    let app = Application::build(config).await?;
    app.run_until_stopped(shutdown_signal()).await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
