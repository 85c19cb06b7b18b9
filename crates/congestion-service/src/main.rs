use anyhow::Result;
use congestion_service::{
    api,
    config::{CongestionServiceConfig, SinkKind},
    sink::{JsonlResultSink, MemoryResultSink, ResultSink},
    CongestionServiceState,
};
use std::sync::Arc;
use telemetry::LogConfig;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment
    let config = CongestionServiceConfig::from_env()?;

    let _log_guard = telemetry::init_structured_logging(
        LogConfig::new("congestion-service").with_node_id(config.node_id.clone()),
    );

    info!("Starting congestion service...");
    info!(
        "Congestion service configuration: bind={}, node_id={}, sink={:?}",
        config.bind_addr, config.node_id, config.sink
    );

    let sink: Arc<dyn ResultSink> = match &config.sink {
        SinkKind::Memory => Arc::new(MemoryResultSink::new(config.sink_capacity)),
        SinkKind::Jsonl(path) => {
            info!("Writing lane results to {}", path.display());
            Arc::new(JsonlResultSink::open(path, config.sink_capacity).await?)
        }
    };

    let state = CongestionServiceState::new(config.node_id.clone(), sink);

    // Build HTTP router
    let app = api::router(state.clone());

    // Bind and serve
    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Congestion service listening on {}", config.bind_addr);

    // Run with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: CongestionServiceState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
    state.shutdown().await;
}
