pub mod api;
pub mod config;
pub mod downloader;
pub mod logging;

use tokio::net::TcpListener;

use api::{create_router, AppState};
use config::AppConfig;

/// Serve the API until ctrl-c or SIGTERM
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    if !state.transcoder.is_available().await {
        tracing::warn!(
            transcoder = state.transcoder.name(),
            "transcoder not found, conversions will fail until it is installed"
        );
    }

    let addr = config.server.addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}
