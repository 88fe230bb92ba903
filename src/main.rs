use anyhow::Context;
use avis_poster::config::Config;
use avis_poster::embed::AssetEmbedder;
use avis_poster::server::{self, AppState};
use avis_poster::{ChromeCapture, ImageResolver};
use clap::Parser;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let poster = config.poster_config()?;
    let addr = config.socket_addr()?;

    let resolver = ImageResolver::new(&poster)?;
    let renderer = Arc::new(ChromeCapture::new(poster.clone()));
    let state = Arc::new(AppState {
        template_path: config.template_path(),
        debug_output: config.debug_output_path(),
        embedder: AssetEmbedder::new(config.asset_root.clone()),
        resolver,
        renderer,
        config: poster,
    });

    let app = server::router(state).layer(TraceLayer::new_for_http());
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down");
}
