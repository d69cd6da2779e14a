use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_server::{config, ChatServer, ServerConfig};
use parley_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    let mut cfg = ServerConfig::from_env();

    // Single positional argument overrides the port; bad values fall back.
    if let Some(arg) = std::env::args().nth(1) {
        match config::port_from_arg(&arg) {
            Some(port) => cfg.port = port,
            None => tracing::warn!(value = %arg, "invalid port argument, using port {}", cfg.port),
        }
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.port,
        max_clients = cfg.max_clients,
        db_path = %cfg.db_path.display(),
        "starting parley server"
    );

    let store = Arc::new(Store::open(&cfg.db_path)?);
    let server = ChatServer::bind(cfg, store).await?;
    let handle = server.handle();

    let mut server_task = tokio::spawn(server.run());

    tokio::select! {
        result = &mut server_task => result??,
        _ = shutdown_signal() => {
            info!("received shutdown signal");
            handle.shutdown();
            server_task.await??;
        }
    }

    info!("server stopped");
    Ok(())
}

/// Resolves on SIGINT or, where available, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
