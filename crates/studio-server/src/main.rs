//! # studio-signaling-server
//!
//! Binary entry point: loads configuration, wires up the shared signaling
//! state, and serves the HTTP + WebSocket router on a single listener until
//! asked to shut down.

use std::net::SocketAddr;
use std::time::Duration;

use studio_signaling::state;

/// How long to wait for in-flight connections to drain after a shutdown
/// signal before forcing the process to exit. spec.md §4.1 requires the
/// shutdown sequence to wait "up to a bounded grace period... then exits" —
/// a single stuck writer task must not be able to hang the process forever.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = studio_common::config::init()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.filter.clone())),
        )
        .with_target(true)
        .init();

    tracing::info!(
        station = %config.station.name,
        version = env!("CARGO_PKG_VERSION"),
        ice_servers = config.station.ice.stun.len() + config.station.ice.turn.len(),
        sink_mountpoint = %config.sink.mountpoint,
        "starting studio signaling server"
    );

    let shared_state = state::new_shared(config.limits.clone());
    let router = studio_signaling::build_router(shared_state.clone());

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    // A signal watcher trips `shared_state.shutdown` (what every open
    // connection in `session::handle_connection` is watching) the moment
    // Ctrl-C or SIGTERM arrives, independent of whether the server has
    // finished draining yet.
    let signal_state = shared_state.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        signal_state.shutdown.cancel();
    });

    let serve_state = shared_state.clone();
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { serve_state.shutdown.cancelled().await })
            .await
    });

    tokio::select! {
        result = &mut server_task => {
            result.map_err(|e| anyhow::anyhow!("server task panicked: {e}"))??;
            tracing::info!("server stopped");
            return Ok(());
        }
        _ = shared_state.shutdown.cancelled() => {
            tracing::info!(
                grace_period_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
                "shutdown requested, waiting for connections to drain"
            );
        }
    }

    match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, &mut server_task).await {
        Ok(Ok(Ok(()))) => {
            tracing::info!("server stopped");
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e.into()),
        Ok(Err(join_err)) => Err(anyhow::anyhow!("server task panicked: {join_err}")),
        Err(_) => {
            tracing::error!(
                grace_period_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
                "graceful shutdown grace period elapsed with connections still draining, forcing exit"
            );
            std::process::exit(1);
        }
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM — whichever arrives first.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
