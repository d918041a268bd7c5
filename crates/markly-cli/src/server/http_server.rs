//! HTTP server startup and lifecycle management.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::config::ServerConfig;
use crate::server::{Result, ServerError};
use crate::{TRACING_TARGET_SERVER_SHUTDOWN, TRACING_TARGET_SERVER_STARTUP};

/// Binds the listener and serves `app` until `signal` resolves.
///
/// After the signal the server stops accepting connections and waits up to
/// the configured shutdown timeout for in-flight requests.
pub(crate) async fn serve_with_shutdown<F>(
    app: Router,
    server_config: &ServerConfig,
    signal: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let server_addr = server_config.server_addr();
    let listener = TcpListener::bind(server_addr).await.map_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_SERVER_STARTUP,
            addr = %server_addr,
            error = %err,
            "failed to bind to address"
        );
        ServerError::bind_error(&server_addr.to_string(), err)
    })?;

    tracing::info!(
        target: TRACING_TARGET_SERVER_STARTUP,
        addr = %listener.local_addr().unwrap_or(server_addr),
        "server is ready and listening for connections"
    );

    if server_config.binds_to_all_interfaces() {
        tracing::warn!(
            target: TRACING_TARGET_SERVER_STARTUP,
            "server is bound to all interfaces, ensure firewall rules are configured"
        );
    }

    let start_time = Instant::now();
    let (drain_tx, drain_rx) = oneshot::channel::<()>();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = drain_rx.await;
    })
    .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return finish(result.map_err(ServerError::Runtime), start_time),
        () = signal => {}
    }

    let _ = drain_tx.send(());
    let shutdown_timeout = server_config.shutdown_timeout();
    tracing::info!(
        target: TRACING_TARGET_SERVER_SHUTDOWN,
        timeout_secs = shutdown_timeout.as_secs(),
        "graceful shutdown initiated"
    );

    let result = match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(result) => result.map_err(ServerError::Runtime),
        Err(_) => Err(ServerError::ShutdownTimeout(shutdown_timeout.as_secs())),
    };

    finish(result, start_time)
}

/// Logs the outcome of a server run.
fn finish(result: Result<()>, start_time: Instant) -> Result<()> {
    let uptime_secs = start_time.elapsed().as_secs();

    match &result {
        Ok(()) => tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            uptime_secs,
            "server shut down gracefully"
        ),
        Err(err) => tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %err,
            error_code = err.error_code(),
            uptime_secs,
            "server stopped with an error"
        ),
    }

    result
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use axum::routing::get;

    use super::*;

    fn local_config(port: u16) -> ServerConfig {
        ServerConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            shutdown_timeout: 1,
        }
    }

    #[tokio::test]
    async fn immediate_signal_shuts_down_cleanly() -> anyhow::Result<()> {
        let app = Router::new().route("/health", get(|| async { "OK" }));
        serve_with_shutdown(app, &local_config(0), async {}).await?;
        Ok(())
    }

    #[tokio::test]
    async fn occupied_port_is_a_bind_error() -> anyhow::Result<()> {
        let occupied = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let port = occupied.local_addr()?.port();

        let result = serve_with_shutdown(Router::new(), &local_config(port), async {}).await;
        assert!(matches!(result, Err(ServerError::BindError { .. })));
        Ok(())
    }
}
