//! HTTP server answering liveness checks on `/` and `/health`.

use crate::config::HealthConfig;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::watch;

use std::net::SocketAddr;

/// A running health server.
#[derive(Debug)]
pub struct HealthServerHandle {
    /// Address actually bound (differs from the config when port 0 is used).
    pub local_addr: SocketAddr,
    pub task: tokio::task::JoinHandle<()>,
}

/// Spawn the health server as a background tokio task.
///
/// The server shuts down when `shutdown_rx` signals true.
pub async fn start_health_server(
    config: &HealthConfig,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<HealthServerHandle> {
    let raw_bind = config.bind.trim_start_matches('[').trim_end_matches(']');
    let bind_str = if raw_bind.contains(':') {
        format!("[{}]:{}", raw_bind, config.port)
    } else {
        format!("{}:{}", raw_bind, config.port)
    };
    let bind: SocketAddr = bind_str.parse().map_err(|error| {
        anyhow::anyhow!("invalid health bind address '{}': {}", bind_str, error)
    })?;

    let app = router();

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|error| anyhow::anyhow!("failed to bind health server to {}: {}", bind, error))?;
    let local_addr = listener.local_addr()?;

    tracing::info!(address = %local_addr, "health server started");

    let task = tokio::spawn(async move {
        let mut shutdown_rx = shutdown_rx;
        let shutdown_signal = async move {
            let _ = shutdown_rx.wait_for(|shutdown| *shutdown).await;
        };

        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!(%error, "health server failed");
        }
    });

    Ok(HealthServerHandle { local_addr, task })
}

fn router() -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "text/plain")], "OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> HealthConfig {
        HealthConfig {
            enabled: true,
            bind: "127.0.0.1".into(),
            port: 0,
        }
    }

    #[tokio::test]
    async fn root_and_health_answer_ok() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = start_health_server(&loopback(), shutdown_rx)
            .await
            .expect("server should start");

        for path in ["/", "/health"] {
            let response = reqwest::get(format!("http://{}{path}", server.local_addr))
                .await
                .expect("request should succeed");
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            assert_eq!(response.text().await.expect("body"), "OK");
        }

        shutdown_tx.send(true).expect("signal shutdown");
        server.task.await.expect("server task should finish");
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = start_health_server(&loopback(), shutdown_rx)
            .await
            .expect("server should start");

        let response = reqwest::get(format!("http://{}/metrics", server.local_addr))
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_bind_address_is_rejected() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = HealthConfig {
            bind: "not an address".into(),
            ..loopback()
        };

        let error = start_health_server(&config, shutdown_rx)
            .await
            .expect_err("bad address must fail");
        assert!(error.to_string().contains("invalid health bind address"));
    }
}
