//! Observability HTTP server.
//!
//! A long-lived worker next to the reconcile loop. Failing to bind the
//! port is logged and otherwise ignored; the agent keeps reconciling
//! without its metrics endpoint.

use std::net::SocketAddr;

use axum::{Router, extract::State, routing::get};
use tracing::{info, warn};

use crate::counters::Counters;

pub async fn serve_metrics(port: u16, counters: Counters) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(counters);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(port, error = %e, "metrics listener failed to bind; continuing without it");
            return;
        }
    };

    info!(port, "metrics server listening");
    if let Err(e) = axum::serve(listener, app).await {
        warn!(error = %e, "metrics server terminated");
    }
}

async fn metrics_handler(State(counters): State<Counters>) -> String {
    counters.snapshot().to_prometheus()
}

async fn healthz_handler() -> &'static str {
    "ok"
}
