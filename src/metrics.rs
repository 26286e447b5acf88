//! Prometheus metrics for the executor, plus the `/metrics` listener.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, extract::State, routing::get};
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder, exponential_buckets,
    histogram_opts, opts,
};
use tokio::net::TcpListener;

pub struct Metrics {
    pub registry: Registry,
    pub flow_executions_total: IntCounterVec,
    pub node_execution_duration_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let flow_executions_total = IntCounterVec::new(
            opts!(
                "flow_executions_total",
                "Total number of flow executions by final status"
            ),
            &["flow_id", "status"],
        )
        .expect("metric can be created");

        let node_execution_duration_seconds = HistogramVec::new(
            histogram_opts!(
                "node_execution_duration_seconds",
                "Node handler execution duration in seconds",
                exponential_buckets(0.005, 2.0, 12).unwrap()
            ),
            &["node_id", "hoop"],
        )
        .expect("metric can be created");

        registry
            .register(Box::new(flow_executions_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(node_execution_duration_seconds.clone()))
            .expect("metric can be registered");

        Self {
            registry,
            flow_executions_total,
            node_execution_duration_seconds,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve `GET /metrics` until the process exits.
pub async fn serve(metrics: Arc<Metrics>, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    tracing::info!(addr = %addr, "Serving metrics");

    axum::serve(listener, app)
        .await
        .context("metrics server failed")
}

async fn render_metrics(State(metrics): State<Arc<Metrics>>) -> String {
    let families = metrics.registry.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
