//! Status endpoint: `GET /metrics` and `GET /health`.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::broadcast;

use rosterlink_engine::VerificationLedger;

use crate::{BridgeMetrics, NodeError};

/// Outcome of the most recent reconciliation cycle.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CycleSummary {
    pub cycle: u64,
    /// Unix seconds when the cycle finished.
    pub finished_at: u64,
    pub ok: bool,
    pub removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared record of the last cycle, written by the scheduler.
#[derive(Default)]
pub struct BridgeStatus {
    last_cycle: RwLock<Option<CycleSummary>>,
}

impl BridgeStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, cycle: u64, removed: usize) {
        self.store(CycleSummary {
            cycle,
            finished_at: unix_now(),
            ok: true,
            removed,
            error: None,
        });
    }

    pub fn record_failure(&self, cycle: u64, error: String) {
        self.store(CycleSummary {
            cycle,
            finished_at: unix_now(),
            ok: false,
            removed: 0,
            error: Some(error),
        });
    }

    pub fn last_cycle(&self) -> Option<CycleSummary> {
        self.last_cycle
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store(&self, summary: CycleSummary) {
        *self
            .last_cycle
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(summary);
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub mappings: usize,
    pub last_cycle: Option<CycleSummary>,
}

/// State shared by the status handlers.
#[derive(Clone)]
pub struct StatusState {
    pub metrics: Arc<BridgeMetrics>,
    pub ledger: Arc<VerificationLedger>,
    pub status: Arc<BridgeStatus>,
}

impl StatusState {
    pub fn health(&self) -> HealthReport {
        let last_cycle = self.status.last_cycle();
        let status = match &last_cycle {
            None => "starting",
            Some(summary) if summary.ok => "ok",
            Some(_) => "degraded",
        };
        HealthReport {
            status,
            mappings: self.ledger.len(),
            last_cycle,
        }
    }
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<StatusState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}

async fn health_handler(State(state): State<StatusState>) -> Json<HealthReport> {
    Json(state.health())
}

/// Serve the status endpoint until shutdown is signalled.
pub async fn serve(
    port: u16,
    state: StatusState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), NodeError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NodeError::StatusServer(format!("bind {addr}: {e}")))?;
    tracing::info!(%addr, "status server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| NodeError::StatusServer(e.to_string()))
}
