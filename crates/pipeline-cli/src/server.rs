// crates/pipeline-cli/src/server.rs
// ============================================================================
// Module: Status and Health Server
// Description: Minimal HTTP surface exposing kill-switch status and health
//              checks to operators and load balancers.
// Purpose: Give external systems a way to observe kill-switch state without
//          depending on the event bus.
// Dependencies: axum, pipeline-core, pipeline-killswitch, pipeline-store
// ============================================================================

//! ## Overview
//! Three routes are served: `/healthz` (always healthy once the process is
//! up), `/readyz` (ready once the execution store has been opened), and
//! `/killswitch/status` (the global kill-switch activation, plus every
//! active repository- and execution-scoped switch).

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use pipeline_core::identifiers::ExecutionId;
use pipeline_core::identifiers::RepositoryId;
use pipeline_core::killswitch::KillSwitchReason;
use pipeline_core::time::Timestamp;
use pipeline_killswitch::KillSwitchService;
use pipeline_store::ExecutionStore;
use serde::Serialize;

/// Shared state handed to every route handler.
#[derive(Clone)]
struct AppState {
    store: Arc<dyn ExecutionStore>,
    kill_switch: Arc<KillSwitchService>,
}

/// Response body for `/healthz` and `/readyz`.
#[derive(Debug, Serialize)]
struct HealthResponse {
    /// `"healthy"` for `/healthz`, `"ready"` for `/readyz`.
    status: &'static str,
    /// Name of the reporting service.
    service: &'static str,
}

/// Name reported in health-check bodies.
const SERVICE_NAME: &str = "pipeline";

/// One execution-scoped kill switch, as reported by `/killswitch/status`.
#[derive(Debug, Serialize)]
struct FeatureSwitchStatus {
    /// Always `true`; inactive executions are absent from the map.
    active: bool,
    /// Why this execution's switch was activated.
    reason: KillSwitchReason,
    /// When the switch was activated.
    activated_at: Timestamp,
    /// Identity that activated the switch.
    activated_by: String,
}

/// Response body for `/killswitch/status`.
#[derive(Debug, Serialize)]
struct KillSwitchStatusResponse {
    /// Whether the global scope is currently active.
    global_active: bool,
    /// Why the global scope was activated, when `global_active` is true.
    global_reason: Option<KillSwitchReason>,
    /// Every repository with an active switch, mapped to `true`.
    repository_switches: HashMap<RepositoryId, bool>,
    /// Every execution with an active switch and its activation details.
    feature_switches: HashMap<ExecutionId, FeatureSwitchStatus>,
}

/// Serves the status and health HTTP surface on `bind_address` until the
/// process receives a shutdown signal.
pub async fn serve(
    bind_address: &str,
    store: Arc<dyn ExecutionStore>,
    kill_switch: Arc<KillSwitchService>,
) -> Result<(), std::io::Error> {
    let state = AppState { store, kill_switch };
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/killswitch/status", get(killswitch_status))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    axum::serve(listener, app).await
}

/// Liveness probe: always reports healthy once the process is running.
async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", service: SERVICE_NAME })
}

/// Readiness probe: reports ready once a placeholder query against the
/// execution store succeeds.
async fn readyz(State(state): State<AppState>) -> Result<Json<HealthResponse>, StatusCode> {
    match state.store.get(&ExecutionId::new("__readiness_probe__")).await {
        Ok(_) | Err(pipeline_store::StoreError::NotFound(_)) => {
            Ok(Json(HealthResponse { status: "ready", service: SERVICE_NAME }))
        }
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

/// Reports the current global, repository, and execution kill-switch
/// status.
async fn killswitch_status(State(state): State<AppState>) -> Result<Json<KillSwitchStatusResponse>, StatusCode> {
    let snapshot = state.kill_switch.scope_snapshot().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let repository_switches =
        snapshot.repository_active.keys().map(|repository_id| (repository_id.clone(), true)).collect();
    let feature_switches = snapshot
        .execution_active
        .into_iter()
        .map(|(execution_id, record)| {
            (
                execution_id,
                FeatureSwitchStatus {
                    active: record.active,
                    reason: record.reason,
                    activated_at: record.recorded_at,
                    activated_by: record.actor,
                },
            )
        })
        .collect();

    Ok(Json(KillSwitchStatusResponse {
        global_active: snapshot.global.is_some(),
        global_reason: snapshot.global.map(|record| record.reason),
        repository_switches,
        feature_switches,
    }))
}
