//! HTTP API for the tracker daemon.
//!
//! Administrative endpoints:
//! - Health check
//! - Status (connection state and actions)
//! - Action and modifier type metadata
//! - Action lifecycle (start, stop, pause, resume)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::action::{ActionDescriptor, ActionRegistry, ActionState};
use crate::action_runtime::{ActionRuntime, ActionSummary};
use crate::connection::{ConnectionHandle, ConnectionState};
use crate::error::DaemonError;
use crate::modifier::{ModifierDescriptor, ModifierRegistry};

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState {
    pub connection: ConnectionHandle,
    pub runtime: Arc<ActionRuntime>,
    pub actions: Arc<ActionRegistry>,
    pub modifiers: Arc<ModifierRegistry>,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connection: ConnectionState,
    pub instance_uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<i64>,
    pub actions: Vec<ActionSummary>,
    pub modifiers: Vec<String>,
}

/// Result of a lifecycle request.
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub uuid: Uuid,
    pub state: ActionState,
    pub applied: bool,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/actions/types", get(action_types_handler))
        .route("/modifiers/types", get(modifier_types_handler))
        .route("/actions/:uuid/:operation", post(lifecycle_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Connection state and every action.
async fn status_handler(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connection: state.connection.state(),
        instance_uuid: state.connection.instance_uuid(),
        schema_version: state.connection.startup_schema_version(),
        actions: state.runtime.summaries().await,
        modifiers: state.runtime.pipeline().describe(),
    })
}

/// Metadata of every action type.
async fn action_types_handler(State(state): State<Arc<ApiState>>) -> Json<Vec<ActionDescriptor>> {
    Json(state.actions.descriptors())
}

/// Metadata of every modifier type.
async fn modifier_types_handler(State(state): State<Arc<ApiState>>) -> Json<Vec<ModifierDescriptor>> {
    Json(state.modifiers.descriptors())
}

/// Start, stop, pause or resume an action.
async fn lifecycle_handler(
    State(state): State<Arc<ApiState>>,
    Path((uuid, operation)): Path<(Uuid, String)>,
) -> Result<Json<LifecycleResponse>, ApiError> {
    let runtime = &state.runtime;
    let transition = match operation.as_str() {
        "start" => runtime.start(uuid).await,
        "stop" => runtime.stop(uuid).await,
        "pause" => runtime.pause(uuid).await,
        "resume" => runtime.resume(uuid).await,
        other => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!(
                        "Invalid operation: {}. Expected: start, stop, pause, resume",
                        other
                    ),
                }),
            ))
        },
    }
    .map_err(to_error_response)?;

    info!(action_uuid = %uuid, %operation, state = %transition.state, applied = transition.applied, "Lifecycle request");
    Ok(Json(LifecycleResponse {
        uuid,
        state: transition.state,
        applied: transition.applied,
    }))
}

// =============================================================================
// Helpers
// =============================================================================

fn to_error_response(error: DaemonError) -> ApiError {
    let status = match &error {
        DaemonError::ActionNotFound(_) => StatusCode::NOT_FOUND,
        DaemonError::Lifecycle(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// =============================================================================
// Tests
// =============================================================================
