//! REST endpoints using Axum

use crate::types::*;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use mavtak_bridge::{BridgeContext, BridgeController, CotEncoder, LogLevel, VehicleState};
use mavtak_core::{AppConfig, VehicleId};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tracing::{error, info, warn};

// ============================================================================
// Application State
// ============================================================================

#[derive(Clone)]
pub struct ApiState {
    pub context: Arc<BridgeContext>,
    pub config: Arc<RwLock<AppConfig>>,
    /// Running bridge; `PUT /api/v1/config` needs one to restart
    pub controller: Option<Arc<BridgeController>>,
    pub prometheus: Option<PrometheusHandle>,
    /// Notified when a client asks the bridge to stop
    pub stop: Arc<Notify>,
}

impl ApiState {
    pub fn new(context: Arc<BridgeContext>, config: AppConfig) -> Self {
        Self {
            context,
            config: Arc::new(RwLock::new(config)),
            controller: None,
            prometheus: None,
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn with_controller(mut self, controller: Arc<BridgeController>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

fn vehicle_info(
    config: &AppConfig,
    encoder: &CotEncoder,
    state: VehicleState,
    now: chrono::DateTime<Utc>,
) -> VehicleInfo {
    VehicleInfo {
        uid: encoder.uid_for(state.vehicle_id),
        callsign: encoder.callsign_for(state.vehicle_id).to_string(),
        fix_state: state.fix_state(now, config.bridge.vehicle_expiry()),
        state,
    }
}

// ============================================================================
// Router Setup
// ============================================================================

pub fn create_rest_router(state: ApiState) -> Router {
    Router::new()
        // System endpoints
        .route("/api/v1/health", get(health_check))
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/config", get(get_config).put(update_config))
        .route("/api/v1/messages", get(get_messages))
        .route("/api/v1/stop", post(stop_bridge))
        // Vehicles
        .route("/api/v1/vehicles", get(list_vehicles))
        .route("/api/v1/vehicles/{id}", get(get_vehicle))
        // Metrics
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

// ============================================================================
// System Endpoints
// ============================================================================

/// GET /api/v1/health
async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        running: state.context.status.is_running(),
        timestamp: Utc::now(),
    })
}

/// GET /api/v1/status - counters, uptime, last error and positions
async fn get_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let snapshot = state.context.status.snapshot();
    let (last_error, last_error_at) = match snapshot.last_error {
        Some(record) => (Some(record.message), Some(record.at)),
        None => (None, None),
    };

    Json(StatusResponse {
        running: snapshot.running,
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: snapshot.started_at,
        uptime_seconds: snapshot.uptime_secs,
        tracked_vehicles: state.context.tracker.len(),
        counters: snapshot.counters,
        last_error,
        last_error_at,
        positions: snapshot.positions,
        timestamp: Utc::now(),
    })
}

/// GET /api/v1/config - effective settings
async fn get_config(State(state): State<ApiState>) -> Json<AppConfig> {
    Json(state.config.read().await.clone())
}

/// PUT /api/v1/config - applies new bridge settings and restarts the bridge
async fn update_config(
    State(state): State<ApiState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigUpdateResponse>, ApiError> {
    let controller = state
        .controller
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Bridge is not managed by this API".to_string()))?;

    // Held for the whole restart so concurrent updates apply in order
    let mut config = state.config.write().await;
    let mut settings = config.bridge.clone();
    update.apply(&mut settings);
    settings
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    info!(
        mavlink_port = settings.mavlink_port,
        aircraft = %settings.aircraft_name,
        cot_ip = %settings.cot_ip,
        cot_port = settings.cot_port,
        use_multicast = settings.use_multicast,
        "Reconfiguring bridge through API"
    );

    let listen = controller.restart(settings.clone()).await.map_err(|e| {
        error!(error = %e, "Bridge reconfiguration failed");
        ApiError::Conflict(e.to_string())
    })?;

    config.bridge = settings.clone();
    state.context.status.log(
        LogLevel::Info,
        format!("Bridge reconfigured through API, listening on {listen}"),
    );

    Ok(Json(ConfigUpdateResponse {
        restarted: true,
        listen: listen.to_string(),
        bridge: settings,
    }))
}

/// GET /api/v1/messages - drains the debug log
async fn get_messages(State(state): State<ApiState>) -> Json<MessagesResponse> {
    Json(MessagesResponse {
        messages: state.context.status.drain_log(),
    })
}

/// POST /api/v1/stop - asks the process to shut the bridge down
async fn stop_bridge(State(state): State<ApiState>) -> impl IntoResponse {
    info!("Stop requested through API");
    state
        .context
        .status
        .log(LogLevel::Info, "Stop requested through API");
    state.stop.notify_one();

    (
        StatusCode::ACCEPTED,
        Json(StopResponse {
            stopping: true,
            message: "Bridge shutdown requested".to_string(),
        }),
    )
}

// ============================================================================
// Vehicle Endpoints
// ============================================================================

/// GET /api/v1/vehicles
async fn list_vehicles(State(state): State<ApiState>) -> Json<VehicleList> {
    let now = Utc::now();
    let config = state.config.read().await;
    let encoder = CotEncoder::new(&config.bridge);
    let vehicles: Vec<VehicleInfo> = state
        .context
        .tracker
        .snapshot()
        .into_iter()
        .map(|v| vehicle_info(&config, &encoder, v, now))
        .collect();

    Json(VehicleList {
        total: vehicles.len(),
        vehicles,
    })
}

/// GET /api/v1/vehicles/{id}
async fn get_vehicle(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<VehicleInfo>, ApiError> {
    let vehicle_id: VehicleId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid vehicle id: {}", id)))?;

    let vehicle = state
        .context
        .tracker
        .get(vehicle_id)
        .ok_or_else(|| ApiError::NotFound(format!("Vehicle {} not found", vehicle_id)))?;

    let config = state.config.read().await;
    let encoder = CotEncoder::new(&config.bridge);
    Ok(Json(vehicle_info(&config, &encoder, vehicle, Utc::now())))
}

// ============================================================================
// Metrics
// ============================================================================

/// GET /metrics - Prometheus text exposition
async fn get_metrics(State(state): State<ApiState>) -> Result<String, ApiError> {
    state
        .prometheus
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or_else(|| ApiError::Unavailable("Metrics recorder not installed".to_string()))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Unavailable(msg) => {
                warn!(error = %msg, "API dependency unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg)
            }
        };

        let body = Json(ErrorResponse::new(error_code, message));
        (status, body).into_response()
    }
}
