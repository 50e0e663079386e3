//! Fleet and bot API handlers.
//!
//! # Examples
//!
//! Put three bots on a server for an hour:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/fleets \
//!   -H "Content-Type: application/json" \
//!   -d '{"server_id": "a1b2c3d4", "bot_count": 3, "username_prefix": "Bot", "duration": "1h"}'
//! ```
//!
//! Make every bot of the server walk:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/servers/a1b2c3d4/control \
//!   -H "Content-Type: application/json" \
//!   -d '{"action": "walk"}'
//! ```

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fleet_core::{
    BotId, BotRecord, ControlAction, FleetControlReport, FleetError, FleetRequest,
    ServerEndpoint, db::StoreError,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::AppState;
use crate::{logging, metrics};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a fleet error onto a status code and a client-safe message
pub fn error_response(err: &FleetError) -> ApiError {
    let status = match err {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        FleetError::BotNotFound(_) | FleetError::Store(StoreError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        FleetError::AlreadyLive(_) => StatusCode::CONFLICT,
        FleetError::Connect { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.client_message(),
        }),
    )
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message }))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateFleetQuery {
    /// Answer after the whole batch instead of right away
    #[serde(default)]
    pub wait: bool,
}

/// Immediate answer to a fleet request
#[derive(Debug, Serialize)]
pub struct FleetAcceptedResponse {
    pub server_id: String,
    pub usernames: Vec<String>,
    pub endpoint: ServerEndpoint,
    pub estimated_seconds: u64,
}

/// Answer after a finished batch
#[derive(Debug, Serialize)]
pub struct FleetCreatedResponse {
    pub records: Vec<BotRecord>,
    pub endpoint: ServerEndpoint,
    pub connected: u32,
    pub failed: u32,
    pub estimated_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct BotControlResponse {
    pub bot_id: BotId,
    pub action: ControlAction,
    pub applied: bool,
}

#[derive(Debug, Serialize)]
pub struct FleetControlResponse {
    pub server_id: String,
    pub action: ControlAction,
    #[serde(flatten)]
    pub report: FleetControlReport,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteBotQuery {
    /// Also remove the stored record
    #[serde(default)]
    pub purge: bool,
}

fn parse_action(text: &str) -> Result<ControlAction, ApiError> {
    text.parse().map_err(|e| bad_request(format!("{e}")))
}

/// Create a fleet of bots on a server.
///
/// Validates the request and resolves the server endpoint, then spawns the
/// bots one at a time in the background. The response carries the usernames
/// that will be used and the expected duration of the batch.
///
/// # Response
///
/// Returns `202 Accepted`:
/// ```json
/// {
///   "server_id": "a1b2c3d4",
///   "usernames": ["Bot1", "Bot2", "Bot3"],
///   "endpoint": {"host": "mc.example.net", "port": 25565},
///   "estimated_seconds": 18
/// }
/// ```
///
/// With `?wait=true` the handler runs the batch itself and returns
/// `201 Created` with the created records and connect counts.
///
/// # Errors
///
/// - `400 Bad Request`: Bot count outside 1-100, empty prefix, unknown duration
pub async fn create_fleet(
    State(state): State<AppState>,
    Query(query): Query<CreateFleetQuery>,
    Json(request): Json<FleetRequest>,
) -> Result<Response, ApiError> {
    let plan = state
        .fleet
        .plan_fleet(&request)
        .await
        .map_err(|e| error_response(&e))?;

    metrics::fleet_requested(plan.bot_count);
    let estimated_seconds = state.fleet.estimate_spawn_duration(plan.bot_count).as_secs();
    let fleet = state.fleet.clone();

    if query.wait {
        let started = Instant::now();
        let server_id = plan.server_id.clone();
        let creation = fleet.spawn_fleet(plan).await;
        record_outcome(&server_id, creation.connected, creation.failed, started);

        let response = FleetCreatedResponse {
            records: creation.created,
            endpoint: creation.server_endpoint,
            connected: creation.connected,
            failed: creation.failed,
            estimated_seconds,
        };
        return Ok((StatusCode::CREATED, Json(response)).into_response());
    }

    let response = FleetAcceptedResponse {
        server_id: plan.server_id.clone(),
        usernames: plan.usernames(),
        endpoint: plan.endpoint.clone(),
        estimated_seconds,
    };

    tokio::spawn(async move {
        let started = Instant::now();
        let server_id = plan.server_id.clone();
        let creation = fleet.spawn_fleet(plan).await;
        record_outcome(&server_id, creation.connected, creation.failed, started);
    });

    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

fn record_outcome(server_id: &str, connected: u32, failed: u32, started: Instant) {
    metrics::fleet_spawned(connected, failed);
    logging::log_fleet_outcome(
        server_id,
        connected,
        failed,
        started.elapsed().as_millis() as u64,
    );
}

/// List the stored bots of a server, ordered by id.
///
/// # Errors
///
/// - `500 Internal Server Error`: Store error
pub async fn list_bots(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> Result<Json<Vec<BotRecord>>, ApiError> {
    let mut bots = state
        .fleet
        .list_bots(&server_id)
        .await
        .map_err(|e| error_response(&e))?;
    bots.sort_by_key(|bot| bot.id);
    Ok(Json(bots))
}

/// Get the stored record of one bot.
///
/// # Errors
///
/// - `404 Not Found`: No such bot
pub async fn get_bot(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
) -> Result<Json<BotRecord>, ApiError> {
    state
        .fleet
        .get_bot(bot_id)
        .await
        .map(Json)
        .map_err(|e| error_response(&e))
}

/// Apply a control action to one bot.
///
/// Actions: `walk`, `jump`, `strafe-left`, `strafe-right`, `stop`.
///
/// # Errors
///
/// - `400 Bad Request`: Unknown action
/// - `404 Not Found`: Bot not connected or not online
pub async fn control_bot(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<BotControlResponse>, ApiError> {
    let action = parse_action(&request.action)?;

    let result = state.fleet.control_bot(bot_id, action).await;
    metrics::control_commands_total(&action.to_string(), result.is_ok(), 1);
    result.map_err(|e| error_response(&e))?;

    Ok(Json(BotControlResponse {
        bot_id,
        action,
        applied: true,
    }))
}

/// Apply a control action to every online bot of a server.
///
/// Returns how many bots were addressed and how many applied the action.
///
/// # Errors
///
/// - `400 Bad Request`: Unknown action
pub async fn control_fleet(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<FleetControlResponse>, ApiError> {
    let action = parse_action(&request.action)?;

    let report = state.fleet.control_fleet(&server_id, action).await;
    let label = action.to_string();
    metrics::control_commands_total(&label, true, report.succeeded as u64);
    metrics::control_commands_total(&label, false, report.rejected() as u64);

    Ok(Json(FleetControlResponse {
        server_id,
        action,
        report,
    }))
}

/// Disconnect a bot and mark it offline.
///
/// Deleting an offline bot again succeeds. `?purge=true` also removes the
/// stored record.
///
/// # Errors
///
/// - `404 Not Found`: No such bot
pub async fn delete_bot(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
    Query(query): Query<DeleteBotQuery>,
) -> Result<StatusCode, ApiError> {
    let result = if query.purge {
        state.fleet.purge_bot(bot_id).await
    } else {
        state.fleet.delete_bot(bot_id).await
    };
    result.map_err(|e| error_response(&e))?;

    Ok(StatusCode::NO_CONTENT)
}
