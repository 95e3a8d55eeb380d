//! REST routes: `/health` plus `/api/{kind}` collections.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Extension, Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::auth::{auth_middleware, AuthUser};
use super::storage::{CreateOutcome, StorageError, StoredEntity};
use super::AppState;
use crate::models::EntityKind;

/// Errors returned by API handlers as `{"error", "message"}` JSON.
#[derive(Debug)]
pub enum ApiError {
    UnknownKind(String),
    NotFound { kind: EntityKind, id: String },
    InvalidBody(String),
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::UnknownKind(kind) => (
                StatusCode::NOT_FOUND,
                "unknown_kind",
                format!("Unknown collection '{}'", kind),
            ),
            ApiError::NotFound { kind, id } => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("No {} with id {}", kind, id),
            ),
            ApiError::InvalidBody(message) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_body", message)
            }
            ApiError::Storage(e) => {
                tracing::error!("Storage failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Storage failure".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn parse_kind(segment: &str) -> Result<EntityKind, ApiError> {
    EntityKind::from_path(segment).ok_or_else(|| ApiError::UnknownKind(segment.to_string()))
}

/// Pulls the optional `clientId` out of a write body.
fn take_client_id(body: &mut Map<String, Value>) -> Result<Option<Uuid>, ApiError> {
    match body.remove("clientId") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => Uuid::parse_str(&raw)
            .map(Some)
            .map_err(|_| ApiError::InvalidBody(format!("clientId '{}' is not a UUID", raw))),
        Some(other) => Err(ApiError::InvalidBody(format!(
            "clientId must be a string, got {}",
            other
        ))),
    }
}

async fn list_entities(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<StoredEntity>>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.storage.list(kind)?))
}

async fn create_entity(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(kind): Path<String>,
    Json(mut body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<StoredEntity>), ApiError> {
    let kind = parse_kind(&kind)?;
    let client_id = take_client_id(&mut body)?;

    let (entity, outcome) = state.storage.create(kind, client_id, body)?;
    let status = match outcome {
        CreateOutcome::Created => StatusCode::CREATED,
        CreateOutcome::Existing => StatusCode::OK,
    };
    tracing::info!(caller = %user.name, %kind, id = %entity.id, ?outcome, "create");
    Ok((status, Json(entity)))
}

async fn update_entity(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((kind, id)): Path<(String, String)>,
    Json(mut body): Json<Map<String, Value>>,
) -> Result<Json<StoredEntity>, ApiError> {
    let kind = parse_kind(&kind)?;
    let client_id = take_client_id(&mut body)?;

    let entity = state
        .storage
        .update(kind, &id, client_id, body)?
        .ok_or(ApiError::NotFound { kind, id })?;
    tracing::info!(caller = %user.name, %kind, id = %entity.id, "update");
    Ok(Json(entity))
}

async fn delete_entity(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let kind = parse_kind(&kind)?;
    if !state.storage.delete(kind, &id)? {
        return Err(ApiError::NotFound { kind, id });
    }
    tracing::info!(caller = %user.name, %kind, %id, "delete");
    Ok(StatusCode::NO_CONTENT)
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/{kind}", get(list_entities).post(create_entity))
        .route("/api/{kind}/{id}", put(update_entity).delete(delete_entity))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
