use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use region_nav::index::{District, Province, Regency, Statistics};
use region_nav::matching::AmbiguityReport;
use region_nav::{Explorer, LayerDocument, NavError, RegionIndex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::sessions::{run_action, Action, ActionResponse, Snapshot};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/index", get(get_index))
        .route("/api/stats", get(get_stats))
        .route("/api/provinces/{id}", get(get_province))
        .route("/api/provinces/{id}/regencies", get(get_regencies))
        .route(
            "/api/provinces/{id}/regencies/{regency_id}/districts",
            get(get_districts),
        )
        .route("/api/search/{kind}", get(search))
        .route("/api/diagnostics/ambiguous", get(get_ambiguous))
        .route("/data/{*path}", get(get_data))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/actions", post(post_action))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    sessions: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.sessions.len().await,
    })
}

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

async fn get_index(State(state): State<AppState>) -> Json<Arc<RegionIndex>> {
    Json(state.index.clone())
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: Statistics,
    last_updated: String,
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        stats: state.index.statistics(),
        last_updated: state.loaded_at.to_rfc3339(),
    })
}

async fn get_province(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Province>, ApiError> {
    state
        .index
        .find_province_by_id(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Province not found"))
}

async fn get_regencies(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Regency>>, ApiError> {
    if !state.index.province_exists(&id) {
        return Err(error_response(StatusCode::NOT_FOUND, "Province not found"));
    }
    Ok(Json(state.index.regencies_of(&id).to_vec()))
}

async fn get_districts(
    State(state): State<AppState>,
    Path((id, regency_id)): Path<(String, String)>,
) -> Result<Json<Vec<District>>, ApiError> {
    if state.index.find_regency(&id, &regency_id).is_none() {
        return Err(error_response(StatusCode::NOT_FOUND, "Regency not found"));
    }
    Ok(Json(state.index.districts_of(&id, &regency_id).to_vec()))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn search(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let q = params.q.trim();
    if q.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Missing query"));
    }
    let json = match kind.as_str() {
        "provinces" => serde_json::to_value(state.index.search_provinces(q)),
        "regencies" => serde_json::to_value(state.index.search_regencies(q)),
        "districts" => serde_json::to_value(state.index.search_districts(q)),
        _ => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Search kind must be provinces, regencies or districts",
            ))
        }
    }
    .map_err(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "JSON serialization failed"))?;
    Ok(Json(json))
}

async fn get_ambiguous(State(state): State<AppState>) -> Json<Vec<AmbiguityReport>> {
    Json(state.observer.reports())
}

/// Raw boundary datasets, with a content-hash ETag.
async fn get_data(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.store.get_object(&path).await.map_err(|e| {
        tracing::debug!("Dataset {path} unavailable: {e}");
        error_response(StatusCode::NOT_FOUND, "Dataset not found")
    })?;
    let etag = format!("\"{}\"", hex::encode(Sha256::digest(&bytes)));
    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag);
    let content_type = if path.ends_with(".geojson") {
        "application/geo+json".to_string()
    } else {
        mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string()
    };
    let headers = [
        (header::CONTENT_TYPE, content_type),
        (header::ETAG, etag),
        (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
    ];
    if not_modified {
        return Ok((StatusCode::NOT_MODIFIED, headers, Vec::new()));
    }
    Ok((StatusCode::OK, headers, bytes))
}

async fn create_session(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let mut explorer = Explorer::new(
        state.index.clone(),
        state.base.clone(),
        LayerDocument::default(),
    )
    .with_matcher(state.matcher.clone())
    .with_metrics(state.metrics.clone())
    .with_palette(state.palette.clone());
    explorer.start().map_err(|e| nav_error_response(&e))?;

    let id = state.sessions.insert(explorer).await;
    tracing::info!("Created session {id}");
    let handle = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| error_response(StatusCode::INTERNAL_SERVER_ERROR, "Session lost"))?;
    let session = handle.lock().await;
    Ok((StatusCode::CREATED, Json(Snapshot::of(id, &session))))
}

fn parse_session_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid session id"))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Snapshot>, ApiError> {
    let id = parse_session_id(&id)?;
    let handle = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Session not found"))?;
    let session = handle.lock().await;
    Ok(Json(Snapshot::of(id, &session)))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&id)?;
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error_response(StatusCode::NOT_FOUND, "Session not found"))
    }
}

async fn post_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(action): Json<Action>,
) -> Result<Json<ActionResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    let handle = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Session not found"))?;
    tracing::debug!("Session {id}: {action:?}");
    match run_action(&state.store, id, &handle, action).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            if e.is_recoverable() {
                tracing::warn!("Session {id}: {e}");
            } else {
                tracing::debug!("Session {id}: {e}");
            }
            Err(nav_error_response(&e))
        }
    }
}

fn nav_status(e: &NavError) -> StatusCode {
    match e {
        NavError::MalformedIndex(_) | NavError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        NavError::SourceUnavailable(_)
        | NavError::Io(_)
        | NavError::GeoJson(_)
        | NavError::InvalidGeometry(_) => StatusCode::BAD_GATEWAY,
        NavError::EmptyResultSet(_) => StatusCode::OK,
        NavError::InvalidTransition(_) | NavError::AmbiguousMatch { .. } => StatusCode::CONFLICT,
        NavError::UnknownEntity(_) => StatusCode::NOT_FOUND,
    }
}

fn nav_error_kind(e: &NavError) -> &'static str {
    match e {
        NavError::MalformedIndex(_) => "malformed_index",
        NavError::SourceUnavailable(_)
        | NavError::Io(_)
        | NavError::GeoJson(_)
        | NavError::InvalidGeometry(_) => "source_unavailable",
        NavError::EmptyResultSet(_) => "empty_result_set",
        NavError::AmbiguousMatch { .. } => "ambiguous_match",
        NavError::InvalidTransition(_) => "invalid_transition",
        NavError::UnknownEntity(_) => "unknown_entity",
        NavError::Json(_) => "internal",
    }
}

fn nav_error_response(e: &NavError) -> ApiError {
    (
        nav_status(e),
        Json(ErrorResponse {
            error: e.to_string(),
            kind: Some(nav_error_kind(e)),
        }),
    )
}

fn error_response(status: StatusCode, msg: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: msg.to_string(),
            kind: None,
        }),
    )
}
