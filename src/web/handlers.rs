//! HTTP request handlers for the dashboard page and the JSON API.

use super::render::{render_index, IndexCtx};
use super::{read_prefs, AppState};
use crate::db::{DbError, FolderInput, NodeInput, validate_name};
use crate::probe::{probe_target, probe_targets, Target, INACTIVE_REASON};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Map a store error to an HTTP response, naming the missing entity.
fn db_error(e: DbError, what: &str) -> Response {
    match e {
        DbError::NotFound => (StatusCode::NOT_FOUND, format!("{} not found", what)).into_response(),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub folder_id: Option<i64>,
    pub node_id: Option<i64>,
}

pub async fn handle_index(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let folders = state.store.get_tree().unwrap_or_default();
    let prefs = read_prefs(&headers, &state.config);

    let selected_node = query
        .node_id
        .and_then(|id| folders.iter().flat_map(|f| f.nodes.iter()).find(|n| n.id == id))
        .cloned();
    let selected_folder_id = selected_node
        .as_ref()
        .map(|n| n.folder_id)
        .or(query.folder_id);
    let selected_folder = selected_folder_id
        .and_then(|id| folders.iter().find(|f| f.id == id))
        .cloned();

    let ctx = IndexCtx {
        folders: &folders,
        selected_folder: selected_folder.as_ref(),
        selected_node: selected_node.as_ref(),
        test_results: None,
        chart: None,
        prefs: &prefs,
        runs: 1,
    };
    Html(render_index(&ctx))
}

// ============================================================================
// API: Folders
// ============================================================================

pub async fn handle_get_tree(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_tree() {
        Ok(folders) => Json(json!({ "folders": folders })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_create_folder(
    State(state): State<AppState>,
    Json(req): Json<FolderInput>,
) -> impl IntoResponse {
    let name = match validate_name(&req.name) {
        Ok(name) => name,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    match state.store.add_folder(&name) {
        Ok(folder) => Json(folder).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_rename_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<FolderInput>,
) -> impl IntoResponse {
    let name = match validate_name(&req.name) {
        Ok(name) => name,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    match state.store.rename_folder(id, &name) {
        Ok(folder) => Json(folder).into_response(),
        Err(e) => db_error(e, "Folder"),
    }
}

pub async fn handle_delete_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.delete_folder(id) {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => db_error(e, "Folder"),
    }
}

// ============================================================================
// API: Nodes
// ============================================================================

pub async fn handle_create_node(
    State(state): State<AppState>,
    Path(folder_id): Path<i64>,
    Json(req): Json<NodeInput>,
) -> impl IntoResponse {
    let input = match req.validated() {
        Ok(input) => input,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    match state.store.add_node(folder_id, &input) {
        Ok(node) => Json(node).into_response(),
        Err(e) => db_error(e, "Folder"),
    }
}

pub async fn handle_update_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<NodeInput>,
) -> impl IntoResponse {
    let input = match req.validated() {
        Ok(input) => input,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    match state.store.update_node(id, &input) {
        Ok(node) => Json(node).into_response(),
        Err(e) => db_error(e, "Node"),
    }
}

pub async fn handle_delete_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.delete_node(id) {
        Ok(_) => Json(json!({ "ok": true })).into_response(),
        Err(e) => db_error(e, "Node"),
    }
}

// ============================================================================
// API: Probing
// ============================================================================

pub async fn handle_test_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let node = match state.store.get_node(id) {
        Ok(node) => node,
        Err(e) => return db_error(e, "Node"),
    };

    if !node.active {
        return Json(json!({
            "id": id,
            "active": false,
            "tested": false,
            "reason": INACTIVE_REASON,
        }))
        .into_response();
    }

    let prefs = read_prefs(&headers, &state.config);
    let timeout = Duration::from_secs(prefs.timeout_secs);
    let report = probe_target(&state.prober, &Target::from(&node), timeout).await;
    Json(report).into_response()
}

pub async fn handle_test_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let folder = match state.store.get_folder(id) {
        Ok(folder) => folder,
        Err(e) => return db_error(e, "Folder"),
    };

    let prefs = read_prefs(&headers, &state.config);
    let timeout = Duration::from_secs(prefs.timeout_secs);
    let targets: Vec<Target> = folder.nodes.iter().map(Target::from).collect();
    let results = probe_targets(&state.prober, &targets, timeout).await;

    Json(json!({ "folder_id": id, "results": results })).into_response()
}

// ============================================================================
// Misc
// ============================================================================

pub async fn handle_healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn handle_favicon() -> impl IntoResponse {
    // Simple SVG favicon: a pulse line in a circle
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
        <circle cx="50" cy="50" r="45" fill="#198754"/>
        <path d="M15 50 L35 50 L45 30 L55 70 L65 50 L85 50" stroke="white" stroke-width="6" fill="none"/>
    </svg>"##;

    (
        [(axum::http::header::CONTENT_TYPE, "image/svg+xml")],
        svg,
    )
}
