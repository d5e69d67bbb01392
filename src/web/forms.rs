//! Form-based routes backing the HTML dashboard.
//!
//! All mutations redirect with 303 back to the dashboard, preserving the
//! folder or node focus. Invalid form input redirects back without applying
//! a change rather than rendering an error page.

use super::chart::build_chart;
use super::render::{render_index, IndexCtx};
use super::{read_prefs, AppState};
use crate::db::{DbError, NodeInput};
use crate::probe::{
    probe_rounds, probe_target, summarize, summarize_measurements, Target,
};

use axum::{
    extract::{Path, RawForm, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

/// Maximum repetitions of a folder test in one request.
const MAX_RUNS: u32 = 100;

fn not_found(what: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("{} not found", what)).into_response()
}

fn db_error(e: DbError, what: &str) -> Response {
    match e {
        DbError::NotFound => not_found(what),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}

fn clamp_runs(runs: Option<i64>) -> u32 {
    runs.unwrap_or(1).clamp(1, MAX_RUNS as i64) as u32
}

// ============================================================================
// Folder forms
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct NameForm {
    pub name: String,
}

pub async fn handle_form_add_folder(
    State(state): State<AppState>,
    axum::Form(form): axum::Form<NameForm>,
) -> Response {
    let name = form.name.trim();
    if name.is_empty() {
        return Redirect::to("/").into_response();
    }
    match state.store.add_folder(name) {
        Ok(folder) => Redirect::to(&format!("/?folder_id={}", folder.id)).into_response(),
        Err(e) => db_error(e, "Folder"),
    }
}

pub async fn handle_form_rename_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    axum::Form(form): axum::Form<NameForm>,
) -> Response {
    let name = form.name.trim();
    if name.is_empty() {
        return Redirect::to(&format!("/?folder_id={}", id)).into_response();
    }
    match state.store.rename_folder(id, name) {
        Ok(_) => Redirect::to(&format!("/?folder_id={}", id)).into_response(),
        Err(e) => db_error(e, "Folder"),
    }
}

pub async fn handle_form_delete_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    match state.store.delete_folder(id) {
        Ok(()) => Redirect::to("/").into_response(),
        Err(e) => db_error(e, "Folder"),
    }
}

pub async fn handle_form_duplicate_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    match state.store.duplicate_folder(id) {
        Ok(copy) => Redirect::to(&format!("/?folder_id={}", copy.id)).into_response(),
        Err(e) => db_error(e, "Folder"),
    }
}

// ============================================================================
// Node forms
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AddNodeForm {
    pub folder_id: i64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub comment: String,
    // HTML checkbox: present when checked
    pub active: Option<String>,
}

pub async fn handle_form_add_node(
    State(state): State<AppState>,
    axum::Form(form): axum::Form<AddNodeForm>,
) -> Response {
    let back = format!("/?folder_id={}", form.folder_id);
    let input = NodeInput {
        name: form.name,
        url: form.url,
        comment: form.comment,
        active: form.active.is_some(),
    };
    let input = match input.validated() {
        Ok(input) => input,
        Err(_) => return Redirect::to(&back).into_response(),
    };
    match state.store.add_node(form.folder_id, &input) {
        Ok(_) => Redirect::to(&back).into_response(),
        Err(e) => db_error(e, "Folder"),
    }
}

#[derive(Debug, Deserialize)]
pub struct EditNodeForm {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub comment: String,
    pub active: Option<String>,
}

pub async fn handle_form_edit_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    axum::Form(form): axum::Form<EditNodeForm>,
) -> Response {
    if state.store.get_node(id).is_err() {
        return not_found("Node");
    }
    let back = format!("/?node_id={}", id);
    let input = NodeInput {
        name: form.name,
        url: form.url,
        comment: form.comment,
        active: form.active.is_some(),
    };
    let input = match input.validated() {
        Ok(input) => input,
        Err(_) => return Redirect::to(&back).into_response(),
    };
    match state.store.update_node(id, &input) {
        Ok(_) => Redirect::to(&back).into_response(),
        Err(e) => db_error(e, "Node"),
    }
}

pub async fn handle_form_delete_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    match state.store.delete_node(id) {
        Ok(folder_id) => Redirect::to(&format!("/?folder_id={}", folder_id)).into_response(),
        Err(e) => db_error(e, "Node"),
    }
}

#[derive(Debug, Deserialize)]
pub struct DuplicateNodeForm {
    pub keep_folder_context: Option<String>,
}

pub async fn handle_form_duplicate_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    axum::Form(form): axum::Form<DuplicateNodeForm>,
) -> Response {
    match state.store.duplicate_node(id) {
        Ok(copy) => {
            let target = if form.keep_folder_context.is_some() {
                format!("/?folder_id={}", copy.folder_id)
            } else {
                format!("/?node_id={}", copy.id)
            };
            Redirect::to(&target).into_response()
        }
        Err(e) => db_error(e, "Node"),
    }
}

pub async fn handle_form_toggle_active(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let node = match state.store.toggle_node_active(id) {
        Ok(node) => node,
        Err(e) => return db_error(e, "Node"),
    };

    // Preserve the current selection when the referer carries one; never
    // redirect back to a POST-only test page.
    let mut target = format!("/?folder_id={}", node.folder_id);
    if let Some(selection) = referer_url(&headers)
        .filter(|u| !u.path().ends_with("/test/html"))
        .and_then(|u| selection_from_query(&u))
    {
        target = selection;
    }
    Redirect::to(&target).into_response()
}

pub async fn handle_form_bulk_delete(
    State(state): State<AppState>,
    RawForm(body): RawForm,
) -> Response {
    let pairs = parse_form_pairs(&String::from_utf8_lossy(&body));
    let folder_id = form_value(&pairs, "folder_id").and_then(|v| v.parse::<i64>().ok());

    if form_value(&pairs, "delete_all_in_folder").is_some() {
        if let Some(folder_id) = folder_id {
            return match state.store.clear_folder(folder_id) {
                Ok(()) => Redirect::to(&format!("/?folder_id={}", folder_id)).into_response(),
                Err(e) => db_error(e, "Folder"),
            };
        }
    }

    let ids = collect_node_ids(&pairs);
    if !ids.is_empty() {
        if let Err(e) = state.store.delete_nodes(&ids) {
            return db_error(e, "Node");
        }
    }

    let target = match folder_id {
        Some(id) => format!("/?folder_id={}", id),
        None => "/".to_string(),
    };
    Redirect::to(&target).into_response()
}

// ============================================================================
// Test forms (HTML results)
// ============================================================================

pub async fn handle_form_test_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    axum::Form(form): axum::Form<DuplicateNodeForm>,
) -> Response {
    let node = match state.store.get_node(id) {
        Ok(node) => node,
        Err(e) => return db_error(e, "Node"),
    };

    let prefs = read_prefs(&headers, &state.config);
    let timeout = Duration::from_secs(prefs.timeout_secs);
    let report = probe_target(&state.prober, &Target::from(&node), timeout)
        .await
        .with_single_run_stats();

    let folders = state.store.get_tree().unwrap_or_default();
    let selected_folder = folders.iter().find(|f| f.id == node.folder_id).cloned();
    let selected_node = if form.keep_folder_context.is_some() {
        None
    } else {
        Some(node)
    };

    let results = vec![report];
    let chart = build_chart(&summarize(&results));
    let ctx = IndexCtx {
        folders: &folders,
        selected_folder: selected_folder.as_ref(),
        selected_node: selected_node.as_ref(),
        test_results: Some(&results),
        chart: Some(&chart),
        prefs: &prefs,
        runs: 1,
    };
    Html(render_index(&ctx)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct RunsForm {
    pub runs: Option<i64>,
}

pub async fn handle_form_test_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    axum::Form(form): axum::Form<RunsForm>,
) -> Response {
    let folder = match state.store.get_folder(id) {
        Ok(folder) => folder,
        Err(e) => return db_error(e, "Folder"),
    };

    let prefs = read_prefs(&headers, &state.config);
    let timeout = Duration::from_secs(prefs.timeout_secs);
    let runs = clamp_runs(form.runs);

    let targets: Vec<Target> = folder.nodes.iter().map(Target::from).collect();
    let (results, measurements) =
        probe_rounds(&state.prober, &targets, timeout, runs).await;

    // Chart over every measurement across runs when there are any, so
    // repeated tests show all samples; skipped-only folders chart the rows.
    let summary = if measurements.is_empty() {
        summarize(&results)
    } else {
        summarize_measurements(&measurements)
    };
    let chart = build_chart(&summary);

    let folders = state.store.get_tree().unwrap_or_default();
    let ctx = IndexCtx {
        folders: &folders,
        selected_folder: Some(&folder),
        selected_node: None,
        test_results: Some(&results),
        chart: Some(&chart),
        prefs: &prefs,
        runs,
    };
    Html(render_index(&ctx)).into_response()
}

pub async fn handle_form_test_selected(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    RawForm(body): RawForm,
) -> Response {
    let folder = match state.store.get_folder(id) {
        Ok(folder) => folder,
        Err(e) => return db_error(e, "Folder"),
    };

    let pairs = parse_form_pairs(&String::from_utf8_lossy(&body));
    let selected = collect_node_ids(&pairs);
    // Folder order filtered down to the selection
    let targets: Vec<Target> = folder
        .nodes
        .iter()
        .filter(|n| selected.contains(&n.id))
        .map(Target::from)
        .collect();
    if targets.is_empty() {
        return Redirect::to(&format!("/?folder_id={}", id)).into_response();
    }

    let prefs = read_prefs(&headers, &state.config);
    let timeout = Duration::from_secs(prefs.timeout_secs);
    let runs = clamp_runs(
        form_value(&pairs, "runs").and_then(|v| v.parse::<i64>().ok()),
    );

    let (results, measurements) =
        probe_rounds(&state.prober, &targets, timeout, runs).await;
    let summary = if measurements.is_empty() {
        summarize(&results)
    } else {
        summarize_measurements(&measurements)
    };
    let chart = build_chart(&summary);

    let folders = state.store.get_tree().unwrap_or_default();
    let ctx = IndexCtx {
        folders: &folders,
        selected_folder: Some(&folder),
        selected_node: None,
        test_results: Some(&results),
        chart: Some(&chart),
        prefs: &prefs,
        runs,
    };
    Html(render_index(&ctx)).into_response()
}

// ============================================================================
// Preferences
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PreferencesForm {
    pub dark_mode: Option<String>,
    pub timeout_seconds: Option<i64>,
}

pub async fn handle_set_preferences(
    headers: HeaderMap,
    axum::Form(form): axum::Form<PreferencesForm>,
) -> Response {
    let theme = if form.dark_mode.is_some() { "dark" } else { "light" };
    let timeout = crate::probe::clamp_timeout_secs(form.timeout_seconds.unwrap_or(10));

    // Redirect back to where the form was posted from, mapping POST-only
    // test pages to their GET equivalent and keeping any selection.
    let mut target = "/".to_string();
    if let Some(url) = referer_url(&headers) {
        if url.path().ends_with("/test/html") {
            if let Some(selection) = test_page_selection(&url) {
                target = selection;
            }
        } else if let Some(selection) = selection_from_query(&url) {
            target = selection;
        } else {
            target = url.to_string();
        }
    }

    let mut response = Redirect::to(&target).into_response();
    for cookie in [
        format!("theme={}; Max-Age=31536000; SameSite=Lax; Path=/", theme),
        format!("timeout={}; Max-Age=31536000; SameSite=Lax; Path=/", timeout),
    ] {
        if let Ok(value) = header::HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

// ============================================================================
// Helpers
// ============================================================================

fn referer_url(headers: &HeaderMap) -> Option<reqwest::Url> {
    headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| reqwest::Url::parse(s).ok())
}

/// Extract a `/?node_id=N` or `/?folder_id=N` selection from a URL's query.
fn selection_from_query(url: &reqwest::Url) -> Option<String> {
    let mut folder = None;
    for (key, value) in url.query_pairs() {
        if value.chars().all(|c| c.is_ascii_digit()) && !value.is_empty() {
            match key.as_ref() {
                "node_id" => return Some(format!("/?node_id={}", value)),
                "folder_id" => folder = Some(format!("/?folder_id={}", value)),
                _ => {}
            }
        }
    }
    folder
}

/// Map `/folders/{id}/test/html` and `/nodes/{id}/test/html` paths to the
/// matching dashboard selection.
fn test_page_selection(url: &reqwest::Url) -> Option<String> {
    let segments: Vec<&str> = url.path().trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["folders", id, "test", "html"] if id.chars().all(|c| c.is_ascii_digit()) => {
            Some(format!("/?folder_id={}", id))
        }
        ["nodes", id, "test", "html"] if id.chars().all(|c| c.is_ascii_digit()) => {
            Some(format!("/?node_id={}", id))
        }
        _ => None,
    }
}

/// Parse an `application/x-www-form-urlencoded` body into key/value pairs,
/// keeping repeated keys.
fn parse_form_pairs(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => match (hex_val(bytes.get(i + 1)), hex_val(bytes.get(i + 2))) {
                (Some(hi), Some(lo)) => {
                    out.push(hi * 16 + lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: Option<&u8>) -> Option<u8> {
    b.and_then(|b| (*b as char).to_digit(16)).map(|d| d as u8)
}

fn form_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Collect node ids from repeated `node_ids` fields. Each value may itself
/// hold several ids separated by commas or whitespace; duplicates are
/// dropped, order is preserved.
fn collect_node_ids(pairs: &[(String, String)]) -> Vec<i64> {
    let splitter = match Regex::new(r"[,\s]+") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    let mut ids = Vec::new();
    for (key, value) in pairs {
        if key != "node_ids" && key != "node_ids[]" {
            continue;
        }
        for part in splitter.split(value.trim()) {
            if let Ok(id) = part.parse::<i64>() {
                if id >= 0 && !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }
    ids
}
