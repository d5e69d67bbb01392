//! Web server module.

mod chart;
mod forms;
mod handlers;
mod render;

pub use chart::*;
pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::probe::{clamp_timeout_secs, Prober, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};

use axum::{
    extract::DefaultBodyLimit,
    http::header::COOKIE,
    http::HeaderMap,
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub prober: Prober,
}

/// Web server for urlpulse.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>, prober: Prober) -> Self {
        Self {
            state: AppState {
                config,
                store,
                prober,
            },
        }
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            // Dashboard
            .route("/", get(handlers::handle_index))
            // API: folders and nodes
            .route("/api/tree", get(handlers::handle_get_tree))
            .route("/api/folders", post(handlers::handle_create_folder))
            .route("/api/folders/{id}", put(handlers::handle_rename_folder))
            .route("/api/folders/{id}", delete(handlers::handle_delete_folder))
            .route("/api/folders/{id}/nodes", post(handlers::handle_create_node))
            .route("/api/nodes/{id}", put(handlers::handle_update_node))
            .route("/api/nodes/{id}", delete(handlers::handle_delete_node))
            // API: probing
            .route("/api/nodes/{id}/test", post(handlers::handle_test_node))
            .route("/api/folders/{id}/test", post(handlers::handle_test_folder))
            // Form routes (HTML dashboard)
            .route("/folders/add", post(forms::handle_form_add_folder))
            .route("/folders/{id}/rename", post(forms::handle_form_rename_folder))
            .route("/folders/{id}/delete", post(forms::handle_form_delete_folder))
            .route(
                "/folders/{id}/duplicate",
                post(forms::handle_form_duplicate_folder),
            )
            .route("/nodes/add", post(forms::handle_form_add_node))
            .route("/nodes/{id}/edit", post(forms::handle_form_edit_node))
            .route("/nodes/{id}/delete", post(forms::handle_form_delete_node))
            .route(
                "/nodes/{id}/duplicate",
                post(forms::handle_form_duplicate_node),
            )
            .route(
                "/nodes/{id}/toggle_active",
                post(forms::handle_form_toggle_active),
            )
            .route("/nodes/bulk_delete", post(forms::handle_form_bulk_delete))
            .route("/nodes/{id}/test/html", post(forms::handle_form_test_node))
            .route(
                "/folders/{id}/test/html",
                post(forms::handle_form_test_folder),
            )
            .route(
                "/folders/{id}/test_selected/html",
                post(forms::handle_form_test_selected),
            )
            .route("/preferences", post(forms::handle_set_preferences))
            // Misc
            .route("/healthz", get(handlers::handle_healthz))
            .route("/favicon.ico", get(handlers::handle_favicon))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.router();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

/// Per-request preferences read from cookies.
#[derive(Debug, Clone)]
pub struct Prefs {
    pub theme: String,
    pub timeout_secs: u64,
}

/// Read theme and probe timeout preferences from the request cookies.
/// Unknown or out-of-range values fall back to defaults.
pub fn read_prefs(headers: &HeaderMap, config: &ServerConfig) -> Prefs {
    let mut theme = "light".to_string();
    let mut timeout_secs = config
        .default_timeout_secs
        .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);

    if let Some(value) = headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
        for pair in value.split(';') {
            let pair = pair.trim();
            if let Some(v) = pair.strip_prefix("theme=") {
                if v == "light" || v == "dark" {
                    theme = v.to_string();
                }
            } else if let Some(v) = pair.strip_prefix("timeout=") {
                if let Ok(secs) = v.parse::<i64>() {
                    timeout_secs = clamp_timeout_secs(secs);
                }
            }
        }
    }

    Prefs {
        theme,
        timeout_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_read_prefs_defaults() {
        let headers = HeaderMap::new();
        let prefs = read_prefs(&headers, &ServerConfig::default());
        assert_eq!(prefs.theme, "light");
        assert_eq!(prefs.timeout_secs, 10);
    }

    #[test]
    fn test_read_prefs_from_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; timeout=30; other=x"),
        );
        let prefs = read_prefs(&headers, &ServerConfig::default());
        assert_eq!(prefs.theme, "dark");
        assert_eq!(prefs.timeout_secs, 30);
    }

    #[test]
    fn test_read_prefs_clamps_config_default() {
        let headers = HeaderMap::new();

        let config = ServerConfig {
            default_timeout_secs: 500,
            ..ServerConfig::default()
        };
        let prefs = read_prefs(&headers, &config);
        assert_eq!(prefs.timeout_secs, 120);

        let config = ServerConfig {
            default_timeout_secs: 0,
            ..ServerConfig::default()
        };
        let prefs = read_prefs(&headers, &config);
        assert_eq!(prefs.timeout_secs, 1);
    }

    #[test]
    fn test_read_prefs_clamps_and_rejects() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=neon; timeout=999"));
        let prefs = read_prefs(&headers, &ServerConfig::default());
        assert_eq!(prefs.theme, "light");
        assert_eq!(prefs.timeout_secs, 120);
    }
}
