//! Configuration module for urlpulse.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "urlpulse.db")
    pub db_path: String,
    /// Fallback probe timeout in seconds when no preference cookie is set
    /// (default: 10)
    pub default_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "urlpulse.db".to_string(),
            default_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `URLPULSE_HTTP_PORT`: HTTP port (default: 8080)
    /// - `URLPULSE_DB_PATH`: Database file path (default: "urlpulse.db")
    /// - `URLPULSE_DEFAULT_TIMEOUT`: Fallback probe timeout in seconds (default: 10)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("URLPULSE_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(db_path) = env::var("URLPULSE_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(timeout_str) = env::var("URLPULSE_DEFAULT_TIMEOUT") {
            if let Ok(timeout) = timeout_str.parse() {
                cfg.default_timeout_secs = timeout;
            }
        }

        cfg
    }
}
