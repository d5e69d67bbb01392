//! End-to-end tests driving a bound server over HTTP.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use urlpulse::config::ServerConfig;
use urlpulse::db::Store;
use urlpulse::probe::Prober;
use urlpulse::web::Server;

/// Start the app on an ephemeral port, backed by a throwaway database.
async fn spawn_app() -> (String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    let config = ServerConfig {
        http_port: 0,
        db_path: db_path.to_string_lossy().into_owned(),
        default_timeout_secs: 2,
    };
    let store = Arc::new(Store::new(&db_path).unwrap());
    let prober = Prober::new().unwrap();
    let server = Server::new(config, store, prober);
    let router = server.router();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}", addr), dir)
}

/// Stub HTTP server answering every connection with the given status line.
async fn stub_server(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status_line
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("http://{}/", addr)
}

fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_healthz() {
    let (base, _guard) = spawn_app().await;
    let body: Value = reqwest::get(format!("{}/healthz", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_folder_and_node_crud() {
    let (base, _guard) = spawn_app().await;
    let client = reqwest::Client::new();

    // Create folder
    let folder: Value = client
        .post(format!("{}/api/folders", base))
        .json(&json!({ "name": "Sites" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let folder_id = folder["id"].as_i64().unwrap();
    assert_eq!(folder["name"], "Sites");

    // Empty name rejected
    let res = client
        .post(format!("{}/api/folders", base))
        .json(&json!({ "name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    // Rename
    let renamed: Value = client
        .put(format!("{}/api/folders/{}", base, folder_id))
        .json(&json!({ "name": "Production" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(renamed["name"], "Production");

    // Rename of unknown folder
    let res = client
        .put(format!("{}/api/folders/9999", base))
        .json(&json!({ "name": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    // Create node
    let node: Value = client
        .post(format!("{}/api/folders/{}/nodes", base, folder_id))
        .json(&json!({ "name": "Home", "url": "https://example.com", "comment": "main" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let node_id = node["id"].as_i64().unwrap();
    assert_eq!(node["folder_id"].as_i64(), Some(folder_id));
    assert_eq!(node["active"], true);

    // Bad URL rejected
    let res = client
        .post(format!("{}/api/folders/{}/nodes", base, folder_id))
        .json(&json!({ "name": "Bad", "url": "ftp://example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    // Update node
    let updated: Value = client
        .put(format!("{}/api/nodes/{}", base, node_id))
        .json(&json!({ "name": "Home v2", "url": "https://example.org", "active": false }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["name"], "Home v2");
    assert_eq!(updated["active"], false);

    // Tree reflects everything
    let tree: Value = client
        .get(format!("{}/api/tree", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tree["folders"].as_array().unwrap().len(), 1);
    assert_eq!(tree["folders"][0]["nodes"][0]["name"], "Home v2");

    // Delete node, then folder
    let res = client
        .delete(format!("{}/api/nodes/{}", base, node_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let res = client
        .delete(format!("{}/api/folders/{}", base, folder_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let res = client
        .delete(format!("{}/api/folders/{}", base, folder_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_single_node_probe() {
    let (base, _guard) = spawn_app().await;
    let client = reqwest::Client::new();
    let ok_url = stub_server("HTTP/1.1 200 OK").await;

    let folder: Value = client
        .post(format!("{}/api/folders", base))
        .json(&json!({ "name": "Sites" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let folder_id = folder["id"].as_i64().unwrap();

    let node: Value = client
        .post(format!("{}/api/folders/{}/nodes", base, folder_id))
        .json(&json!({ "name": "Up", "url": ok_url }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let report: Value = client
        .post(format!("{}/api/nodes/{}/test", base, node["id"].as_i64().unwrap()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["tested"], true);
    assert_eq!(report["ok"], true);
    assert_eq!(report["status_code"], 200);
    assert!(report["elapsed_ms"].as_u64().is_some());

    // Inactive node is never probed
    let inactive: Value = client
        .post(format!("{}/api/folders/{}/nodes", base, folder_id))
        .json(&json!({ "name": "Off", "url": "https://example.com", "active": false }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let report: Value = client
        .post(format!(
            "{}/api/nodes/{}/test",
            base,
            inactive["id"].as_i64().unwrap()
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["tested"], false);
    assert_eq!(report["reason"], "Node inactive");
}

#[tokio::test]
async fn test_folder_probe_preserves_order() {
    let (base, _guard) = spawn_app().await;
    let client = reqwest::Client::new();
    let ok_url = stub_server("HTTP/1.1 200 OK").await;
    let err_url = stub_server("HTTP/1.1 503 Service Unavailable").await;

    let folder: Value = client
        .post(format!("{}/api/folders", base))
        .json(&json!({ "name": "Mixed" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let folder_id = folder["id"].as_i64().unwrap();

    for (name, url, active) in [
        ("up", ok_url.as_str(), true),
        ("down", err_url.as_str(), true),
        ("off", "https://example.com", false),
    ] {
        client
            .post(format!("{}/api/folders/{}/nodes", base, folder_id))
            .json(&json!({ "name": name, "url": url, "active": active }))
            .send()
            .await
            .unwrap();
    }

    let report: Value = client
        .post(format!("{}/api/folders/{}/test", base, folder_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(report["folder_id"].as_i64(), Some(folder_id));
    let results = report["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);

    assert_eq!(results[0]["name"], "up");
    assert_eq!(results[0]["ok"], true);
    assert_eq!(results[0]["status_code"], 200);

    assert_eq!(results[1]["name"], "down");
    assert_eq!(results[1]["ok"], false);
    assert_eq!(results[1]["status_code"], 503);

    assert_eq!(results[2]["name"], "off");
    assert_eq!(results[2]["tested"], false);
    assert_eq!(results[2]["reason"], "Node inactive");
    assert!(results[2].get("elapsed_ms").is_none());
}

#[tokio::test]
async fn test_dashboard_form_flow() {
    let (base, _guard) = spawn_app().await;
    let client = no_redirect_client();

    // Add a folder through the form; it redirects to the folder view
    let res = client
        .post(format!("{}/folders/add", base))
        .form(&[("name", "My Sites")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 303);
    let location = res.headers()["location"].to_str().unwrap().to_string();
    assert!(location.starts_with("/?folder_id="));

    // The dashboard shows it
    let html = client
        .get(format!("{}{}", base, location))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("My Sites"));

    // Blank folder names are ignored
    let res = client
        .post(format!("{}/folders/add", base))
        .form(&[("name", "   ")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 303);
    assert_eq!(res.headers()["location"], "/");

    // Add a node through the form
    let folder_id = location.trim_start_matches("/?folder_id=").to_string();
    let res = client
        .post(format!("{}/nodes/add", base))
        .form(&[
            ("folder_id", folder_id.as_str()),
            ("name", "Example"),
            ("url", "https://example.com"),
            ("active", "on"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 303);

    let html = client
        .get(format!("{}{}", base, location))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("Example"));
}

#[tokio::test]
async fn test_folder_test_html_renders_results() {
    let (base, _guard) = spawn_app().await;
    let client = reqwest::Client::new();
    let ok_url = stub_server("HTTP/1.1 200 OK").await;

    let folder: Value = client
        .post(format!("{}/api/folders", base))
        .json(&json!({ "name": "Sites" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let folder_id = folder["id"].as_i64().unwrap();
    client
        .post(format!("{}/api/folders/{}/nodes", base, folder_id))
        .json(&json!({ "name": "Up", "url": ok_url }))
        .send()
        .await
        .unwrap();

    let html = client
        .post(format!("{}/folders/{}/test/html", base, folder_id))
        .form(&[("runs", "2")])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(html.contains("Test results"));
    assert!(html.contains("OK (200)"));
    assert!(html.contains("<svg"));
    assert!(html.contains("2 runs per URL"));
}

#[tokio::test]
async fn test_preferences_set_cookies() {
    let (base, _guard) = spawn_app().await;
    let client = no_redirect_client();

    let res = client
        .post(format!("{}/preferences", base))
        .form(&[("dark_mode", "on"), ("timeout_seconds", "500")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 303);

    let cookies: Vec<String> = res
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("theme=dark")));
    // Out-of-range timeout is clamped to the maximum
    assert!(cookies.iter().any(|c| c.starts_with("timeout=120")));
}
