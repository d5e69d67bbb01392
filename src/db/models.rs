//! Database model types.

use serde::{Deserialize, Serialize};

/// A folder grouping a set of URL nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// A single monitored URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub folder_id: i64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub comment: String,
    pub active: bool,
}

/// Incoming payload for creating or updating a node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInput {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Incoming payload for creating or renaming a folder.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderInput {
    pub name: String,
}

/// Maximum length for folder and node names.
pub const MAX_NAME_LEN: usize = 200;

/// Validate a folder or node name: non-empty after trimming, at most
/// [`MAX_NAME_LEN`] characters. Returns the trimmed name.
pub fn validate_name(name: &str) -> Result<String, String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(format!("name must be at most {} characters", MAX_NAME_LEN));
    }
    Ok(trimmed.to_string())
}

/// Validate a node URL: must parse and use the http or https scheme.
/// Returns the normalized URL string.
pub fn validate_url(url: &str) -> Result<String, String> {
    let trimmed = url.trim();
    let parsed = reqwest::Url::parse(trimmed).map_err(|e| format!("invalid URL: {}", e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(format!("unsupported URL scheme: {}", other)),
    }
}

impl NodeInput {
    /// Validate and normalize all fields, consuming the input.
    pub fn validated(self) -> Result<NodeInput, String> {
        let name = validate_name(&self.name)?;
        let url = validate_url(&self.url)?;
        Ok(NodeInput {
            name,
            url,
            comment: self.comment.trim().to_string(),
            active: self.active,
        })
    }
}
