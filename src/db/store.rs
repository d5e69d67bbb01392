//! SQLite database store implementation.

use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::models::*;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("Not found")]
    NotFound,
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::NotFound,
            other => DbError::Sqlite(other),
        }
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT
);
CREATE TABLE IF NOT EXISTS folders (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS nodes (
  id INTEGER PRIMARY KEY,
  folder_id INTEGER NOT NULL,
  name TEXT NOT NULL,
  url TEXT NOT NULL,
  comment TEXT DEFAULT '',
  active INTEGER NOT NULL DEFAULT 1,
  FOREIGN KEY(folder_id) REFERENCES folders(id) ON DELETE CASCADE
);
";

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory store (tests).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // --- Id allocation ---
    //
    // Ids are allocated from monotonic counters in the meta table so they are
    // never reused after a delete. Missing counters are seeded from MAX(id)+1.

    fn next_id(conn: &Connection, key: &str, table: &str) -> Result<i64, DbError> {
        let stored: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |r| {
                r.get(0)
            })
            .optional()?;

        let next = match stored.and_then(|s| s.parse::<i64>().ok()) {
            Some(n) => n,
            None => conn.query_row(
                &format!("SELECT COALESCE(MAX(id) + 1, 1) FROM {}", table),
                [],
                |r| r.get(0),
            )?,
        };

        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, (next + 1).to_string()],
        )?;
        Ok(next)
    }

    // --- Folder CRUD ---

    /// Get all folders with their nodes, ordered by id.
    pub fn get_tree(&self) -> Result<Vec<Folder>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, name FROM folders ORDER BY id")?;
        let mut folders = stmt
            .query_map([], |row| {
                Ok(Folder {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    nodes: Vec::new(),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        let mut node_stmt = conn.prepare(
            "SELECT id, folder_id, name, url, comment, active FROM nodes WHERE folder_id = ?1 ORDER BY id",
        )?;
        for folder in &mut folders {
            folder.nodes = node_stmt
                .query_map(params![folder.id], row_to_node)?
                .collect::<SqlResult<Vec<_>>>()?;
        }

        Ok(folders)
    }

    /// Get a single folder with its nodes.
    pub fn get_folder(&self, id: i64) -> Result<Folder, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut folder = conn.query_row(
            "SELECT id, name FROM folders WHERE id = ?1",
            params![id],
            |row| {
                Ok(Folder {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    nodes: Vec::new(),
                })
            },
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, folder_id, name, url, comment, active FROM nodes WHERE folder_id = ?1 ORDER BY id",
        )?;
        folder.nodes = stmt
            .query_map(params![id], row_to_node)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(folder)
    }

    /// Add a new folder and return it.
    pub fn add_folder(&self, name: &str) -> Result<Folder, DbError> {
        let conn = self.conn.lock().unwrap();
        let id = Self::next_id(&conn, "next_folder_id", "folders")?;
        conn.execute(
            "INSERT INTO folders (id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;
        Ok(Folder {
            id,
            name: name.to_string(),
            nodes: Vec::new(),
        })
    }

    /// Rename a folder.
    pub fn rename_folder(&self, id: i64, name: &str) -> Result<Folder, DbError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE folders SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        drop(conn);
        self.get_folder(id)
    }

    /// Delete a folder and all its nodes.
    pub fn delete_folder(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM folders WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Duplicate a folder and all its nodes. The copy gets a unique
    /// `copy_N_<name>` among folder names; node names are kept as-is.
    pub fn duplicate_folder(&self, id: i64) -> Result<Folder, DbError> {
        let src = self.get_folder(id)?;
        let conn = self.conn.lock().unwrap();

        let existing: Vec<String> = conn
            .prepare("SELECT name FROM folders")?
            .query_map([], |r| r.get(0))?
            .collect::<SqlResult<Vec<_>>>()?;
        let copy_name = next_copy_name(&existing, &src.name);

        let new_id = Self::next_id(&conn, "next_folder_id", "folders")?;
        conn.execute(
            "INSERT INTO folders (id, name) VALUES (?1, ?2)",
            params![new_id, copy_name],
        )?;

        let mut nodes = Vec::with_capacity(src.nodes.len());
        for n in &src.nodes {
            let node_id = Self::next_id(&conn, "next_node_id", "nodes")?;
            conn.execute(
                "INSERT INTO nodes (id, folder_id, name, url, comment, active) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![node_id, new_id, n.name, n.url, n.comment, n.active as i64],
            )?;
            nodes.push(Node {
                id: node_id,
                folder_id: new_id,
                name: n.name.clone(),
                url: n.url.clone(),
                comment: n.comment.clone(),
                active: n.active,
            });
        }

        Ok(Folder {
            id: new_id,
            name: copy_name,
            nodes,
        })
    }

    // --- Node CRUD ---

    /// Add a node to a folder.
    pub fn add_node(&self, folder_id: i64, input: &NodeInput) -> Result<Node, DbError> {
        let conn = self.conn.lock().unwrap();
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM folders WHERE id = ?1",
            params![folder_id],
            |r| r.get(0),
        )?;
        if exists == 0 {
            return Err(DbError::NotFound);
        }

        let id = Self::next_id(&conn, "next_node_id", "nodes")?;
        conn.execute(
            "INSERT INTO nodes (id, folder_id, name, url, comment, active) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, folder_id, input.name, input.url, input.comment, input.active as i64],
        )?;
        Ok(Node {
            id,
            folder_id,
            name: input.name.clone(),
            url: input.url.clone(),
            comment: input.comment.clone(),
            active: input.active,
        })
    }

    /// Get a node by id.
    pub fn get_node(&self, id: i64) -> Result<Node, DbError> {
        let conn = self.conn.lock().unwrap();
        let node = conn.query_row(
            "SELECT id, folder_id, name, url, comment, active FROM nodes WHERE id = ?1",
            params![id],
            row_to_node,
        )?;
        Ok(node)
    }

    /// Update a node's editable fields.
    pub fn update_node(&self, id: i64, input: &NodeInput) -> Result<Node, DbError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE nodes SET name = ?1, url = ?2, comment = ?3, active = ?4 WHERE id = ?5",
            params![input.name, input.url, input.comment, input.active as i64, id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        drop(conn);
        self.get_node(id)
    }

    /// Delete a node. Returns the parent folder id.
    pub fn delete_node(&self, id: i64) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        let folder_id: i64 = conn.query_row(
            "SELECT folder_id FROM nodes WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        conn.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        Ok(folder_id)
    }

    /// Flip a node's active flag. Returns the updated node.
    pub fn toggle_node_active(&self, id: i64) -> Result<Node, DbError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE nodes SET active = 1 - active WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        drop(conn);
        self.get_node(id)
    }

    /// Duplicate a node within its folder with a unique `copy_N_<name>`.
    pub fn duplicate_node(&self, id: i64) -> Result<Node, DbError> {
        let src = self.get_node(id)?;
        let conn = self.conn.lock().unwrap();

        let existing: Vec<String> = conn
            .prepare("SELECT name FROM nodes WHERE folder_id = ?1")?
            .query_map(params![src.folder_id], |r| r.get(0))?
            .collect::<SqlResult<Vec<_>>>()?;
        let copy_name = next_copy_name(&existing, &src.name);

        let new_id = Self::next_id(&conn, "next_node_id", "nodes")?;
        conn.execute(
            "INSERT INTO nodes (id, folder_id, name, url, comment, active) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![new_id, src.folder_id, copy_name, src.url, src.comment, src.active as i64],
        )?;
        Ok(Node {
            id: new_id,
            folder_id: src.folder_id,
            name: copy_name,
            url: src.url,
            comment: src.comment,
            active: src.active,
        })
    }

    /// Delete the given nodes across all folders. Unknown ids are ignored.
    pub fn delete_nodes(&self, ids: &[i64]) -> Result<usize, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut deleted = 0;
        for id in ids {
            deleted += conn.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        }
        Ok(deleted)
    }

    /// Remove every node from a folder.
    pub fn clear_folder(&self, folder_id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM folders WHERE id = ?1",
            params![folder_id],
            |r| r.get(0),
        )?;
        if exists == 0 {
            return Err(DbError::NotFound);
        }
        conn.execute("DELETE FROM nodes WHERE folder_id = ?1", params![folder_id])?;
        Ok(())
    }
}

fn row_to_node(row: &rusqlite::Row<'_>) -> SqlResult<Node> {
    Ok(Node {
        id: row.get(0)?,
        folder_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        comment: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        active: row.get::<_, i64>(5)? != 0,
    })
}

/// Compute the next copy name like `copy_N_<base>`.
///
/// If the original name is already a copy (`copy_N_base`), `base` is reused
/// so copies of copies don't nest prefixes. The result is unique among
/// `existing_names`.
pub fn next_copy_name(existing_names: &[String], original_name: &str) -> String {
    let base = match Regex::new(r"^copy_(\d+)_+(.*)$")
        .ok()
        .and_then(|re| re.captures(original_name))
    {
        Some(caps) if !caps[2].is_empty() => caps[2].to_string(),
        _ => original_name.to_string(),
    };

    let mut max_n: u64 = 0;
    if let Ok(pattern) = Regex::new(&format!(r"^copy_(\d+)_+{}$", regex::escape(&base))) {
        for name in existing_names {
            if let Some(caps) = pattern.captures(name) {
                if let Ok(n) = caps[1].parse::<u64>() {
                    max_n = max_n.max(n);
                }
            }
        }
    }

    let mut n = max_n + 1;
    let mut candidate = format!("copy_{}_{}", n, base);
    while existing_names.iter().any(|e| e == &candidate) {
        n += 1;
        candidate = format!("copy_{}_{}", n, base);
    }
    candidate
}
