//! urlpulse - URL availability dashboard
//!
//! Organize URLs into folders, persist them in SQLite, and probe their HTTP
//! availability on demand, one at a time or a whole folder concurrently.

pub mod config;
pub mod db;
pub mod probe;
pub mod web;
