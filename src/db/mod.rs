//! Database module.
//!
//! SQLite-backed persistence for folders and the URL nodes they contain.

mod models;
mod store;

pub use models::*;
pub use store::*;
