//! uiprobe Common Library
//!
//! Datastore access shared by the harness, the simulated frontend and the
//! test groups: row queries, content digests, and table snapshot/restore.

pub mod db;
pub mod error;
pub mod types;

pub use db::{Database, Row, TableSnapshot};
pub use error::{Error, Result};
pub use types::*;

/// uiprobe version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
