//! Run ledger: a local SQLite record of every dispatch run.
//!
//! - `model`: the row types.
//! - `repo`: SQL-only functions that map rows into them.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{RunRecord, StoredRun};
