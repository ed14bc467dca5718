//! SQLite persistence for the Beacon delivery pipeline.
//!
//! This crate provides:
//! - Database: connection wrapper with versioned migrations
//! - Queued hit rows: the durable FIFO backing the hit queue
//! - Client state entries: key/value/TTL records echoed back to the server
//! - Session properties: the persisted location hint and its expiry

mod db;
mod error;
mod migrations;
mod models;

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use models::{QueuedHit, SessionProperties, StateEntry};
