//! brickgate - a read-only SQL gateway for lakehouse warehouses.
//!
//! Validates caller SQL, qualifies it with the configured catalog, caps its
//! row count, runs it on the warehouse and returns column-oriented frames.
//! Also answers schema, table and column lookups for editor autocomplete.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;
pub mod safety;
pub mod server;
pub mod service;

pub use error::{BridgeError, Result};
pub use service::Gateway;
