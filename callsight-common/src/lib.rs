//! # Callsight Common Library
//!
//! Shared code for the callsight analysis services including:
//! - Error type and result alias
//! - TOML bootstrap configuration loading
//! - Database bootstrap (connection pool + schema)
//! - Progress event types and the event bus

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
