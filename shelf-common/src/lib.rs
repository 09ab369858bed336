//! # Shelf Common Library
//!
//! Shared code for the shelf audiobook services including:
//! - Error type and result alias
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Tracing initialization
//! - Catalog database schema
//! - Job event bus

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
