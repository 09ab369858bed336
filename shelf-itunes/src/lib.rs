//! shelf-itunes library interface
//!
//! Imports audiobooks from a media player's `Library.xml` export into the
//! shelf catalog, keeps the catalog in sync with later exports, and writes
//! reorganized file locations back into the export and the player's binary
//! library.

pub mod catalog;
pub mod db;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod grouper;
pub mod itl;
pub mod location;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{Error, Result};
