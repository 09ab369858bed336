//! Catalog database initialization and schema

pub mod init;

pub use init::*;
