//! ob-core - Core library for observer-migrate
//!
//! This crate provides the shared configuration file format, the core error
//! type, checksum helpers, and SQL quoting used by the store and the
//! migration engine.

pub mod checksum;
pub mod config;
pub mod error;
pub mod sql_utils;

pub use checksum::compute_checksum;
pub use config::{Config, DatabaseConfig, MigrationsConfig};
pub use error::{CoreError, CoreResult};
