//! ob-store - SQLite store layer for observer-migrate
//!
//! This crate wraps the statistics cache store and exposes the primitives the
//! migration engine consumes: atomic units with an optional deadline, catalog
//! introspection, foreign-key enforcement toggling, and JSON path extraction
//! that never raises on malformed legacy data.

pub mod catalog;
pub mod connection;
pub mod error;
pub mod guard;
pub mod json;

pub use catalog::{CatalogSnapshot, ColumnShape, ForeignKeyShape, TableProbe, TableShape};
pub use connection::{StoreDb, StoreOptions};
pub use error::{StoreError, StoreResult};
pub use guard::{ForeignKeyGuard, ForeignKeyViolation};
pub use json::{json_scalar_sql, JsonPath, JsonPathSegment};
