//! # Clickguard
//!
//! ClickHouse provider core: type mapping, SQL generation, expression translation and
//! engine-aware DDL for a relational mapping layer.
//!
//! The migration generator, dependency sorter and history repository live in the
//! `clickguard-migrate` crate of this workspace.

pub mod config;
pub mod error;
pub mod executor;
pub mod query;
pub mod schema;
pub mod sql_helper;
pub mod transaction;
pub mod types;

pub use config::{CyclePolicy, ProviderConfig};
pub use error::{ClickguardError, UnsupportedCategory, UnsupportedOperationError};
pub use executor::SqlExecutor;
pub use sql_helper::SqlHelper;
