//! Clickguard Migrate
//!
//! Migration support for the clickguard ClickHouse provider:
//! - [`MigrationSqlGenerator`] renders migration operations as ClickHouse DDL
//! - [`sort_operations`] orders operations so created tables come before their dependents
//! - [`HistoryRepository`] manages the applied-migrations bookkeeping table

pub mod dependency_ordering;
pub mod history;
pub mod operation;
pub mod sql_generator;

pub use dependency_ordering::{created_table, operation_dependencies, sort_operations};
pub use history::{HistoryRepository, HistoryRow};
pub use operation::{Annotations, Layered, MigrationOperation};
pub use sql_generator::{MigrationCommand, MigrationSqlGenerator};
