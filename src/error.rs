//! Error types shared by the translator, the type mapping table and the DDL generators.
//!
//! Every failure in this crate is local and synchronous. Nothing is retried: an error here
//! describes a query or schema shape that ClickHouse cannot express, so it is surfaced to
//! the caller with enough context (category, table, column, workaround) to act on it.

use std::fmt;

/// The reason an operation has no ClickHouse equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnsupportedCategory {
    /// Row-level `UPDATE`/`DELETE` shaped operations.
    Update,
    /// Multi-statement transactions.
    Transaction,
    /// Foreign key constraints.
    ForeignKey,
    /// Primary key changes after table creation.
    PrimaryKey,
    /// Column rename.
    ColumnRename,
    /// Unique constraints and unique indexes.
    UniqueConstraint,
    /// Identity / auto-increment columns.
    Identity,
}

impl UnsupportedCategory {
    /// The default workaround shown when the caller has nothing more specific.
    pub fn default_workaround(&self) -> &'static str {
        match self {
            UnsupportedCategory::Update => {
                "Insert a new row version and read it back through a ReplacingMergeTree table with FINAL, or run an explicit ALTER TABLE ... UPDATE mutation"
            }
            UnsupportedCategory::Transaction => {
                "ClickHouse only guarantees atomicity per inserted block; group writes into a single INSERT instead of a transaction"
            }
            UnsupportedCategory::ForeignKey => {
                "Enforce referential integrity in application code or with a dictionary lookup"
            }
            UnsupportedCategory::PrimaryKey => {
                "The primary key is fixed at table creation; create a new table with the desired key and copy the data"
            }
            UnsupportedCategory::ColumnRename => {
                "Add the new column with DEFAULT/MATERIALIZED from the old one, backfill, then drop the old column"
            }
            UnsupportedCategory::UniqueConstraint => {
                "Use a ReplacingMergeTree engine keyed on the unique columns to deduplicate on merge"
            }
            UnsupportedCategory::Identity => {
                "Generate identifiers client-side (UUID, snowflake) or use generateUUIDv4() as a DEFAULT"
            }
        }
    }
}

impl fmt::Display for UnsupportedCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnsupportedCategory::Update => "Update",
            UnsupportedCategory::Transaction => "Transaction",
            UnsupportedCategory::ForeignKey => "ForeignKey",
            UnsupportedCategory::PrimaryKey => "PrimaryKey",
            UnsupportedCategory::ColumnRename => "ColumnRename",
            UnsupportedCategory::UniqueConstraint => "UniqueConstraint",
            UnsupportedCategory::Identity => "Identity",
        };
        f.write_str(name)
    }
}

/// A requested DDL or DML shape that ClickHouse cannot perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedOperationError {
    pub category: UnsupportedCategory,
    pub table: Option<String>,
    pub column: Option<String>,
    pub object: Option<String>,
    pub workaround: String,
}

impl UnsupportedOperationError {
    pub fn new(category: UnsupportedCategory) -> Self {
        Self {
            category,
            table: None,
            column: None,
            object: None,
            workaround: category.default_workaround().to_string(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn workaround(mut self, workaround: impl Into<String>) -> Self {
        self.workaround = workaround.into();
        self
    }
}

impl fmt::Display for UnsupportedOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClickHouse does not support {} operations", self.category)?;
        if let Some(table) = &self.table {
            write!(f, " (table: {table}")?;
            if let Some(column) = &self.column {
                write!(f, ", column: {column}")?;
            }
            if let Some(object) = &self.object {
                write!(f, ", object: {object}")?;
            }
            write!(f, ")")?;
        } else if let Some(object) = &self.object {
            write!(f, " (object: {object})")?;
        }
        write!(f, ". Workaround: {}", self.workaround)
    }
}

impl std::error::Error for UnsupportedOperationError {}

/// Errors raised by the clickguard core.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClickguardError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedOperationError),

    #[error("No ClickHouse mapping for type '{type_name}': {reason}")]
    Mapping { type_name: String, reason: String },

    #[error("Expression '{construct}' cannot be translated to ClickHouse SQL: {reason}")]
    UntranslatableExpression { construct: String, reason: String },

    #[error("Invalid configuration for {setting}: got {value}, expected {expected}")]
    ConfigurationValidation {
        setting: String,
        value: String,
        expected: String,
    },

    #[error("Failed to load provider configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("SQL execution failed: {0}")]
    Execution(String),
}

impl ClickguardError {
    pub fn unsupported(category: UnsupportedCategory) -> UnsupportedOperationError {
        UnsupportedOperationError::new(category)
    }

    pub fn mapping(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        ClickguardError::Mapping {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub fn untranslatable(construct: impl Into<String>, reason: impl Into<String>) -> Self {
        ClickguardError::UntranslatableExpression {
            construct: construct.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(
        setting: impl Into<String>,
        value: impl fmt::Display,
        expected: impl Into<String>,
    ) -> Self {
        ClickguardError::ConfigurationValidation {
            setting: setting.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// The unsupported-operation category, if this is an unsupported-operation error.
    pub fn unsupported_category(&self) -> Option<UnsupportedCategory> {
        match self {
            ClickguardError::Unsupported(e) => Some(e.category),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display_includes_context() {
        let err: ClickguardError = ClickguardError::unsupported(UnsupportedCategory::ColumnRename)
            .table("events")
            .column("ts")
            .into();
        let msg = err.to_string();
        assert!(msg.contains("ColumnRename"));
        assert!(msg.contains("table: events"));
        assert!(msg.contains("column: ts"));
        assert!(msg.contains("Workaround:"));
        assert_eq!(err.unsupported_category(), Some(UnsupportedCategory::ColumnRename));
    }

    #[test]
    fn test_custom_workaround_replaces_default() {
        let err = UnsupportedOperationError::new(UnsupportedCategory::Identity)
            .workaround("use generateSerialID()");
        assert_eq!(err.workaround, "use generateSerialID()");
    }

    #[test]
    fn test_configuration_validation_message() {
        let err = ClickguardError::invalid_config("granularity", 0, "1..=1000");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for granularity: got 0, expected 1..=1000"
        );
    }
}
