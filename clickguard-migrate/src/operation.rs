//! Migration operations handed over by the migration-diff layer.

use std::collections::BTreeMap;

use clickguard::schema::{ColumnSpec, SkipIndexSpec};
use clickguard::types::Value;

/// Foreign-provider annotations attached to a column operation, e.g. `Npgsql:ValueGenerationStrategy`.
pub type Annotations = BTreeMap<String, String>;

/// One schema change. Consumed once by the sorter, then by the SQL generator.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOperation {
    EnsureSchema {
        name: String,
    },
    DropSchema {
        name: String,
    },
    /// Create the entity registered under `table`. `columns` overrides the entity's
    /// declared columns when non-empty.
    CreateTable {
        table: String,
        schema: Option<String>,
        columns: Vec<ColumnSpec>,
    },
    DropTable {
        table: String,
        schema: Option<String>,
    },
    RenameTable {
        table: String,
        schema: Option<String>,
        new_name: String,
        new_schema: Option<String>,
    },
    AddColumn {
        table: String,
        schema: Option<String>,
        column: ColumnSpec,
        annotations: Annotations,
    },
    DropColumn {
        table: String,
        schema: Option<String>,
        name: String,
    },
    AlterColumn {
        table: String,
        schema: Option<String>,
        column: ColumnSpec,
        annotations: Annotations,
    },
    RenameColumn {
        table: String,
        schema: Option<String>,
        name: String,
        new_name: String,
    },
    AddPrimaryKey {
        table: String,
        schema: Option<String>,
        name: String,
        columns: Vec<String>,
    },
    DropPrimaryKey {
        table: String,
        schema: Option<String>,
        name: String,
    },
    AddForeignKey {
        table: String,
        schema: Option<String>,
        name: String,
        columns: Vec<String>,
        principal_table: String,
        principal_columns: Vec<String>,
    },
    DropForeignKey {
        table: String,
        schema: Option<String>,
        name: String,
    },
    /// `skip` overrides the index declared on the entity; with neither, minmax/3 is used.
    CreateIndex {
        table: String,
        schema: Option<String>,
        name: String,
        columns: Vec<String>,
        unique: bool,
        skip: Option<SkipIndexSpec>,
    },
    DropIndex {
        table: String,
        schema: Option<String>,
        name: String,
    },
    AddProjection {
        table: String,
        schema: Option<String>,
        name: String,
        query: String,
        if_not_exists: bool,
    },
    DropProjection {
        table: String,
        schema: Option<String>,
        name: String,
        if_exists: bool,
    },
    MaterializeProjection {
        table: String,
        schema: Option<String>,
        name: String,
        partition: Option<String>,
        if_exists: bool,
    },
    InsertData {
        table: String,
        schema: Option<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    UpdateData {
        table: String,
        schema: Option<String>,
    },
    DeleteData {
        table: String,
        schema: Option<String>,
    },
    /// Raw SQL passed through unchanged apart from the terminator.
    Sql(String),
}

impl MigrationOperation {
    /// The table this operation targets, if any.
    pub fn table(&self) -> Option<&str> {
        use MigrationOperation::*;
        match self {
            EnsureSchema { .. } | DropSchema { .. } | Sql(_) => None,
            CreateTable { table, .. }
            | DropTable { table, .. }
            | RenameTable { table, .. }
            | AddColumn { table, .. }
            | DropColumn { table, .. }
            | AlterColumn { table, .. }
            | RenameColumn { table, .. }
            | AddPrimaryKey { table, .. }
            | DropPrimaryKey { table, .. }
            | AddForeignKey { table, .. }
            | DropForeignKey { table, .. }
            | CreateIndex { table, .. }
            | DropIndex { table, .. }
            | AddProjection { table, .. }
            | DropProjection { table, .. }
            | MaterializeProjection { table, .. }
            | InsertData { table, .. }
            | UpdateData { table, .. }
            | DeleteData { table, .. } => Some(table),
        }
    }

    /// Short name used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        use MigrationOperation::*;
        match self {
            EnsureSchema { .. } => "EnsureSchema",
            DropSchema { .. } => "DropSchema",
            CreateTable { .. } => "CreateTable",
            DropTable { .. } => "DropTable",
            RenameTable { .. } => "RenameTable",
            AddColumn { .. } => "AddColumn",
            DropColumn { .. } => "DropColumn",
            AlterColumn { .. } => "AlterColumn",
            RenameColumn { .. } => "RenameColumn",
            AddPrimaryKey { .. } => "AddPrimaryKey",
            DropPrimaryKey { .. } => "DropPrimaryKey",
            AddForeignKey { .. } => "AddForeignKey",
            DropForeignKey { .. } => "DropForeignKey",
            CreateIndex { .. } => "CreateIndex",
            DropIndex { .. } => "DropIndex",
            AddProjection { .. } => "AddProjection",
            DropProjection { .. } => "DropProjection",
            MaterializeProjection { .. } => "MaterializeProjection",
            InsertData { .. } => "InsertData",
            UpdateData { .. } => "UpdateData",
            DeleteData { .. } => "DeleteData",
            Sql(_) => "Sql",
        }
    }

    pub fn create_table(table: impl Into<String>) -> Self {
        MigrationOperation::CreateTable {
            table: table.into(),
            schema: None,
            columns: Vec::new(),
        }
    }

    pub fn add_column(table: impl Into<String>, column: ColumnSpec) -> Self {
        MigrationOperation::AddColumn {
            table: table.into(),
            schema: None,
            column,
            annotations: Annotations::new(),
        }
    }

    pub fn create_index<S: Into<String>>(
        table: impl Into<String>,
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        MigrationOperation::CreateIndex {
            table: table.into(),
            schema: None,
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            skip: None,
        }
    }
}

/// An operation-level override on top of an entity-level value.
#[derive(Debug, Clone, PartialEq)]
pub struct Layered<T> {
    pub operation: Option<T>,
    pub entity: T,
}

impl<T> Layered<T> {
    pub fn new(operation: Option<T>, entity: T) -> Self {
        Self { operation, entity }
    }

    /// The operation's value when present, else the entity's.
    pub fn resolve(self) -> T {
        self.operation.unwrap_or(self.entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layered_prefers_operation() {
        assert_eq!(Layered::new(Some(1), 2).resolve(), 1);
        assert_eq!(Layered::new(None, 2).resolve(), 2);
    }

    #[test]
    fn test_table_of_operation() {
        assert_eq!(MigrationOperation::create_table("A").table(), Some("A"));
        assert_eq!(MigrationOperation::Sql("SELECT 1".into()).table(), None);
        assert_eq!(MigrationOperation::create_index("T", "IX", ["c"]).kind(), "CreateIndex");
    }
}
