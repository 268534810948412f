//! SQL migration generator for ClickHouse.
//!
//! Turns [`MigrationOperation`]s into terminated SQL commands. Table, view and dictionary
//! DDL comes from the entity metadata registered in the [`Model`]; operations that
//! ClickHouse cannot perform fail with a categorized unsupported-operation error.

use std::fmt::Write;

use clickguard::schema::{
    build_column_definition, build_create_table, build_dictionary, build_materialized_view, on_cluster, ColumnSpec,
    EntityEngineSpec, EntityKind, Model, SkipIndexSpec,
};
use clickguard::types::{TypeMapper, Value};
use clickguard::{ClickguardError, CyclePolicy, ProviderConfig, SqlHelper, UnsupportedCategory};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dependency_ordering::sort_operations;
use crate::operation::{Annotations, Layered, MigrationOperation};

static IDENTITY_ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)identity|auto_?increment|serial").expect("valid regex"));

/// Annotation names whose value selects a value-generation strategy.
static VALUE_GENERATION_ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)valuegeneration").expect("valid regex"));

fn requests_identity(name: &str, value: &str) -> bool {
    IDENTITY_ANNOTATION.is_match(name)
        || (VALUE_GENERATION_ANNOTATION.is_match(name) && IDENTITY_ANNOTATION.is_match(value))
}

/// One generated statement, already terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationCommand {
    pub sql: String,
}

/// Generates migration SQL against a fixed model and configuration.
pub struct MigrationSqlGenerator<'m> {
    model: &'m Model,
    mapper: TypeMapper,
    helper: SqlHelper,
    cluster: Option<String>,
    cycle_policy: CyclePolicy,
}

impl<'m> MigrationSqlGenerator<'m> {
    pub fn new(config: &ProviderConfig, model: &'m Model) -> Self {
        Self {
            model,
            mapper: TypeMapper::from_config(config),
            helper: config.sql_helper(),
            cluster: config.cluster.clone(),
            cycle_policy: config.cycle_policy,
        }
    }

    /// Sort `operations` by table dependencies, then render each one.
    pub fn generate(&self, operations: Vec<MigrationOperation>) -> Result<Vec<MigrationCommand>, ClickguardError> {
        let sorted = sort_operations(operations, self.model, self.cycle_policy)?;
        let mut commands = Vec::new();
        for operation in &sorted {
            commands.extend(self.generate_operation(operation)?);
        }
        Ok(commands)
    }

    /// Render a single operation without reordering.
    pub fn generate_operation(&self, operation: &MigrationOperation) -> Result<Vec<MigrationCommand>, ClickguardError> {
        use MigrationOperation::*;

        let statements = match operation {
            EnsureSchema { name } => vec![format!(
                "CREATE DATABASE IF NOT EXISTS {}{}",
                self.helper.delimit_identifier(name, None),
                self.on_cluster()
            )],
            DropSchema { name } => vec![format!(
                "DROP DATABASE IF EXISTS {}{}",
                self.helper.delimit_identifier(name, None),
                self.on_cluster()
            )],
            CreateTable { table, schema, columns } => self.create_table(table, schema.as_deref(), columns)?,
            DropTable { table, schema } => self.drop_table(table, schema.as_deref()),
            RenameTable {
                table,
                schema,
                new_name,
                new_schema,
            } => vec![format!(
                "RENAME TABLE {} TO {}{}",
                self.helper.delimit_identifier(table, schema.as_deref()),
                self.helper
                    .delimit_identifier(new_name, new_schema.as_deref().or(schema.as_deref())),
                self.on_cluster()
            )],
            AddColumn {
                table,
                schema,
                column,
                annotations,
            } => vec![self.column_statement(table, schema.as_deref(), column, annotations, "ADD COLUMN IF NOT EXISTS")?],
            AlterColumn {
                table,
                schema,
                column,
                annotations,
            } => vec![self.column_statement(table, schema.as_deref(), column, annotations, "MODIFY COLUMN")?],
            DropColumn { table, schema, name } => vec![format!(
                "{} DROP COLUMN IF EXISTS {}",
                self.alter_table(table, schema.as_deref()),
                self.helper.delimit_identifier(name, None)
            )],
            RenameColumn { table, name, .. } => {
                return Err(ClickguardError::unsupported(UnsupportedCategory::ColumnRename)
                    .table(table.clone())
                    .column(name.clone())
                    .into())
            }
            AddPrimaryKey { table, name, .. } | DropPrimaryKey { table, name, .. } => {
                return Err(ClickguardError::unsupported(UnsupportedCategory::PrimaryKey)
                    .table(table.clone())
                    .object(name.clone())
                    .into())
            }
            AddForeignKey { table, name, .. } | DropForeignKey { table, name, .. } => {
                return Err(ClickguardError::unsupported(UnsupportedCategory::ForeignKey)
                    .table(table.clone())
                    .object(name.clone())
                    .into())
            }
            CreateIndex {
                table,
                schema,
                name,
                columns,
                unique,
                skip,
            } => vec![self.create_index(table, schema.as_deref(), name, columns, *unique, skip.as_ref())?],
            DropIndex { table, schema, name } => vec![format!(
                "{} DROP INDEX IF EXISTS {}",
                self.alter_table(table, schema.as_deref()),
                self.helper.delimit_identifier(name, None)
            )],
            AddProjection {
                table,
                schema,
                name,
                query,
                if_not_exists,
            } => vec![self.add_projection(table, schema.as_deref(), name, query, *if_not_exists)],
            DropProjection {
                table,
                schema,
                name,
                if_exists,
            } => vec![format!(
                "{} DROP PROJECTION {}{}",
                self.alter_table(table, schema.as_deref()),
                if *if_exists { "IF EXISTS " } else { "" },
                self.helper.delimit_identifier(name, None)
            )],
            MaterializeProjection {
                table,
                schema,
                name,
                partition,
                if_exists,
            } => {
                let mut sql = format!(
                    "{} MATERIALIZE PROJECTION {}{}",
                    self.alter_table(table, schema.as_deref()),
                    if *if_exists { "IF EXISTS " } else { "" },
                    self.helper.delimit_identifier(name, None)
                );
                if let Some(partition) = partition {
                    write!(sql, " IN PARTITION {partition}").ok();
                }
                vec![sql]
            }
            InsertData {
                table,
                schema,
                columns,
                rows,
            } => self.insert_data(table, schema.as_deref(), columns, rows)?,
            UpdateData { table, .. } => {
                return Err(ClickguardError::unsupported(UnsupportedCategory::Update)
                    .table(table.clone())
                    .object("UPDATE")
                    .into())
            }
            DeleteData { table, .. } => {
                return Err(ClickguardError::unsupported(UnsupportedCategory::Update)
                    .table(table.clone())
                    .object("DELETE")
                    .workaround(
                        "Use a ReplacingMergeTree is_deleted column, a TTL rule, or an explicit ALTER TABLE ... DELETE mutation",
                    )
                    .into())
            }
            Sql(sql) => {
                let trimmed = sql.trim();
                let terminator = self.helper.statement_terminator();
                if !terminator.is_empty() && trimmed.ends_with(terminator) {
                    return Ok(vec![MigrationCommand {
                        sql: trimmed.to_string(),
                    }]);
                }
                vec![trimmed.to_string()]
            }
        };

        Ok(statements
            .into_iter()
            .map(|statement| {
                log::debug!("{} -> {}", operation.kind(), statement);
                MigrationCommand {
                    sql: self.helper.terminate(&statement),
                }
            })
            .collect())
    }

    fn on_cluster(&self) -> String {
        on_cluster(self.cluster.as_deref(), &self.helper)
    }

    fn alter_table(&self, table: &str, schema: Option<&str>) -> String {
        format!(
            "ALTER TABLE {}{}",
            self.helper.delimit_identifier(table, schema),
            self.on_cluster()
        )
    }

    /// The entity for `table`, with the operation's schema and columns layered on top.
    fn resolve_entity(
        &self,
        table: &str,
        schema: Option<&str>,
        columns: &[ColumnSpec],
    ) -> Result<EntityEngineSpec, ClickguardError> {
        let mut entity = match self.model.entity(table) {
            Some(entity) => entity.clone(),
            None if !columns.is_empty() => EntityEngineSpec::builder(table).build()?,
            None => {
                return Err(ClickguardError::invalid_config(
                    format!("entity {table}"),
                    "not registered",
                    "a model entity or explicit columns on the CreateTable operation",
                ))
            }
        };
        entity.schema = Layered::new(schema.map(|s| Some(s.to_string())), entity.schema.take()).resolve();
        let declared = std::mem::take(&mut entity.columns);
        entity.columns = Layered::new((!columns.is_empty()).then(|| columns.to_vec()), declared).resolve();
        Ok(entity)
    }

    fn create_table(
        &self,
        table: &str,
        schema: Option<&str>,
        columns: &[ColumnSpec],
    ) -> Result<Vec<String>, ClickguardError> {
        let entity = self.resolve_entity(table, schema, columns)?;
        let cluster = self.cluster.as_deref();

        match &entity.kind {
            EntityKind::TableFunction(function) => {
                log::warn!("Skipping DDL for {table}: it is backed by the table function {function}");
                Ok(Vec::new())
            }
            EntityKind::Dictionary(definition) if definition.is_external() => {
                log::warn!(
                    "Dictionary {table} has an external source; create it at runtime with create_external_dictionary_sql"
                );
                Ok(vec![format!(
                    "-- Dictionary {} uses an external source; it is created at application startup so credentials never appear in migrations",
                    self.helper.delimit_identifier(table, entity.schema.as_deref())
                )])
            }
            EntityKind::Dictionary(definition) => {
                definition.validate(table)?;
                Ok(vec![build_dictionary(&entity, definition, &self.mapper, &self.helper, cluster)?])
            }
            EntityKind::MaterializedView(view) => {
                Ok(vec![build_materialized_view(&entity, view, &self.helper, cluster)])
            }
            EntityKind::Table => {
                for column in &entity.columns {
                    if column.app_type.is_nullable() && entity.effective_order_by().contains(&column.name) {
                        log::warn!("Sorting key column {}.{} is nullable", table, column.name);
                    }
                }
                if entity.engine.is_merge_tree_family() && entity.effective_order_by().is_empty() {
                    log::warn!("Table {table} has no ORDER BY or primary key; falling back to ORDER BY tuple()");
                }
                let mut statements = vec![build_create_table(&entity, &self.mapper, &self.helper, cluster)?];
                for projection in &entity.projections {
                    statements.push(self.add_projection(
                        table,
                        entity.schema.as_deref(),
                        &projection.name,
                        &projection.query,
                        true,
                    ));
                }
                Ok(statements)
            }
        }
    }

    fn drop_table(&self, table: &str, schema: Option<&str>) -> Vec<String> {
        let entity = self.model.entity(table);
        let schema = schema.or_else(|| entity.and_then(|e| e.schema.as_deref()));
        let keyword = match entity.map(|e| &e.kind) {
            Some(EntityKind::TableFunction(_)) => return Vec::new(),
            Some(EntityKind::MaterializedView(_)) => "VIEW",
            Some(EntityKind::Dictionary(_)) => "DICTIONARY",
            Some(EntityKind::Table) | None => "TABLE",
        };
        vec![format!(
            "DROP {} IF EXISTS {}{}",
            keyword,
            self.helper.delimit_identifier(table, schema),
            self.on_cluster()
        )]
    }

    fn column_statement(
        &self,
        table: &str,
        schema: Option<&str>,
        column: &ColumnSpec,
        annotations: &Annotations,
        action: &str,
    ) -> Result<String, ClickguardError> {
        if let Some((name, value)) = annotations
            .iter()
            .find(|(name, value)| requests_identity(name, value))
        {
            return Err(ClickguardError::unsupported(UnsupportedCategory::Identity)
                .table(table)
                .column(column.name.clone())
                .object(format!("{name} = {value}"))
                .into());
        }
        let definition = build_column_definition(column, &self.mapper, &self.helper)?;
        Ok(format!("{} {} {}", self.alter_table(table, schema), action, definition))
    }

    fn create_index(
        &self,
        table: &str,
        schema: Option<&str>,
        name: &str,
        columns: &[String],
        unique: bool,
        skip: Option<&SkipIndexSpec>,
    ) -> Result<String, ClickguardError> {
        if unique {
            return Err(ClickguardError::unsupported(UnsupportedCategory::UniqueConstraint)
                .table(table)
                .object(name)
                .into());
        }
        let declared = self.model.entity(table).and_then(|e| e.index(name));
        let skip = Layered::new(skip.cloned(), declared.map(|i| i.skip.clone()).unwrap_or_default()).resolve();
        let columns = Layered::new(
            (!columns.is_empty()).then(|| columns.to_vec()),
            declared.map(|i| i.columns.clone()).unwrap_or_default(),
        )
        .resolve();
        if columns.is_empty() {
            return Err(ClickguardError::invalid_config(
                format!("index {name} on {table}"),
                "no columns",
                "at least one column",
            ));
        }
        Ok(format!(
            "{} ADD INDEX IF NOT EXISTS {} ({}) {}",
            self.alter_table(table, schema),
            self.helper.delimit_identifier(name, None),
            self.helper.delimit_column_list(&columns),
            skip.render()
        ))
    }

    fn add_projection(&self, table: &str, schema: Option<&str>, name: &str, query: &str, if_not_exists: bool) -> String {
        format!(
            "{} ADD PROJECTION {}{} ({})",
            self.alter_table(table, schema),
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            self.helper.delimit_identifier(name, None),
            query.trim()
        )
    }

    fn insert_data(
        &self,
        table: &str,
        schema: Option<&str>,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<Vec<String>, ClickguardError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != columns.len() {
                return Err(ClickguardError::invalid_config(
                    format!("insert into {table}"),
                    format!("{} values", row.len()),
                    format!("{} values, one per column", columns.len()),
                ));
            }
            let mut literals = Vec::with_capacity(row.len());
            for (column, value) in columns.iter().zip(row) {
                if let Some(spec) = self.model.column(table, column) {
                    self.mapper.validate_value(&spec.app_type, &spec.type_config, value)?;
                }
                literals.push(value.to_sql_literal(&self.helper));
            }
            values.push(format!("({})", literals.join(", ")));
        }
        Ok(vec![format!(
            "INSERT INTO {} ({}) VALUES\n{}",
            self.helper.delimit_identifier(table, schema),
            self.helper.delimit_column_list(columns),
            values.join(",\n")
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_annotation_pattern() {
        for text in ["SqlServer:Identity", "AUTO_INCREMENT", "autoincrement", "SerialColumn"] {
            assert!(IDENTITY_ANNOTATION.is_match(text), "{text}");
        }
        assert!(!IDENTITY_ANNOTATION.is_match("Relational:Comment"));
    }

    #[test]
    fn test_identity_values_checked_only_for_value_generation() {
        assert!(requests_identity("Npgsql:ValueGenerationStrategy", "SerialColumn"));
        assert!(requests_identity("SqlServer:Identity", "1, 1"));
        assert!(!requests_identity("Relational:Comment", "Serial number of the device"));
        assert!(!requests_identity("Npgsql:ValueGenerationStrategy", "None"));
    }

    #[test]
    fn test_raw_sql_terminated_once() {
        let model = Model::default();
        let generator = MigrationSqlGenerator::new(&ProviderConfig::default(), &model);
        let plain = generator
            .generate_operation(&MigrationOperation::Sql("OPTIMIZE TABLE \"T\" FINAL".into()))
            .unwrap();
        assert_eq!(plain[0].sql, "OPTIMIZE TABLE \"T\" FINAL;");
        let terminated = generator
            .generate_operation(&MigrationOperation::Sql("SELECT 1;".into()))
            .unwrap();
        assert_eq!(terminated[0].sql, "SELECT 1;");
    }
}
