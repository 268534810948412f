//! Migration history table management
//!
//! The history table has two columns, `migration_id` and `product_version`, and uses
//! `MergeTree` ordered by `migration_id`. With a cluster configured it becomes
//! `ReplicatedMergeTree` and is created `ON CLUSTER`.

use clickguard::executor::SqlExecutor;
use clickguard::schema::{build_create_table, on_cluster, ColumnSpec, EntityEngineSpec};
use clickguard::types::{AppType, TypeMapper};
use clickguard::{ClickguardError, ProviderConfig, SqlHelper, UnsupportedCategory};

const MIGRATION_ID: &str = "migration_id";
const PRODUCT_VERSION: &str = "product_version";

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub migration_id: String,
    pub product_version: String,
}

impl HistoryRow {
    pub fn new(migration_id: impl Into<String>, product_version: impl Into<String>) -> Self {
        Self {
            migration_id: migration_id.into(),
            product_version: product_version.into(),
        }
    }
}

/// Scripts and executor helpers for the migration history table.
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    table: String,
    database: Option<String>,
    cluster: Option<String>,
    replication_path: String,
    replica_name: String,
    mapper: TypeMapper,
    helper: SqlHelper,
}

impl HistoryRepository {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            table: config.history_table.clone(),
            database: config.database.clone(),
            cluster: config.cluster.clone(),
            replication_path: config.replication_path.clone(),
            replica_name: config.replica_name.clone(),
            mapper: TypeMapper::from_config(config),
            helper: config.sql_helper(),
        }
    }

    /// Quoted, database-qualified table name.
    pub fn table_name(&self) -> String {
        self.helper.delimit_identifier(&self.table, self.database.as_deref())
    }

    fn entity(&self) -> Result<EntityEngineSpec, ClickguardError> {
        let mut builder = EntityEngineSpec::builder(&self.table)
            .column(ColumnSpec::new(MIGRATION_ID, AppType::String))
            .column(ColumnSpec::new(PRODUCT_VERSION, AppType::String))
            .order_by([MIGRATION_ID]);
        if let Some(database) = &self.database {
            builder = builder.schema(database);
        }
        if self.cluster.is_some() {
            builder = builder.replicated(&self.replication_path, &self.replica_name);
        }
        builder.build()
    }

    /// `CREATE TABLE IF NOT EXISTS` for the history table.
    pub fn create_script(&self) -> Result<String, ClickguardError> {
        let sql = build_create_table(&self.entity()?, &self.mapper, &self.helper, self.cluster.as_deref())?;
        Ok(self.helper.terminate(&sql))
    }

    /// Same as [`create_script`](Self::create_script); the statement is already idempotent.
    pub fn create_if_not_exists_script(&self) -> Result<String, ClickguardError> {
        self.create_script()
    }

    /// Probe returning one row when the history table exists.
    pub fn exists_sql(&self) -> String {
        let database = match &self.database {
            Some(database) => self.helper.string_literal(database),
            None => "currentDatabase()".to_string(),
        };
        self.helper.terminate(&format!(
            "SELECT 1 FROM system.tables WHERE database = {} AND name = {}",
            database,
            self.helper.string_literal(&self.table)
        ))
    }

    pub fn applied_migrations_sql(&self) -> String {
        self.helper.terminate(&format!(
            "SELECT {id}, {version} FROM {table} ORDER BY {id}",
            id = self.helper.delimit_identifier(MIGRATION_ID, None),
            version = self.helper.delimit_identifier(PRODUCT_VERSION, None),
            table = self.table_name()
        ))
    }

    pub fn insert_script(&self, row: &HistoryRow) -> String {
        self.helper.terminate(&format!(
            "INSERT INTO {} ({}) VALUES ({}, {})",
            self.table_name(),
            self.helper
                .delimit_column_list(&[MIGRATION_ID.to_string(), PRODUCT_VERSION.to_string()]),
            self.helper.string_literal(&row.migration_id),
            self.helper.string_literal(&row.product_version)
        ))
    }

    /// Lightweight delete of one history row, used when reverting a migration.
    pub fn delete_script(&self, migration_id: &str) -> String {
        self.helper.terminate(&format!(
            "DELETE FROM {}{} WHERE {} = {}",
            self.table_name(),
            on_cluster(self.cluster.as_deref(), &self.helper),
            self.helper.delimit_identifier(MIGRATION_ID, None),
            self.helper.string_literal(migration_id)
        ))
    }

    /// Conditional script blocks need procedural SQL, which ClickHouse lacks.
    pub fn begin_if_not_exists_script(&self, migration_id: &str) -> Result<String, ClickguardError> {
        Err(ClickguardError::unsupported(UnsupportedCategory::Transaction)
            .table(self.table.clone())
            .object(format!("idempotent script block for {migration_id}"))
            .workaround("Generate plain scripts; every DDL statement already uses IF [NOT] EXISTS")
            .into())
    }

    /// There is no table lock to take. Always fails.
    pub fn acquire_lock(&self, _executor: &dyn SqlExecutor) -> Result<(), ClickguardError> {
        Err(ClickguardError::unsupported(UnsupportedCategory::Transaction)
            .table(self.table.clone())
            .object("migration lock")
            .workaround("Run migrations from a single process, e.g. a deployment job")
            .into())
    }

    pub fn exists(&self, executor: &dyn SqlExecutor) -> Result<bool, ClickguardError> {
        Ok(!executor.query_rows(&self.exists_sql())?.is_empty())
    }

    /// Create the history table unless it already exists. Returns whether it was created.
    pub fn ensure_created(&self, executor: &dyn SqlExecutor) -> Result<bool, ClickguardError> {
        if self.exists(executor)? {
            return Ok(false);
        }
        log::info!("Creating migration history table {}", self.table_name());
        executor.execute(&self.create_script()?)?;
        Ok(true)
    }

    /// Applied migrations in id order; empty when the table does not exist yet.
    pub fn applied_migrations(&self, executor: &dyn SqlExecutor) -> Result<Vec<HistoryRow>, ClickguardError> {
        if !self.exists(executor)? {
            return Ok(Vec::new());
        }
        executor
            .query_rows(&self.applied_migrations_sql())?
            .into_iter()
            .map(|row| match row.as_slice() {
                [id, version, ..] => Ok(HistoryRow::new(id.clone(), version.clone())),
                _ => Err(ClickguardError::Execution(format!(
                    "history row has {} column(s), expected 2",
                    row.len()
                ))),
            })
            .collect()
    }

    pub fn record(&self, executor: &dyn SqlExecutor, row: &HistoryRow) -> Result<(), ClickguardError> {
        executor.execute(&self.insert_script(row))?;
        Ok(())
    }
}
