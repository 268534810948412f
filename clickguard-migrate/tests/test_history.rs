//! Tests for the migration history repository

use std::cell::RefCell;

use clickguard::executor::SqlExecutor;
use clickguard::{ClickguardError, ProviderConfig, UnsupportedCategory};
use clickguard_migrate::{HistoryRepository, HistoryRow};

/// Records executed statements and answers queries from canned rows.
#[derive(Default)]
struct MockExecutor {
    executed: RefCell<Vec<String>>,
    table_exists: bool,
    rows: Vec<Vec<String>>,
}

impl SqlExecutor for MockExecutor {
    fn execute(&self, sql: &str) -> Result<u64, ClickguardError> {
        self.executed.borrow_mut().push(sql.to_string());
        Ok(1)
    }

    fn query_rows(&self, sql: &str) -> Result<Vec<Vec<String>>, ClickguardError> {
        if sql.contains("system.tables") {
            return Ok(if self.table_exists {
                vec![vec!["1".to_string()]]
            } else {
                Vec::new()
            });
        }
        Ok(self.rows.clone())
    }
}

#[test]
fn test_create_script_uses_merge_tree() {
    let repository = HistoryRepository::new(&ProviderConfig::default());
    assert_eq!(
        repository.create_script().unwrap(),
        "CREATE TABLE IF NOT EXISTS \"__migrations_history\"\n(\n    \"migration_id\" String,\n    \"product_version\" String\n)\nENGINE = MergeTree()\nORDER BY (\"migration_id\");"
    );
    assert_eq!(
        repository.create_if_not_exists_script().unwrap(),
        repository.create_script().unwrap()
    );
}

#[test]
fn test_cluster_makes_history_replicated() {
    let config = ProviderConfig {
        database: Some("app".into()),
        cluster: Some("main".into()),
        ..ProviderConfig::default()
    };
    let script = HistoryRepository::new(&config).create_script().unwrap();
    assert!(script.starts_with("CREATE TABLE IF NOT EXISTS \"app\".\"__migrations_history\" ON CLUSTER \"main\"\n"));
    assert!(script.contains(
        "ENGINE = ReplicatedMergeTree('/clickhouse/tables/{shard}/{database}/{table}', '{replica}')"
    ));
}

#[test]
fn test_exists_and_applied_sql() {
    let repository = HistoryRepository::new(&ProviderConfig::default());
    assert_eq!(
        repository.exists_sql(),
        "SELECT 1 FROM system.tables WHERE database = currentDatabase() AND name = '__migrations_history';"
    );

    let config = ProviderConfig {
        database: Some("app".into()),
        ..ProviderConfig::default()
    };
    let repository = HistoryRepository::new(&config);
    assert!(repository.exists_sql().contains("database = 'app'"));
    assert_eq!(
        repository.applied_migrations_sql(),
        "SELECT \"migration_id\", \"product_version\" FROM \"app\".\"__migrations_history\" ORDER BY \"migration_id\";"
    );
}

#[test]
fn test_insert_and_delete_scripts() {
    let repository = HistoryRepository::new(&ProviderConfig::default());
    assert_eq!(
        repository.insert_script(&HistoryRow::new("20240101_Init", "1.0.0")),
        "INSERT INTO \"__migrations_history\" (\"migration_id\", \"product_version\") VALUES ('20240101_Init', '1.0.0');"
    );
    assert_eq!(
        repository.delete_script("20240101_Init"),
        "DELETE FROM \"__migrations_history\" WHERE \"migration_id\" = '20240101_Init';"
    );
}

#[test]
fn test_ensure_created_only_when_missing() {
    let repository = HistoryRepository::new(&ProviderConfig::default());

    let missing = MockExecutor::default();
    assert!(repository.ensure_created(&missing).unwrap());
    assert_eq!(missing.executed.borrow().len(), 1);
    assert!(missing.executed.borrow()[0].starts_with("CREATE TABLE IF NOT EXISTS"));

    let present = MockExecutor {
        table_exists: true,
        ..MockExecutor::default()
    };
    assert!(!repository.ensure_created(&present).unwrap());
    assert!(present.executed.borrow().is_empty());
}

#[test]
fn test_applied_migrations() {
    let repository = HistoryRepository::new(&ProviderConfig::default());

    assert!(repository.applied_migrations(&MockExecutor::default()).unwrap().is_empty());

    let executor = MockExecutor {
        table_exists: true,
        rows: vec![
            vec!["20240101_Init".into(), "1.0.0".into()],
            vec!["20240201_AddEvents".into(), "1.1.0".into()],
        ],
        ..MockExecutor::default()
    };
    assert_eq!(
        repository.applied_migrations(&executor).unwrap(),
        vec![
            HistoryRow::new("20240101_Init", "1.0.0"),
            HistoryRow::new("20240201_AddEvents", "1.1.0"),
        ]
    );

    let short = MockExecutor {
        table_exists: true,
        rows: vec![vec!["only_id".into()]],
        ..MockExecutor::default()
    };
    assert!(matches!(
        repository.applied_migrations(&short),
        Err(ClickguardError::Execution(_))
    ));
}

#[test]
fn test_record_executes_insert() {
    let repository = HistoryRepository::new(&ProviderConfig::default());
    let executor = MockExecutor::default();
    repository.record(&executor, &HistoryRow::new("m1", "1.0.0")).unwrap();
    assert_eq!(
        executor.executed.borrow().as_slice(),
        [repository.insert_script(&HistoryRow::new("m1", "1.0.0"))]
    );
}

#[test]
fn test_locking_and_script_blocks_are_unsupported() {
    let repository = HistoryRepository::new(&ProviderConfig::default());
    let executor = MockExecutor::default();

    let lock = repository.acquire_lock(&executor).unwrap_err();
    assert_eq!(lock.unsupported_category(), Some(UnsupportedCategory::Transaction));
    assert!(executor.executed.borrow().is_empty());

    let block = repository.begin_if_not_exists_script("m1").unwrap_err();
    assert_eq!(block.unsupported_category(), Some(UnsupportedCategory::Transaction));
}
