//! Tests for migration SQL generation

use clickguard::schema::{
    ColumnSpec, DictionaryAttribute, DictionaryDefinition, DictionaryLayout, DictionarySource, EngineKind,
    EntityEngineSpec, ExternalSourceRef, MaterializedViewSpec, Model, SkipIndexSpec,
};
use clickguard::types::{AppType, Value};
use clickguard::{ProviderConfig, UnsupportedCategory};
use clickguard_migrate::{Annotations, MigrationOperation, MigrationSqlGenerator};

fn model() -> Model {
    Model::builder()
        .entity(
            EntityEngineSpec::builder("Events")
                .engine(EngineKind::ReplacingMergeTree {
                    version: Some("UpdatedAt".into()),
                    is_deleted: None,
                })
                .column(ColumnSpec::new("Id", AppType::UInt64))
                .column(ColumnSpec::new("Name", AppType::String))
                .column(ColumnSpec::new("UpdatedAt", AppType::DateTime))
                .order_by(["Id"])
                .index("IX_Name", ["Name"], SkipIndexSpec::set(100, 2).unwrap())
                .projection("p_by_name", "SELECT * ORDER BY \"Name\"")
                .build()
                .unwrap(),
        )
        .entity(
            EntityEngineSpec::builder("EventsByName")
                .order_by(["Name"])
                .materialized_view(MaterializedViewSpec {
                    source_table: "Events".into(),
                    source_schema: None,
                    query: "SELECT \"Name\", count() AS \"Total\" FROM \"Events\" GROUP BY \"Name\"".into(),
                    populate: false,
                    target_table: None,
                })
                .build()
                .unwrap(),
        )
        .entity(
            EntityEngineSpec::builder("S3Logs")
                .table_function("s3('https://bucket/logs/*.parquet')")
                .build()
                .unwrap(),
        )
        .entity(
            EntityEngineSpec::builder("Customers")
                .dictionary(
                    DictionaryDefinition::new(
                        DictionarySource::PostgreSql(ExternalSourceRef {
                            profile: "crm".into(),
                            database: Some("crm".into()),
                            table: Some("customers".into()),
                        }),
                        DictionaryLayout::Hashed,
                    )
                    .key(DictionaryAttribute::new("Id", AppType::UInt64))
                    .attribute(DictionaryAttribute::new("Email", AppType::String)),
                )
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

fn generate(op: MigrationOperation) -> Vec<String> {
    let model = model();
    let generator = MigrationSqlGenerator::new(&ProviderConfig::default(), &model);
    generator
        .generate(vec![op])
        .unwrap()
        .into_iter()
        .map(|c| c.sql)
        .collect()
}

fn unsupported(op: MigrationOperation) -> Option<UnsupportedCategory> {
    let model = model();
    let generator = MigrationSqlGenerator::new(&ProviderConfig::default(), &model);
    generator.generate(vec![op]).unwrap_err().unsupported_category()
}

#[test]
fn test_skip_index_scenario() {
    let op = MigrationOperation::CreateIndex {
        table: "T".into(),
        schema: None,
        name: "IX_Tags".into(),
        columns: vec!["Tags".into()],
        unique: false,
        skip: Some(SkipIndexSpec::bloom_filter_with_rate(0.025, 3).unwrap()),
    };
    assert_eq!(
        generate(op),
        vec!["ALTER TABLE \"T\" ADD INDEX IF NOT EXISTS \"IX_Tags\" (\"Tags\") TYPE bloom_filter(0.025) GRANULARITY 3;"]
    );
}

#[test]
fn test_index_defaults_and_entity_fallback() {
    assert_eq!(
        generate(MigrationOperation::create_index("T", "IX_A", ["A"])),
        vec!["ALTER TABLE \"T\" ADD INDEX IF NOT EXISTS \"IX_A\" (\"A\") TYPE minmax GRANULARITY 3;"]
    );
    assert_eq!(
        generate(MigrationOperation::create_index("Events", "IX_Name", Vec::<String>::new())),
        vec!["ALTER TABLE \"Events\" ADD INDEX IF NOT EXISTS \"IX_Name\" (\"Name\") TYPE set(100) GRANULARITY 2;"]
    );
}

#[test]
fn test_create_table_with_projection() {
    assert_eq!(
        generate(MigrationOperation::create_table("Events")),
        vec![
            "CREATE TABLE IF NOT EXISTS \"Events\"\n(\n    \"Id\" UInt64,\n    \"Name\" String,\n    \"UpdatedAt\" DateTime64(3),\n    INDEX \"IX_Name\" (\"Name\") TYPE set(100) GRANULARITY 2\n)\nENGINE = ReplacingMergeTree(\"UpdatedAt\")\nORDER BY (\"Id\");".to_string(),
            "ALTER TABLE \"Events\" ADD PROJECTION IF NOT EXISTS \"p_by_name\" (SELECT * ORDER BY \"Name\");".to_string(),
        ]
    );
}

#[test]
fn test_create_table_without_entity_uses_operation_columns() {
    let op = MigrationOperation::CreateTable {
        table: "Scratch".into(),
        schema: Some("tmp".into()),
        columns: vec![ColumnSpec::new("Id", AppType::Int32)],
    };
    assert_eq!(
        generate(op),
        vec!["CREATE TABLE IF NOT EXISTS \"tmp\".\"Scratch\"\n(\n    \"Id\" Int32\n)\nENGINE = MergeTree()\nORDER BY tuple();"]
    );

    let model = model();
    let generator = MigrationSqlGenerator::new(&ProviderConfig::default(), &model);
    assert!(generator.generate(vec![MigrationOperation::create_table("Unknown")]).is_err());
}

#[test]
fn test_create_branches_by_entity_kind() {
    let view = generate(MigrationOperation::create_table("EventsByName"));
    assert_eq!(view.len(), 1);
    assert!(view[0].starts_with("CREATE MATERIALIZED VIEW IF NOT EXISTS \"EventsByName\"\nENGINE = MergeTree()"));
    assert!(view[0].ends_with("GROUP BY \"Name\";"));

    assert!(generate(MigrationOperation::create_table("S3Logs")).is_empty());

    let dictionary = generate(MigrationOperation::create_table("Customers"));
    assert_eq!(dictionary.len(), 1);
    assert!(dictionary[0].starts_with("-- "));
    assert!(dictionary[0].ends_with(';'));
    assert!(!dictionary[0].contains("PASSWORD"));
}

#[test]
fn test_drop_table_by_entity_kind() {
    let drop = |table: &str| {
        generate(MigrationOperation::DropTable {
            table: table.into(),
            schema: None,
        })
    };
    assert_eq!(drop("Events"), vec!["DROP TABLE IF EXISTS \"Events\";"]);
    assert_eq!(drop("EventsByName"), vec!["DROP VIEW IF EXISTS \"EventsByName\";"]);
    assert_eq!(drop("Customers"), vec!["DROP DICTIONARY IF EXISTS \"Customers\";"]);
    assert!(drop("S3Logs").is_empty());
}

#[test]
fn test_column_operations() {
    let column = ColumnSpec::new("Note", AppType::nullable(AppType::String))
        .materialized("lower(\"Name\")")
        .default_expr("''")
        .codec("ZSTD(3)");
    assert_eq!(
        generate(MigrationOperation::add_column("Events", column.clone())),
        vec!["ALTER TABLE \"Events\" ADD COLUMN IF NOT EXISTS \"Note\" Nullable(String) MATERIALIZED lower(\"Name\") CODEC(ZSTD(3));"]
    );
    assert_eq!(
        generate(MigrationOperation::AlterColumn {
            table: "Events".into(),
            schema: None,
            column: ColumnSpec::new("Name", AppType::String).alias("concat(\"Id\", '')"),
            annotations: Annotations::new(),
        }),
        vec!["ALTER TABLE \"Events\" MODIFY COLUMN \"Name\" String ALIAS concat(\"Id\", '');"]
    );
    assert_eq!(
        generate(MigrationOperation::DropColumn {
            table: "Events".into(),
            schema: None,
            name: "Note".into(),
        }),
        vec!["ALTER TABLE \"Events\" DROP COLUMN IF EXISTS \"Note\";"]
    );
}

#[test]
fn test_identity_annotation_fails() {
    let mut annotations = Annotations::new();
    annotations.insert("Npgsql:ValueGenerationStrategy".into(), "IdentityByDefaultColumn".into());
    let op = MigrationOperation::AddColumn {
        table: "Events".into(),
        schema: None,
        column: ColumnSpec::new("Seq", AppType::Int64),
        annotations,
    };
    assert_eq!(unsupported(op), Some(UnsupportedCategory::Identity));
}

#[test]
fn test_comment_mentioning_serial_is_not_identity() {
    let mut annotations = Annotations::new();
    annotations.insert("Relational:Comment".into(), "Serial number of the device".into());
    let op = MigrationOperation::AddColumn {
        table: "Events".into(),
        schema: None,
        column: ColumnSpec::new("DeviceSerial", AppType::String),
        annotations,
    };
    assert_eq!(
        generate(op),
        vec!["ALTER TABLE \"Events\" ADD COLUMN IF NOT EXISTS \"DeviceSerial\" String;"]
    );
}

#[test]
fn test_unsupported_operations_always_fail() {
    let cases = vec![
        (
            MigrationOperation::AddForeignKey {
                table: "A".into(),
                schema: None,
                name: "FK_A_B".into(),
                columns: vec!["BId".into()],
                principal_table: "B".into(),
                principal_columns: vec!["Id".into()],
            },
            UnsupportedCategory::ForeignKey,
        ),
        (
            MigrationOperation::DropForeignKey {
                table: "A".into(),
                schema: None,
                name: "FK_A_B".into(),
            },
            UnsupportedCategory::ForeignKey,
        ),
        (
            MigrationOperation::AddPrimaryKey {
                table: "A".into(),
                schema: None,
                name: "PK_A".into(),
                columns: vec!["Id".into()],
            },
            UnsupportedCategory::PrimaryKey,
        ),
        (
            MigrationOperation::DropPrimaryKey {
                table: "A".into(),
                schema: None,
                name: "PK_A".into(),
            },
            UnsupportedCategory::PrimaryKey,
        ),
        (
            MigrationOperation::RenameColumn {
                table: "A".into(),
                schema: None,
                name: "Old".into(),
                new_name: "New".into(),
            },
            UnsupportedCategory::ColumnRename,
        ),
        (
            MigrationOperation::CreateIndex {
                table: "A".into(),
                schema: None,
                name: "UX_A".into(),
                columns: vec!["Email".into()],
                unique: true,
                skip: None,
            },
            UnsupportedCategory::UniqueConstraint,
        ),
        (
            MigrationOperation::UpdateData {
                table: "A".into(),
                schema: None,
            },
            UnsupportedCategory::Update,
        ),
        (
            MigrationOperation::DeleteData {
                table: "A".into(),
                schema: None,
            },
            UnsupportedCategory::Update,
        ),
    ];
    for (op, category) in cases {
        let kind = op.kind();
        assert_eq!(unsupported(op), Some(category), "{kind}");
    }
}

#[test]
fn test_rename_and_projection_statements() {
    assert_eq!(
        generate(MigrationOperation::RenameTable {
            table: "Old".into(),
            schema: Some("db".into()),
            new_name: "New".into(),
            new_schema: None,
        }),
        vec!["RENAME TABLE \"db\".\"Old\" TO \"db\".\"New\";"]
    );
    assert_eq!(
        generate(MigrationOperation::MaterializeProjection {
            table: "Events".into(),
            schema: None,
            name: "p_by_name".into(),
            partition: Some("202401".into()),
            if_exists: true,
        }),
        vec!["ALTER TABLE \"Events\" MATERIALIZE PROJECTION IF EXISTS \"p_by_name\" IN PARTITION 202401;"]
    );
    assert_eq!(
        generate(MigrationOperation::DropProjection {
            table: "Events".into(),
            schema: None,
            name: "p_by_name".into(),
            if_exists: false,
        }),
        vec!["ALTER TABLE \"Events\" DROP PROJECTION \"p_by_name\";"]
    );
}

#[test]
fn test_cluster_and_terminator() {
    let config = ProviderConfig {
        cluster: Some("main".into()),
        statement_terminator: "\n;".into(),
        ..ProviderConfig::default()
    };
    let model = model();
    let generator = MigrationSqlGenerator::new(&config, &model);
    let commands = generator
        .generate(vec![
            MigrationOperation::EnsureSchema { name: "analytics".into() },
            MigrationOperation::DropIndex {
                table: "Events".into(),
                schema: None,
                name: "IX_Name".into(),
            },
        ])
        .unwrap();
    assert_eq!(commands[0].sql, "CREATE DATABASE IF NOT EXISTS \"analytics\" ON CLUSTER \"main\"\n;");
    assert_eq!(
        commands[1].sql,
        "ALTER TABLE \"Events\" ON CLUSTER \"main\" DROP INDEX IF EXISTS \"IX_Name\"\n;"
    );

    let dictionaries = Model::builder()
        .entity(
            EntityEngineSpec::builder("Dict")
                .dictionary(
                    DictionaryDefinition::new(
                        DictionarySource::ClickHouse {
                            table: "countries".into(),
                            database: None,
                        },
                        DictionaryLayout::Hashed,
                    )
                    .key(DictionaryAttribute::new("Id", AppType::UInt64))
                    .attribute(DictionaryAttribute::new("Name", AppType::String)),
                )
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let commands = MigrationSqlGenerator::new(&config, &dictionaries)
        .generate(vec![MigrationOperation::create_table("Dict")])
        .unwrap();
    assert!(commands[0]
        .sql
        .starts_with("CREATE DICTIONARY IF NOT EXISTS \"Dict\" ON CLUSTER \"main\"\n("));
}

#[test]
fn test_insert_data() {
    let op = MigrationOperation::InsertData {
        table: "Events".into(),
        schema: None,
        columns: vec!["Id".into(), "Name".into()],
        rows: vec![
            vec![Value::UInt(1), Value::from("a")],
            vec![Value::UInt(2), Value::from("it's")],
        ],
    };
    assert_eq!(
        generate(op),
        vec!["INSERT INTO \"Events\" (\"Id\", \"Name\") VALUES\n(1, 'a'),\n(2, 'it\\'s');"]
    );

    let model = model();
    let generator = MigrationSqlGenerator::new(&ProviderConfig::default(), &model);
    let null_into_required = MigrationOperation::InsertData {
        table: "Events".into(),
        schema: None,
        columns: vec!["Name".into()],
        rows: vec![vec![Value::Null]],
    };
    assert!(generator.generate(vec![null_into_required]).is_err());
}

#[test]
fn test_generate_sorts_before_rendering() {
    let model = model();
    let generator = MigrationSqlGenerator::new(&ProviderConfig::default(), &model);
    let commands = generator
        .generate(vec![
            MigrationOperation::create_table("EventsByName"),
            MigrationOperation::create_table("Events"),
        ])
        .unwrap();
    assert!(commands[0].sql.starts_with("CREATE TABLE IF NOT EXISTS \"Events\""));
    assert!(commands[1].sql.starts_with("ALTER TABLE \"Events\" ADD PROJECTION"));
    assert!(commands[2].sql.starts_with("CREATE MATERIALIZED VIEW"));
    assert!(commands.iter().all(|c| c.sql.ends_with(';')));
}
