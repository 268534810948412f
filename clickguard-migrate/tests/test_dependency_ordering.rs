//! Tests for migration operation dependency ordering

use clickguard::schema::{
    ColumnSpec, DictionaryAttribute, DictionaryDefinition, DictionaryLayout, DictionarySource, EntityEngineSpec,
    MaterializedViewSpec, Model,
};
use clickguard::types::AppType;
use clickguard::{ClickguardError, CyclePolicy};
use clickguard_migrate::{operation_dependencies, sort_operations, MigrationOperation};

fn view_of(name: &str, source: &str) -> EntityEngineSpec {
    EntityEngineSpec::builder(name)
        .order_by(["Id"])
        .materialized_view(MaterializedViewSpec {
            source_table: source.to_string(),
            source_schema: None,
            query: format!("SELECT \"Id\" FROM \"{source}\""),
            populate: false,
            target_table: None,
        })
        .build()
        .unwrap()
}

fn tables(ops: &[MigrationOperation]) -> Vec<(&'static str, String)> {
    ops.iter()
        .map(|op| (op.kind(), op.table().unwrap_or_default().to_string()))
        .collect()
}

#[test]
fn test_view_and_column_follow_source_table() {
    let model = Model::builder().entity(view_of("B", "A")).build().unwrap();
    let ops = vec![
        MigrationOperation::create_table("B"),
        MigrationOperation::add_column("A", ColumnSpec::new("Extra", AppType::Int32)),
        MigrationOperation::create_table("A"),
    ];

    let sorted = sort_operations(ops, &model, CyclePolicy::PreserveOrder).unwrap();
    assert_eq!(
        tables(&sorted),
        vec![
            ("CreateTable", "A".to_string()),
            ("CreateTable", "B".to_string()),
            ("AddColumn", "A".to_string()),
        ]
    );
}

#[test]
fn test_layers_keep_original_order() {
    let model = Model::builder()
        .entity(view_of("V1", "Base"))
        .entity(view_of("V2", "Base"))
        .build()
        .unwrap();
    let ops = vec![
        MigrationOperation::create_table("V2"),
        MigrationOperation::create_table("Other"),
        MigrationOperation::create_table("V1"),
        MigrationOperation::create_table("Base"),
    ];

    let sorted = sort_operations(ops, &model, CyclePolicy::PreserveOrder).unwrap();
    let names: Vec<_> = sorted.iter().filter_map(|op| op.table()).collect();
    assert_eq!(names, vec!["Other", "Base", "V2", "V1"]);
}

#[test]
fn test_dictionary_depends_on_clickhouse_source() {
    let dictionary = DictionaryDefinition::new(
        DictionarySource::ClickHouse {
            table: "Countries".into(),
            database: None,
        },
        DictionaryLayout::Hashed,
    )
    .key(DictionaryAttribute::new("Id", AppType::UInt64))
    .attribute(DictionaryAttribute::new("Name", AppType::String));
    let model = Model::builder()
        .entity(
            EntityEngineSpec::builder("CountryDict")
                .dictionary(dictionary)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let op = MigrationOperation::create_table("CountryDict");
    assert_eq!(operation_dependencies(&op, &model), vec!["Countries".to_string()]);

    let sorted = sort_operations(
        vec![op, MigrationOperation::create_table("Countries")],
        &model,
        CyclePolicy::Fail,
    )
    .unwrap();
    assert_eq!(sorted[0].table(), Some("Countries"));
}

#[test]
fn test_drop_then_recreate_keeps_order() {
    let ops = vec![
        MigrationOperation::DropTable {
            table: "A".into(),
            schema: None,
        },
        MigrationOperation::create_table("A"),
    ];
    let sorted = sort_operations(ops.clone(), &Model::default(), CyclePolicy::Fail).unwrap();
    assert_eq!(sorted, ops);
}

#[test]
fn test_cycle_policy() {
    let model = Model::builder()
        .entity(view_of("X", "Y"))
        .entity(view_of("Y", "X"))
        .build()
        .unwrap();
    let ops = vec![
        MigrationOperation::create_table("Z"),
        MigrationOperation::create_table("Y"),
        MigrationOperation::create_table("X"),
    ];

    let sorted = sort_operations(ops.clone(), &model, CyclePolicy::PreserveOrder).unwrap();
    assert_eq!(sorted, ops);

    let err = sort_operations(ops, &model, CyclePolicy::Fail).unwrap_err();
    assert!(matches!(err, ClickguardError::ConfigurationValidation { .. }));
    assert!(err.to_string().contains("Y, X"));
}
