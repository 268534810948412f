//! Engine and DDL clause builder.
//!
//! Renders the parts of `CREATE TABLE`, `CREATE MATERIALIZED VIEW` and `CREATE DICTIONARY`
//! that come from entity metadata. Engine clauses are emitted in the order ClickHouse
//! requires: ENGINE, PARTITION BY, ORDER BY, PRIMARY KEY, SAMPLE BY, TTL, SETTINGS.

use crate::error::ClickguardError;
use crate::schema::dictionary::DictionaryDefinition;
use crate::schema::engine::{ColumnSpec, EntityEngineSpec, IndexSpec, MaterializedViewSpec};
use crate::sql_helper::SqlHelper;
use crate::types::TypeMapper;

/// Build the engine clause for a table or an inner materialized-view table.
///
/// ```
/// use clickguard::schema::{build_engine_clause, EngineKind, EntityEngineSpec};
/// use clickguard::SqlHelper;
///
/// let spec = EntityEngineSpec::builder("events")
///     .engine(EngineKind::ReplacingMergeTree { version: Some("UpdatedAt".into()), is_deleted: None })
///     .order_by(["Id"])
///     .build()
///     .unwrap();
/// assert_eq!(
///     build_engine_clause(&spec, &SqlHelper::default()),
///     "ENGINE = ReplacingMergeTree(\"UpdatedAt\")\nORDER BY (\"Id\")"
/// );
/// ```
pub fn build_engine_clause(spec: &EntityEngineSpec, helper: &SqlHelper) -> String {
    let mut lines = vec![format!("ENGINE = {}", spec.engine_expression(helper))];

    if spec.engine.is_merge_tree_family() {
        if let Some(partition) = &spec.partition_by {
            lines.push(format!("PARTITION BY {partition}"));
        }

        let order_by = spec.effective_order_by();
        if order_by.is_empty() {
            lines.push("ORDER BY tuple()".to_string());
        } else {
            lines.push(format!("ORDER BY ({})", helper.delimit_column_list(order_by)));
        }

        if !spec.primary_key.is_empty() && spec.primary_key.as_slice() != order_by {
            lines.push(format!("PRIMARY KEY ({})", helper.delimit_column_list(&spec.primary_key)));
        }
        if let Some(sample) = &spec.sample_by {
            lines.push(format!("SAMPLE BY {sample}"));
        }
        if let Some(ttl) = &spec.ttl {
            lines.push(format!("TTL {ttl}"));
        }
    }

    if !spec.settings.is_empty() {
        let settings = spec
            .settings
            .iter()
            .map(|(key, value)| format!("{} = {}", key, render_setting_value(value, helper)))
            .collect::<Vec<_>>();
        lines.push(format!("SETTINGS {}", settings.join(", ")));
    }

    lines.join("\n")
}

/// Numbers and booleans go in bare; anything else becomes a string literal. Surrounding
/// single quotes are treated as delimiters and the text between them is escaped.
pub fn render_setting_value(value: &str, helper: &SqlHelper) -> String {
    let trimmed = value.trim();
    if trimmed.parse::<f64>().is_ok() || matches!(trimmed, "true" | "false") {
        return trimmed.to_string();
    }
    let inner = match trimmed.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
        Some(inner) => inner,
        None => trimmed,
    };
    helper.string_literal(inner)
}

/// `"name" Type [MATERIALIZED|ALIAS|DEFAULT expr] [CODEC(...)] [COMMENT '...']`.
///
/// Only the first of materialized, alias and default expression is used. A
/// default-for-null override acts as the default when no expression is set.
pub fn build_column_definition(
    column: &ColumnSpec,
    mapper: &TypeMapper,
    helper: &SqlHelper,
) -> Result<String, ClickguardError> {
    let column_type = mapper.resolve(&column.app_type, &column.type_config)?;
    let mut sql = format!("{} {}", helper.delimit_identifier(&column.name, None), column_type);

    if let Some(expr) = &column.materialized {
        sql.push_str(&format!(" MATERIALIZED {expr}"));
    } else if let Some(expr) = &column.alias {
        sql.push_str(&format!(" ALIAS {expr}"));
    } else if let Some(expr) = &column.default_expr {
        sql.push_str(&format!(" DEFAULT {expr}"));
    } else if let Some(value) = &column.type_config.default_for_null {
        if column.app_type.is_nullable() {
            sql.push_str(&format!(" DEFAULT {value}"));
        }
    }

    if let Some(codec) = &column.codec {
        sql.push_str(&format!(" CODEC({codec})"));
    }
    if let Some(comment) = &column.comment {
        sql.push_str(&format!(" COMMENT {}", helper.string_literal(comment)));
    }
    Ok(sql)
}

/// `INDEX "name" ("col", ...) TYPE ... GRANULARITY n`, as used inside a column list.
pub fn build_index_definition(index: &IndexSpec, helper: &SqlHelper) -> String {
    format!(
        "INDEX {} ({}) {}",
        helper.delimit_identifier(&index.name, None),
        helper.delimit_column_list(&index.columns),
        index.skip.render()
    )
}

/// ` ON CLUSTER "name"` when a cluster is configured, else empty.
pub fn on_cluster(cluster: Option<&str>, helper: &SqlHelper) -> String {
    cluster
        .map(|c| format!(" ON CLUSTER {}", helper.delimit_identifier(c, None)))
        .unwrap_or_default()
}

/// `CREATE TABLE IF NOT EXISTS` with columns, inline skip indexes and the engine clause.
pub fn build_create_table(
    spec: &EntityEngineSpec,
    mapper: &TypeMapper,
    helper: &SqlHelper,
    cluster: Option<&str>,
) -> Result<String, ClickguardError> {
    let mut body = spec
        .columns
        .iter()
        .map(|c| build_column_definition(c, mapper, helper))
        .collect::<Result<Vec<_>, _>>()?;
    body.extend(spec.indexes.iter().map(|i| build_index_definition(i, helper)));

    if body.is_empty() {
        return Err(ClickguardError::invalid_config(
            format!("columns on {}", spec.table),
            "none",
            "at least one column",
        ));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {}{}\n(\n    {}\n)\n{}",
        helper.delimit_identifier(&spec.table, spec.schema.as_deref()),
        on_cluster(cluster, helper),
        body.join(",\n    "),
        build_engine_clause(spec, helper)
    ))
}

/// `CREATE MATERIALIZED VIEW ... [TO target | engine [POPULATE]] AS SELECT ...`.
pub fn build_materialized_view(
    spec: &EntityEngineSpec,
    view: &MaterializedViewSpec,
    helper: &SqlHelper,
    cluster: Option<&str>,
) -> String {
    let mut sql = format!(
        "CREATE MATERIALIZED VIEW IF NOT EXISTS {}{}",
        helper.delimit_identifier(&spec.table, spec.schema.as_deref()),
        on_cluster(cluster, helper)
    );
    match &view.target_table {
        Some(target) => {
            sql.push_str(&format!("\nTO {}", helper.delimit_identifier(target, spec.schema.as_deref())));
        }
        None => {
            sql.push('\n');
            sql.push_str(&build_engine_clause(spec, helper));
            if view.populate {
                sql.push_str("\nPOPULATE");
            }
        }
    }
    sql.push_str(&format!("\nAS {}", view.query.trim()));
    sql
}

/// `CREATE DICTIONARY` for a ClickHouse-sourced dictionary.
pub fn build_dictionary(
    spec: &EntityEngineSpec,
    definition: &DictionaryDefinition,
    mapper: &TypeMapper,
    helper: &SqlHelper,
    cluster: Option<&str>,
) -> Result<String, ClickguardError> {
    let source = definition.clickhouse_source_clause(helper)?;
    let name = format!(
        "{}{}",
        helper.delimit_identifier(&spec.table, spec.schema.as_deref()),
        on_cluster(cluster, helper)
    );
    definition.create_statement(&name, &source, mapper, helper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::engine::EngineKind;
    use crate::schema::skip_index::SkipIndexSpec;
    use crate::types::{AppType, TypeConfig};

    fn helper() -> SqlHelper {
        SqlHelper::default()
    }

    #[test]
    fn test_replacing_merge_tree_clause() {
        let spec = EntityEngineSpec::builder("T")
            .engine(EngineKind::ReplacingMergeTree {
                version: Some("UpdatedAt".into()),
                is_deleted: None,
            })
            .order_by(["Id"])
            .build()
            .unwrap();
        assert_eq!(
            build_engine_clause(&spec, &helper()),
            "ENGINE = ReplacingMergeTree(\"UpdatedAt\")\nORDER BY (\"Id\")"
        );
    }

    #[test]
    fn test_clause_order_is_fixed() {
        let spec = EntityEngineSpec::builder("events")
            .order_by(["UserId", "Ts"])
            .primary_key(["UserId"])
            .partition_by("toYYYYMM(\"Ts\")")
            .sample_by("intHash32(\"UserId\")")
            .ttl("\"Ts\" + INTERVAL 30 DAY")
            .setting("storage_policy", "hot_cold")
            .setting("index_granularity", "8192")
            .build()
            .unwrap();
        assert_eq!(
            build_engine_clause(&spec, &helper()),
            "ENGINE = MergeTree()\n\
             PARTITION BY toYYYYMM(\"Ts\")\n\
             ORDER BY (\"UserId\", \"Ts\")\n\
             PRIMARY KEY (\"UserId\")\n\
             SAMPLE BY intHash32(\"UserId\")\n\
             TTL \"Ts\" + INTERVAL 30 DAY\n\
             SETTINGS index_granularity = 8192, storage_policy = 'hot_cold'"
        );
    }

    #[test]
    fn test_order_by_defaults() {
        let from_pk = EntityEngineSpec::builder("t").primary_key(["Id"]).build().unwrap();
        assert_eq!(
            build_engine_clause(&from_pk, &helper()),
            "ENGINE = MergeTree()\nORDER BY (\"Id\")"
        );
        let bare = EntityEngineSpec::builder("t").build().unwrap();
        assert_eq!(build_engine_clause(&bare, &helper()), "ENGINE = MergeTree()\nORDER BY tuple()");
    }

    #[test]
    fn test_non_merge_tree_engine_has_no_sorting_clauses() {
        let spec = EntityEngineSpec::builder("buf")
            .engine(EngineKind::Memory)
            .setting("min_rows_to_keep", "100")
            .build()
            .unwrap();
        assert_eq!(
            build_engine_clause(&spec, &helper()),
            "ENGINE = Memory\nSETTINGS min_rows_to_keep = 100"
        );
    }

    #[test]
    fn test_column_definition_expressions_first_match_wins() {
        let mapper = TypeMapper::default();
        let column = ColumnSpec::new("Total", AppType::Decimal)
            .materialized("\"Price\" * \"Qty\"")
            .default_expr("0")
            .codec("ZSTD(3)")
            .comment("line total");
        assert_eq!(
            build_column_definition(&column, &mapper, &helper()).unwrap(),
            "\"Total\" Decimal(18, 4) MATERIALIZED \"Price\" * \"Qty\" CODEC(ZSTD(3)) COMMENT 'line total'"
        );
    }

    #[test]
    fn test_column_default_for_null() {
        let column = ColumnSpec::new("Score", AppType::nullable(AppType::Int32))
            .config(TypeConfig::default().default_for_null("0"));
        assert_eq!(
            build_column_definition(&column, &TypeMapper::default(), &helper()).unwrap(),
            "\"Score\" Int32 DEFAULT 0"
        );
    }

    #[test]
    fn test_create_table_with_inline_index() {
        let spec = EntityEngineSpec::builder("T")
            .schema("shop")
            .column(ColumnSpec::new("Id", AppType::UInt64))
            .column(ColumnSpec::new("Tags", AppType::array(AppType::String)))
            .index("IX_Tags", ["Tags"], SkipIndexSpec::bloom_filter_with_rate(0.025, 3).unwrap())
            .order_by(["Id"])
            .build()
            .unwrap();
        let sql = build_create_table(&spec, &TypeMapper::default(), &helper(), Some("main")).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"shop\".\"T\" ON CLUSTER \"main\"\n(\n    \"Id\" UInt64,\n    \"Tags\" Array(String),\n    INDEX \"IX_Tags\" (\"Tags\") TYPE bloom_filter(0.025) GRANULARITY 3\n)\nENGINE = MergeTree()\nORDER BY (\"Id\")"
        );
    }

    #[test]
    fn test_materialized_view_variants() {
        let to_view = MaterializedViewSpec {
            source_table: "events".into(),
            source_schema: None,
            query: "SELECT \"UserId\", count() AS \"Hits\" FROM \"events\" GROUP BY \"UserId\"".into(),
            populate: false,
            target_table: Some("hits".into()),
        };
        let spec = EntityEngineSpec::builder("hits_mv")
            .materialized_view(to_view.clone())
            .build()
            .unwrap();
        assert_eq!(
            build_materialized_view(&spec, &to_view, &helper(), None),
            "CREATE MATERIALIZED VIEW IF NOT EXISTS \"hits_mv\"\nTO \"hits\"\nAS SELECT \"UserId\", count() AS \"Hits\" FROM \"events\" GROUP BY \"UserId\""
        );

        let inner = MaterializedViewSpec {
            populate: true,
            target_table: None,
            ..to_view
        };
        let spec = EntityEngineSpec::builder("hits_mv")
            .engine(EngineKind::SummingMergeTree { columns: vec!["Hits".into()] })
            .order_by(["UserId"])
            .materialized_view(inner.clone())
            .build()
            .unwrap();
        let sql = build_materialized_view(&spec, &inner, &helper(), None);
        assert!(sql.contains("ENGINE = SummingMergeTree(\"Hits\")\nORDER BY (\"UserId\")\nPOPULATE\nAS SELECT"));
    }

    #[test]
    fn test_setting_values() {
        assert_eq!(render_setting_value("8192", &helper()), "8192");
        assert_eq!(render_setting_value("true", &helper()), "true");
        assert_eq!(render_setting_value("'x'", &helper()), "'x'");
        assert_eq!(render_setting_value("hot", &helper()), "'hot'");
    }

    #[test]
    fn test_quoted_setting_value_is_escaped() {
        assert_eq!(render_setting_value("'a'b'", &helper()), "'a\\'b'");
        assert_eq!(render_setting_value("'", &helper()), "'\\''");
    }
}
