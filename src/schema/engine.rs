//! Table engine metadata.
//!
//! An [`EntityEngineSpec`] is built once per mapped table, view or dictionary from
//! declarative configuration and is immutable afterwards. `build()` validates the engine
//! parameters so that bad configuration fails at model-build time, not when a migration
//! is applied.

use std::collections::{BTreeMap, HashSet};

use crate::error::ClickguardError;
use crate::schema::dictionary::DictionaryDefinition;
use crate::schema::skip_index::SkipIndexSpec;
use crate::sql_helper::{is_plain_identifier, SqlHelper};
use crate::types::{AppType, TypeConfig};

/// Table engines the provider can declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineKind {
    MergeTree,
    ReplacingMergeTree {
        version: Option<String>,
        is_deleted: Option<String>,
    },
    SummingMergeTree {
        columns: Vec<String>,
    },
    AggregatingMergeTree,
    CollapsingMergeTree {
        sign: String,
    },
    VersionedCollapsingMergeTree {
        sign: String,
        version: String,
    },
    Memory,
    Null,
    Log,
    TinyLog,
}

impl EngineKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::MergeTree => "MergeTree",
            EngineKind::ReplacingMergeTree { .. } => "ReplacingMergeTree",
            EngineKind::SummingMergeTree { .. } => "SummingMergeTree",
            EngineKind::AggregatingMergeTree => "AggregatingMergeTree",
            EngineKind::CollapsingMergeTree { .. } => "CollapsingMergeTree",
            EngineKind::VersionedCollapsingMergeTree { .. } => "VersionedCollapsingMergeTree",
            EngineKind::Memory => "Memory",
            EngineKind::Null => "Null",
            EngineKind::Log => "Log",
            EngineKind::TinyLog => "TinyLog",
        }
    }

    pub fn is_merge_tree_family(&self) -> bool {
        !matches!(
            self,
            EngineKind::Memory | EngineKind::Null | EngineKind::Log | EngineKind::TinyLog
        )
    }

    /// Engines on which `SELECT ... FINAL` is accepted.
    pub fn supports_final(&self) -> bool {
        self.is_merge_tree_family()
    }

    /// Constructor arguments, identifiers already quoted.
    pub fn arguments(&self, helper: &SqlHelper) -> Vec<String> {
        let ident = |name: &str| helper.delimit_identifier(name, None);
        match self {
            EngineKind::ReplacingMergeTree { version, is_deleted } => {
                version.iter().chain(is_deleted.iter()).map(|c| ident(c)).collect()
            }
            EngineKind::SummingMergeTree { columns } => match columns.as_slice() {
                [] => Vec::new(),
                [single] => vec![ident(single)],
                many => vec![format!("({})", helper.delimit_column_list(many))],
            },
            EngineKind::CollapsingMergeTree { sign } => vec![ident(sign)],
            EngineKind::VersionedCollapsingMergeTree { sign, version } => vec![ident(sign), ident(version)],
            _ => Vec::new(),
        }
    }

    fn validate(&self, table: &str) -> Result<(), ClickguardError> {
        let require = |param: &str, value: &str| {
            if value.trim().is_empty() {
                Err(ClickguardError::invalid_config(
                    format!("{}.{} on {}", self.name(), param, table),
                    "''",
                    "a column name",
                ))
            } else {
                Ok(())
            }
        };
        match self {
            EngineKind::ReplacingMergeTree { version, is_deleted } => {
                if let Some(v) = version {
                    require("version", v)?;
                }
                if let Some(d) = is_deleted {
                    require("is_deleted", d)?;
                    if version.is_none() {
                        return Err(ClickguardError::invalid_config(
                            format!("ReplacingMergeTree.is_deleted on {table}"),
                            d,
                            "a version column as well; is_deleted requires version",
                        ));
                    }
                }
                Ok(())
            }
            EngineKind::SummingMergeTree { columns } => columns.iter().try_for_each(|c| require("columns", c)),
            EngineKind::CollapsingMergeTree { sign } => require("sign", sign),
            EngineKind::VersionedCollapsingMergeTree { sign, version } => {
                require("sign", sign)?;
                require("version", version)
            }
            _ => Ok(()),
        }
    }
}

/// ZooKeeper/Keeper coordinates for `Replicated*MergeTree` engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replication {
    pub zoo_path: String,
    pub replica: String,
}

/// A column declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub app_type: AppType,
    pub type_config: TypeConfig,
    pub materialized: Option<String>,
    pub alias: Option<String>,
    pub default_expr: Option<String>,
    pub codec: Option<String>,
    pub comment: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, app_type: AppType) -> Self {
        Self {
            name: name.into(),
            app_type,
            type_config: TypeConfig::default(),
            materialized: None,
            alias: None,
            default_expr: None,
            codec: None,
            comment: None,
        }
    }

    pub fn config(mut self, type_config: TypeConfig) -> Self {
        self.type_config = type_config;
        self
    }

    pub fn materialized(mut self, expr: impl Into<String>) -> Self {
        self.materialized = Some(expr.into());
        self
    }

    pub fn alias(mut self, expr: impl Into<String>) -> Self {
        self.alias = Some(expr.into());
        self
    }

    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default_expr = Some(expr.into());
        self
    }

    pub fn codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// A data-skipping index declared on an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub skip: SkipIndexSpec,
}

/// A projection declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionSpec {
    pub name: String,
    /// The projection body, e.g. `SELECT * ORDER BY "UserId"`.
    pub query: String,
}

/// Materialized view definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedViewSpec {
    pub source_table: String,
    pub source_schema: Option<String>,
    /// The SELECT feeding the view.
    pub query: String,
    pub populate: bool,
    /// Write into an existing table instead of an inner engine table.
    pub target_table: Option<String>,
}

/// What kind of object an entity maps to.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Table,
    MaterializedView(MaterializedViewSpec),
    Dictionary(DictionaryDefinition),
    /// Virtual table backed by a table function such as `s3(...)`; never created by DDL.
    TableFunction(String),
}

/// Engine and layout metadata of one mapped entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityEngineSpec {
    pub table: String,
    pub schema: Option<String>,
    pub engine: EngineKind,
    pub replication: Option<Replication>,
    pub order_by: Vec<String>,
    pub partition_by: Option<String>,
    pub primary_key: Vec<String>,
    pub sample_by: Option<String>,
    pub ttl: Option<String>,
    pub settings: BTreeMap<String, String>,
    pub columns: Vec<ColumnSpec>,
    pub indexes: Vec<IndexSpec>,
    pub projections: Vec<ProjectionSpec>,
    pub kind: EntityKind,
}

impl EntityEngineSpec {
    pub fn builder(table: impl Into<String>) -> EntityEngineSpecBuilder {
        EntityEngineSpecBuilder {
            spec: EntityEngineSpec {
                table: table.into(),
                schema: None,
                engine: EngineKind::MergeTree,
                replication: None,
                order_by: Vec::new(),
                partition_by: None,
                primary_key: Vec::new(),
                sample_by: None,
                ttl: None,
                settings: BTreeMap::new(),
                columns: Vec::new(),
                indexes: Vec::new(),
                projections: Vec::new(),
                kind: EntityKind::Table,
            },
        }
    }

    /// ORDER BY columns actually used: explicit list, else primary key, else empty
    /// (rendered as `tuple()`).
    pub fn effective_order_by(&self) -> &[String] {
        if !self.order_by.is_empty() {
            &self.order_by
        } else {
            &self.primary_key
        }
    }

    /// Engine expression including `Replicated` prefix and arguments.
    pub fn engine_expression(&self, helper: &SqlHelper) -> String {
        if !self.engine.is_merge_tree_family() {
            return self.engine.name().to_string();
        }
        let mut args = Vec::new();
        let mut name = self.engine.name().to_string();
        if let Some(replication) = &self.replication {
            name = format!("Replicated{name}");
            args.push(helper.string_literal(&replication.zoo_path));
            args.push(helper.string_literal(&replication.replica));
        }
        args.extend(self.engine.arguments(helper));
        format!("{}({})", name, args.join(", "))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn is_materialized_view(&self) -> bool {
        matches!(self.kind, EntityKind::MaterializedView(_))
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self.kind, EntityKind::Dictionary(_))
    }

    pub fn is_table_function(&self) -> bool {
        matches!(self.kind, EntityKind::TableFunction(_))
    }
}

/// Builder for [`EntityEngineSpec`]; `build()` validates.
#[derive(Debug, Clone)]
pub struct EntityEngineSpecBuilder {
    spec: EntityEngineSpec,
}

impl EntityEngineSpecBuilder {
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.spec.schema = Some(schema.into());
        self
    }

    pub fn engine(mut self, engine: EngineKind) -> Self {
        self.spec.engine = engine;
        self
    }

    pub fn replicated(mut self, zoo_path: impl Into<String>, replica: impl Into<String>) -> Self {
        self.spec.replication = Some(Replication {
            zoo_path: zoo_path.into(),
            replica: replica.into(),
        });
        self
    }

    pub fn order_by<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.spec.order_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn partition_by(mut self, expr: impl Into<String>) -> Self {
        self.spec.partition_by = Some(expr.into());
        self
    }

    pub fn primary_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.spec.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn sample_by(mut self, expr: impl Into<String>) -> Self {
        self.spec.sample_by = Some(expr.into());
        self
    }

    pub fn ttl(mut self, expr: impl Into<String>) -> Self {
        self.spec.ttl = Some(expr.into());
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.settings.insert(key.into(), value.into());
        self
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.spec.columns.push(column);
        self
    }

    pub fn index<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
        skip: SkipIndexSpec,
    ) -> Self {
        self.spec.indexes.push(IndexSpec {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            skip,
        });
        self
    }

    pub fn projection(mut self, name: impl Into<String>, query: impl Into<String>) -> Self {
        self.spec.projections.push(ProjectionSpec {
            name: name.into(),
            query: query.into(),
        });
        self
    }

    pub fn materialized_view(mut self, view: MaterializedViewSpec) -> Self {
        self.spec.kind = EntityKind::MaterializedView(view);
        self
    }

    pub fn dictionary(mut self, dictionary: DictionaryDefinition) -> Self {
        self.spec.kind = EntityKind::Dictionary(dictionary);
        self
    }

    pub fn table_function(mut self, function: impl Into<String>) -> Self {
        self.spec.kind = EntityKind::TableFunction(function.into());
        self
    }

    pub fn build(self) -> Result<EntityEngineSpec, ClickguardError> {
        let spec = self.spec;
        let table = spec.table.as_str();

        if table.trim().is_empty() {
            return Err(ClickguardError::invalid_config("entity table name", "''", "a non-empty name"));
        }
        spec.engine.validate(table)?;

        if !spec.engine.is_merge_tree_family() {
            let merge_tree_only = [
                ("ORDER BY", !spec.order_by.is_empty()),
                ("PARTITION BY", spec.partition_by.is_some()),
                ("PRIMARY KEY", !spec.primary_key.is_empty()),
                ("SAMPLE BY", spec.sample_by.is_some()),
                ("TTL", spec.ttl.is_some()),
                ("replication", spec.replication.is_some()),
            ];
            if let Some((clause, _)) = merge_tree_only.iter().find(|(_, set)| *set) {
                return Err(ClickguardError::invalid_config(
                    format!("{clause} on {table}"),
                    spec.engine.name(),
                    "a MergeTree-family engine",
                ));
            }
        }

        if !spec.order_by.is_empty()
            && !spec.primary_key.is_empty()
            && !spec.order_by.starts_with(&spec.primary_key)
        {
            return Err(ClickguardError::invalid_config(
                format!("PRIMARY KEY on {table}"),
                spec.primary_key.join(", "),
                format!("a prefix of ORDER BY ({})", spec.order_by.join(", ")),
            ));
        }

        if spec.sample_by.is_some() && spec.effective_order_by().is_empty() {
            return Err(ClickguardError::invalid_config(
                format!("SAMPLE BY on {table}"),
                spec.sample_by.as_deref().unwrap_or_default(),
                "an ORDER BY or PRIMARY KEY containing the sampling expression",
            ));
        }

        if let Some(key) = spec.settings.keys().find(|k| !is_plain_identifier(k)) {
            return Err(ClickguardError::invalid_config(
                format!("SETTINGS on {table}"),
                key,
                "a setting name made of letters, digits and underscores",
            ));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = spec.columns.iter().find(|c| !seen.insert(c.name.as_str())) {
            return Err(ClickguardError::invalid_config(
                format!("columns on {table}"),
                &dup.name,
                "unique column names",
            ));
        }

        match &spec.kind {
            EntityKind::Dictionary(def) => def.validate(table)?,
            EntityKind::MaterializedView(view) => {
                if view.query.trim().is_empty() {
                    return Err(ClickguardError::invalid_config(
                        format!("materialized view query on {table}"),
                        "''",
                        "a SELECT statement",
                    ));
                }
                if view.populate && view.target_table.is_some() {
                    return Err(ClickguardError::invalid_config(
                        format!("materialized view POPULATE on {table}"),
                        "true",
                        "POPULATE only for views without a TO table",
                    ));
                }
            }
            EntityKind::TableFunction(function) if function.trim().is_empty() => {
                return Err(ClickguardError::invalid_config(
                    format!("table function on {table}"),
                    "''",
                    "a table function call",
                ));
            }
            _ => {}
        }

        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_deleted_requires_version() {
        let err = EntityEngineSpec::builder("t")
            .engine(EngineKind::ReplacingMergeTree {
                version: None,
                is_deleted: Some("Deleted".into()),
            })
            .order_by(["Id"])
            .build()
            .unwrap_err();
        assert!(matches!(err, ClickguardError::ConfigurationValidation { .. }));
    }

    #[test]
    fn test_engine_arguments() {
        let helper = SqlHelper::default();
        let replacing = EngineKind::ReplacingMergeTree {
            version: Some("Ver".into()),
            is_deleted: Some("Del".into()),
        };
        assert_eq!(replacing.arguments(&helper), vec!["\"Ver\"", "\"Del\""]);
        let collapsing = EngineKind::VersionedCollapsingMergeTree {
            sign: "Sign".into(),
            version: "Ver".into(),
        };
        assert_eq!(collapsing.arguments(&helper), vec!["\"Sign\"", "\"Ver\""]);
        let summing = EngineKind::SummingMergeTree {
            columns: vec!["A".into(), "B".into()],
        };
        assert_eq!(summing.arguments(&helper), vec!["(\"A\", \"B\")"]);
    }

    #[test]
    fn test_replicated_engine_expression() {
        let spec = EntityEngineSpec::builder("t")
            .engine(EngineKind::CollapsingMergeTree { sign: "Sign".into() })
            .replicated("/clickhouse/tables/{shard}/t", "{replica}")
            .order_by(["Id"])
            .build()
            .unwrap();
        assert_eq!(
            spec.engine_expression(&SqlHelper::default()),
            "ReplicatedCollapsingMergeTree('/clickhouse/tables/{shard}/t', '{replica}', \"Sign\")"
        );
    }

    #[test]
    fn test_non_merge_tree_rejects_order_by() {
        let err = EntityEngineSpec::builder("buffer")
            .engine(EngineKind::Null)
            .order_by(["Id"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ORDER BY"));
    }

    #[test]
    fn test_primary_key_must_prefix_order_by() {
        assert!(EntityEngineSpec::builder("t")
            .order_by(["A", "B"])
            .primary_key(["A"])
            .build()
            .is_ok());
        assert!(EntityEngineSpec::builder("t")
            .order_by(["A", "B"])
            .primary_key(["B"])
            .build()
            .is_err());
    }

    #[test]
    fn test_duplicate_columns_and_bad_settings_rejected() {
        assert!(EntityEngineSpec::builder("t")
            .column(ColumnSpec::new("Id", AppType::UInt64))
            .column(ColumnSpec::new("Id", AppType::String))
            .build()
            .is_err());
        assert!(EntityEngineSpec::builder("t")
            .setting("index_granularity; DROP", "1")
            .build()
            .is_err());
    }

    #[test]
    fn test_sample_by_requires_sorting_key() {
        assert!(EntityEngineSpec::builder("t").sample_by("intHash32(\"UserId\")").build().is_err());
        assert!(EntityEngineSpec::builder("t")
            .order_by(["UserId"])
            .sample_by("intHash32(\"UserId\")")
            .build()
            .is_ok());
    }

    #[test]
    fn test_effective_order_by_falls_back_to_primary_key() {
        let spec = EntityEngineSpec::builder("t").primary_key(["Id"]).build().unwrap();
        assert_eq!(spec.effective_order_by(), ["Id".to_string()]);
    }
}
