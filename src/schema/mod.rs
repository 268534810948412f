//! Entity metadata and the DDL clause builder.
pub mod clause;
pub mod dictionary;
pub mod engine;
pub mod model;
pub mod skip_index;

pub use clause::{
    build_column_definition, build_create_table, build_dictionary, build_engine_clause, build_index_definition, on_cluster,
    build_materialized_view,
};
pub use dictionary::{
    create_external_dictionary_sql, CredentialResolver, DictionaryAttribute, DictionaryDefinition, DictionaryLayout,
    DictionaryLifetime, DictionarySource, EnvCredentialResolver, ExternalSourceRef, ResolvedCredentials,
};
pub use engine::{
    ColumnSpec, EngineKind, EntityEngineSpec, EntityEngineSpecBuilder, EntityKind, IndexSpec, MaterializedViewSpec,
    ProjectionSpec, Replication,
};
pub use model::{Model, ModelBuilder};
pub use skip_index::{SkipIndexKind, SkipIndexSpec};
