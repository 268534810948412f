//! Immutable registry of mapped entities.

use std::collections::HashMap;

use crate::error::ClickguardError;
use crate::schema::engine::{ColumnSpec, EntityEngineSpec, EntityKind};

/// All entities of one application model, keyed by table name.
///
/// Lookups take a bare table name, so a table name may appear in only one schema.
///
/// Built once at startup and shared by reference between the translator and the
/// migration generator.
#[derive(Debug, Clone, Default)]
pub struct Model {
    entities: HashMap<String, EntityEngineSpec>,
    /// Table names in declaration order.
    order: Vec<String>,
}

impl Model {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    pub fn entity(&self, table: &str) -> Option<&EntityEngineSpec> {
        self.entities.get(table)
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnSpec> {
        self.entity(table).and_then(|e| e.column(column))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityEngineSpec> {
        self.order.iter().filter_map(|name| self.entities.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ModelBuilder {
    entities: Vec<EntityEngineSpec>,
}

impl ModelBuilder {
    pub fn entity(mut self, entity: EntityEngineSpec) -> Self {
        self.entities.push(entity);
        self
    }

    /// Fails on a table name registered twice, in the same schema or in different ones,
    /// and on materialized views without a source.
    pub fn build(self) -> Result<Model, ClickguardError> {
        let mut model = Model::default();
        for entity in self.entities {
            if let Some(existing) = model.entities.get(&entity.table) {
                let schema_of = |e: &EntityEngineSpec| e.schema.clone().unwrap_or_else(|| "<default>".to_string());
                return Err(ClickguardError::invalid_config(
                    format!("model entity {}", entity.table),
                    format!("schemas {} and {}", schema_of(existing), schema_of(&entity)),
                    "each table name registered once across all schemas",
                ));
            }
            if let EntityKind::MaterializedView(view) = &entity.kind {
                if view.source_table.trim().is_empty() {
                    return Err(ClickguardError::invalid_config(
                        format!("materialized view {} source", entity.table),
                        "''",
                        "a source table name",
                    ));
                }
            }
            model.order.push(entity.table.clone());
            model.entities.insert(entity.table.clone(), entity);
        }
        Ok(model)
    }
}
