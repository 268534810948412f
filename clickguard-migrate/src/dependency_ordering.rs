//! Dependency ordering for migration operations
//!
//! This module provides functionality to:
//! - Compute which same-batch table each operation depends on
//! - Topologically sort operations so created tables precede their dependents
//! - Handle cycles according to the configured [`CyclePolicy`]

use std::collections::{HashMap, HashSet};

use clickguard::schema::{DictionarySource, EntityKind, Model};
use clickguard::{ClickguardError, CyclePolicy};

use crate::operation::MigrationOperation;

/// The table an operation creates, if it is a creation operation.
pub fn created_table(operation: &MigrationOperation) -> Option<&str> {
    match operation {
        MigrationOperation::CreateTable { table, .. } => Some(table),
        _ => None,
    }
}

/// Tables this operation needs to exist first.
///
/// A materialized view or ClickHouse-sourced dictionary depends on its source table;
/// any other table-level operation depends on the table it targets.
pub fn operation_dependencies(operation: &MigrationOperation, model: &Model) -> Vec<String> {
    match operation {
        MigrationOperation::CreateTable { table, .. } => match model.entity(table).map(|e| &e.kind) {
            Some(EntityKind::MaterializedView(view)) => {
                let mut deps = vec![view.source_table.clone()];
                if let Some(target) = &view.target_table {
                    deps.push(target.clone());
                }
                deps
            }
            Some(EntityKind::Dictionary(definition)) => match &definition.source {
                DictionarySource::ClickHouse { table, .. } => vec![table.clone()],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        },
        // Drop-then-recreate must keep its order.
        MigrationOperation::DropTable { .. } => Vec::new(),
        other => other.table().map(|t| vec![t.to_string()]).unwrap_or_default(),
    }
}

/// Sort operations so every same-batch table creation precedes the operations that need it.
///
/// Kahn's algorithm, one layer at a time; each layer keeps the original relative order.
/// Dependencies on tables not created in this batch are ignored. When a cycle leaves
/// operations unprocessed, [`CyclePolicy::PreserveOrder`] appends them in original order
/// and [`CyclePolicy::Fail`] returns an error naming the tables involved.
pub fn sort_operations(
    operations: Vec<MigrationOperation>,
    model: &Model,
    policy: CyclePolicy,
) -> Result<Vec<MigrationOperation>, ClickguardError> {
    // Table name -> index of the operation creating it (first one wins)
    let mut creators: HashMap<&str, usize> = HashMap::new();
    for (i, op) in operations.iter().enumerate() {
        if let Some(table) = created_table(op) {
            creators.entry(table).or_insert(i);
        }
    }

    let mut in_degree = vec![0usize; operations.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); operations.len()];
    for (i, op) in operations.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in operation_dependencies(op, model) {
            if let Some(&creator) = creators.get(dep.as_str()) {
                if creator != i && seen.insert(creator) {
                    in_degree[i] += 1;
                    dependents[creator].push(i);
                }
            }
        }
    }

    let mut order = Vec::with_capacity(operations.len());
    let mut done = vec![false; operations.len()];
    let mut layer: Vec<usize> = (0..operations.len()).filter(|&i| in_degree[i] == 0).collect();

    while !layer.is_empty() {
        let mut next = Vec::new();
        for &i in &layer {
            done[i] = true;
            order.push(i);
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }
        next.sort_unstable();
        layer = next;
    }

    if order.len() != operations.len() {
        let remaining: Vec<usize> = (0..operations.len()).filter(|&i| !done[i]).collect();
        let tables = remaining
            .iter()
            .filter_map(|&i| operations[i].table())
            .collect::<Vec<_>>()
            .join(", ");
        match policy {
            CyclePolicy::Fail => {
                return Err(ClickguardError::invalid_config(
                    "migration operation order",
                    format!("circular dependency between {tables}"),
                    "an acyclic set of table dependencies",
                ));
            }
            CyclePolicy::PreserveOrder => {
                log::warn!(
                    "Circular dependency between {}; emitting {} operation(s) in original order",
                    tables,
                    remaining.len()
                );
                order.extend(remaining);
            }
        }
    }

    let mut slots: Vec<Option<MigrationOperation>> = operations.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
