//! SELECT builder with the ClickHouse query-shape modifiers.
//!
//! `FINAL`, `SAMPLE` and `SETTINGS` are rendered inline, so their arguments must fold to
//! constants before rendering. A runtime parameter in any of them fails the translation.

use crate::error::ClickguardError;
use crate::query::expr::{BinaryOp, Expr};
use crate::query::translator::{fold_constant, ExpressionTranslator, Scope, TranslatedQuery};
use crate::sql_helper::is_plain_identifier;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// A single-table SELECT.
///
/// ```
/// use clickguard::query::{Expr, ExpressionTranslator, SelectQuery};
/// use clickguard::types::AppType;
///
/// let query = SelectQuery::from("events")
///     .filter(Expr::column("Kind", AppType::String).equals(Expr::constant("click")))
///     .final_()
///     .with_setting("max_threads", Expr::constant(4));
/// let sql = query.to_sql(&ExpressionTranslator::default()).unwrap().sql;
/// assert_eq!(
///     sql,
///     "SELECT *\nFROM \"events\" FINAL\nWHERE \"Kind\" = 'click'\nSETTINGS max_threads = 4"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct SelectQuery {
    table: String,
    schema: Option<String>,
    projections: Vec<(Expr, Option<String>)>,
    filters: Vec<Expr>,
    group_by: Vec<Expr>,
    having: Option<Expr>,
    order_by: Vec<(Expr, Order)>,
    limit: Option<Expr>,
    offset: Option<Expr>,
    is_final: bool,
    sample: Option<Expr>,
    settings: Vec<(String, Expr)>,
}

impl SelectQuery {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: None,
            projections: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            is_final: false,
            sample: None,
            settings: Vec::new(),
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn select(mut self, expr: Expr) -> Self {
        self.projections.push((expr, None));
        self
    }

    pub fn select_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.projections.push((expr, Some(alias.into())));
        self
    }

    /// Add a WHERE condition; repeated calls are combined with AND.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.filters.push(condition);
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, condition: Expr) -> Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn order_by(mut self, expr: Expr) -> Self {
        self.order_by.push((expr, Order::Asc));
        self
    }

    pub fn order_by_desc(mut self, expr: Expr) -> Self {
        self.order_by.push((expr, Order::Desc));
        self
    }

    pub fn limit(mut self, limit: impl Into<Expr>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    pub fn offset(mut self, offset: impl Into<Expr>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    /// Read only the latest row versions (`FINAL`).
    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Sample a fraction in (0, 1] or an approximate row count.
    pub fn sample(mut self, ratio: impl Into<Expr>) -> Self {
        self.sample = Some(ratio.into());
        self
    }

    /// Append a per-query setting. A later value for the same name replaces the earlier one.
    pub fn with_setting(mut self, name: impl Into<String>, value: impl Into<Expr>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.settings.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.settings.push((name, value)),
        }
        self
    }

    fn check_entity(&self, translator: &ExpressionTranslator<'_>) -> Result<(), ClickguardError> {
        let Some(model) = translator.model() else {
            return Ok(());
        };
        let Some(entity) = model.entity(&self.table) else {
            return Ok(());
        };
        if self.is_final {
            let reason = if entity.is_dictionary() {
                Some("dictionaries have no row versions".to_string())
            } else if entity.is_table_function() {
                Some("table functions have no row versions".to_string())
            } else if !entity.engine.supports_final() {
                Some(format!("engine {} does not merge row versions", entity.engine.name()))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(ClickguardError::untranslatable(format!("FINAL on {}", self.table), reason));
            }
        }
        if self.sample.is_some() && entity.sample_by.is_none() {
            return Err(ClickguardError::untranslatable(
                format!("SAMPLE on {}", self.table),
                "the table declares no SAMPLE BY expression",
            ));
        }
        Ok(())
    }

    fn render_sample(&self, expr: &Expr) -> Result<String, ClickguardError> {
        let construct = || format!("SAMPLE {}", expr.describe());
        let value = fold_constant(expr).ok_or_else(|| {
            ClickguardError::untranslatable(construct(), "sampling ratio must be a constant, not a runtime parameter")
        })?;
        let in_range = match &value {
            Value::Int(n) => *n >= 1,
            Value::UInt(n) => *n >= 1,
            Value::Float(_) | Value::Decimal(_) => value.as_f64().map(|f| f > 0.0 && f <= 1.0).unwrap_or(false),
            _ => false,
        };
        if !in_range {
            return Err(ClickguardError::untranslatable(
                construct(),
                format!("{value} is neither a fraction in (0, 1] nor a row count of at least 1"),
            ));
        }
        Ok(value.to_string())
    }

    fn render_setting(&self, name: &str, expr: &Expr, translator: &ExpressionTranslator<'_>) -> Result<String, ClickguardError> {
        let construct = || format!("SETTINGS {name}");
        if !is_plain_identifier(name) {
            return Err(ClickguardError::untranslatable(construct(), "setting names must be plain identifiers"));
        }
        match fold_constant(expr) {
            None => Err(ClickguardError::untranslatable(
                construct(),
                "setting values must be constants, not runtime parameters",
            )),
            Some(Value::Null) => Err(ClickguardError::untranslatable(construct(), "setting value cannot be NULL")),
            Some(value) => Ok(format!("{} = {}", name, value.to_sql_literal(translator.helper()))),
        }
    }

    /// Render the query. Modifier checks run before any expression is lowered.
    pub fn to_sql(&self, translator: &ExpressionTranslator<'_>) -> Result<TranslatedQuery, ClickguardError> {
        self.check_entity(translator)?;
        let helper = translator.helper();
        let mut scope = Scope::default();

        let mut from = helper.delimit_identifier(&self.table, self.schema.as_deref());
        if self.is_final {
            from.push_str(" FINAL");
        }
        if let Some(sample) = &self.sample {
            from.push_str(&format!(" SAMPLE {}", self.render_sample(sample)?));
        }
        let settings = self
            .settings
            .iter()
            .map(|(name, value)| self.render_setting(name, value, translator))
            .collect::<Result<Vec<_>, _>>()?;

        let projections = if self.projections.is_empty() {
            "*".to_string()
        } else {
            let mut parts = Vec::with_capacity(self.projections.len());
            for (expr, alias) in &self.projections {
                let sql = translator.lower(expr, &mut scope)?;
                parts.push(match alias {
                    Some(alias) => format!("{} AS {}", sql, helper.delimit_identifier(alias, None)),
                    None => sql.to_string(),
                });
            }
            parts.join(", ")
        };

        let mut sql = format!("SELECT {projections}\nFROM {from}");

        let condition = self
            .filters
            .iter()
            .cloned()
            .reduce(|acc, next| Expr::binary(BinaryOp::And, acc, next));
        if let Some(condition) = condition {
            sql.push_str(&format!("\nWHERE {}", translator.lower(&condition, &mut scope)?));
        }
        if !self.group_by.is_empty() {
            let keys = self
                .group_by
                .iter()
                .map(|e| translator.lower(e, &mut scope).map(|s| s.to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(&format!("\nGROUP BY {}", keys.join(", ")));
        }
        if let Some(having) = &self.having {
            sql.push_str(&format!("\nHAVING {}", translator.lower(having, &mut scope)?));
        }
        if !self.order_by.is_empty() {
            let mut keys = Vec::with_capacity(self.order_by.len());
            for (expr, order) in &self.order_by {
                let key = translator.lower(expr, &mut scope)?;
                keys.push(match order {
                    Order::Asc => key.to_string(),
                    Order::Desc => format!("{key} DESC"),
                });
            }
            sql.push_str(&format!("\nORDER BY {}", keys.join(", ")));
        }
        if let Some(limit) = &self.limit {
            sql.push_str(&format!("\nLIMIT {}", translator.lower(limit, &mut scope)?));
        }
        if let Some(offset) = &self.offset {
            sql.push_str(&format!("\nOFFSET {}", translator.lower(offset, &mut scope)?));
        }
        if !settings.is_empty() {
            sql.push_str(&format!("\nSETTINGS {}", settings.join(", ")));
        }

        log::debug!("Translated query on {}: {}", self.table, sql);
        Ok(TranslatedQuery {
            sql,
            parameters: scope.parameters,
        })
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Constant(value)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::constant(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::constant(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::constant(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::constant(value)
    }
}
