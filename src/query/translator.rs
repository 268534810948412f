//! Expression-to-SQL translator.
//!
//! Lowers a host [`Expr`] tree into ClickHouse SQL. A construct without a translation
//! rule fails the whole translation with
//! [`ClickguardError::UntranslatableExpression`]; nothing is evaluated client-side and no
//! partial SQL is ever returned.

use crate::config::ProviderConfig;
use crate::error::ClickguardError;
use crate::query::expr::{BinaryOp, Expr, JsonSegment, UnaryOp};
use crate::query::method::{DatePart, Member, Method, Receiver};
use crate::query::sql::{binary, function, raw, SqlExpr};
use crate::schema::Model;
use crate::sql_helper::{is_plain_identifier, SqlHelper};
use crate::types::{AppType, TypeConfig, TypeMapper, Value};

/// A bound parameter referenced by translated SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameter {
    pub name: String,
    pub store_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedQuery {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
}

/// Per-translation state: lambda bindings in scope and parameters seen so far.
#[derive(Debug, Default)]
pub(crate) struct Scope {
    lambdas: Vec<(String, Option<AppType>)>,
    pub(crate) parameters: Vec<QueryParameter>,
}

impl Scope {
    fn lambda_type(&self, name: &str) -> Option<Option<&AppType>> {
        self.lambdas
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.as_ref())
    }
}

fn untranslatable(expr: &Expr, reason: impl Into<String>) -> ClickguardError {
    ClickguardError::untranslatable(expr.describe(), reason)
}

/// Fold an expression to a constant, if it is built only from constants.
///
/// Used for query-shape modifiers, which cannot take runtime parameters.
pub fn fold_constant(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Constant(v) => Some(v.clone()),
        Expr::Unary {
            op: UnaryOp::Negate,
            operand,
        } => match fold_constant(operand)? {
            Value::Int(i) => i.checked_neg().map(Value::Int),
            Value::Float(f) => Some(Value::Float(-f)),
            Value::Decimal(d) => Some(Value::Decimal(-d)),
            _ => None,
        },
        Expr::Binary { op, left, right } => {
            let (l, r) = (fold_constant(left)?, fold_constant(right)?);
            match (l, r) {
                (Value::Int(a), Value::Int(b)) => match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div => a.checked_div(b),
                    _ => None,
                }
                .map(Value::Int),
                (Value::Decimal(a), Value::Decimal(b)) => match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div => a.checked_div(b),
                    _ => None,
                }
                .map(Value::Decimal),
                (a, b) => {
                    let (a, b) = (a.as_f64()?, b.as_f64()?);
                    let folded = match op {
                        BinaryOp::Add => a + b,
                        BinaryOp::Sub => a - b,
                        BinaryOp::Mul => a * b,
                        BinaryOp::Div => a / b,
                        _ => return None,
                    };
                    folded.is_finite().then_some(Value::Float(folded))
                }
            }
        }
        _ => None,
    }
}

/// Type of a constant, where it has one.
fn value_type(value: &Value) -> Option<AppType> {
    Some(match value {
        Value::Null => return None,
        Value::Bool(_) => AppType::Bool,
        Value::Int(_) => AppType::Int64,
        Value::UInt(_) => AppType::UInt64,
        Value::BigInt(_) => AppType::BigInteger,
        Value::Float(_) => AppType::Float64,
        Value::Decimal(_) => AppType::Decimal,
        Value::String(_) => AppType::String,
        Value::Date(_) => AppType::Date,
        Value::DateTime(_) => AppType::DateTime,
        Value::Uuid(_) => AppType::Uuid,
        Value::Json(_) => AppType::Json,
        Value::Array(items) => AppType::array(items.iter().find_map(value_type)?),
    })
}

fn element_type(app_type: &AppType) -> Option<AppType> {
    match app_type.underlying() {
        AppType::Array(inner) => Some(inner.as_ref().clone()),
        _ => None,
    }
}

fn is_integer(app_type: &AppType) -> bool {
    app_type.is_numeric() && !matches!(app_type.underlying(), AppType::Float32 | AppType::Float64 | AppType::Decimal)
}

/// Translates host expressions to ClickHouse SQL.
#[derive(Debug, Clone)]
pub struct ExpressionTranslator<'m> {
    mapper: TypeMapper,
    helper: SqlHelper,
    model: Option<&'m Model>,
}

impl Default for ExpressionTranslator<'_> {
    fn default() -> Self {
        Self::new(&ProviderConfig::default())
    }
}

impl<'m> ExpressionTranslator<'m> {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            mapper: TypeMapper::from_config(config),
            helper: config.sql_helper(),
            model: None,
        }
    }

    /// Check FINAL and SAMPLE modifiers against entity metadata.
    pub fn with_model(mut self, model: &'m Model) -> Self {
        self.model = Some(model);
        self
    }

    pub fn helper(&self) -> &SqlHelper {
        &self.helper
    }

    pub fn model(&self) -> Option<&'m Model> {
        self.model
    }

    /// Translate a standalone expression (a filter or a projection).
    pub fn translate(&self, expr: &Expr) -> Result<TranslatedQuery, ClickguardError> {
        let mut scope = Scope::default();
        let sql = self.lower(expr, &mut scope)?.to_string();
        log::debug!("Translated {} into {}", expr.describe(), sql);
        Ok(TranslatedQuery {
            sql,
            parameters: scope.parameters,
        })
    }

    pub(crate) fn lower(&self, expr: &Expr, scope: &mut Scope) -> Result<SqlExpr, ClickguardError> {
        match expr {
            Expr::Column { table, name, .. } => Ok(SqlExpr::Identifier(
                self.helper.delimit_identifier(name, table.as_deref()),
            )),
            Expr::Constant(value) => Ok(raw(value.to_sql_literal(&self.helper))),
            Expr::Parameter { name, app_type } => self.lower_parameter(expr, name, app_type, scope),
            Expr::LambdaParameter(name) => match scope.lambda_type(name) {
                Some(_) => Ok(raw(name.clone())),
                None => Err(untranslatable(expr, "lambda parameter is not bound by an enclosing lambda")),
            },
            Expr::Lambda { .. } => Err(untranslatable(
                expr,
                "lambdas are only translatable as arguments of collection methods",
            )),
            Expr::Binary { op, left, right } => self.lower_binary(*op, left, right, scope),
            Expr::Unary { op, operand } => {
                let operand = self.lower(operand, scope)?;
                Ok(match op {
                    UnaryOp::Not => SqlExpr::Not(Box::new(operand)),
                    UnaryOp::Negate => SqlExpr::Negate(Box::new(operand)),
                })
            }
            Expr::Member { target, member } => self.lower_member(expr, target, member, scope),
            Expr::Call {
                target,
                method,
                arguments,
            } => self.lower_call(expr, target, method, arguments, scope),
            Expr::Function { class, name, arguments } => self.lower_function(expr, class, name, arguments, scope),
            Expr::Index { target, index } => self.lower_index(expr, target, index, scope),
            Expr::JsonPath { target, path } => {
                let is_json = self.type_of(target, scope).map(|t| t.is_json()).unwrap_or(false);
                if !is_json {
                    return Err(untranslatable(expr, "JSON paths apply only to JSON columns"));
                }
                let mut sql = self.lower(target, scope)?;
                for segment in path {
                    sql = match segment {
                        JsonSegment::Key(key) => SqlExpr::Subcolumn {
                            base: Box::new(sql),
                            key: self.helper.delimit_identifier(key, None),
                        },
                        JsonSegment::Index(i) => SqlExpr::Subscript {
                            target: Box::new(sql),
                            index: Box::new(raw(shifted_constant(expr, *i)?.to_string())),
                        },
                    };
                }
                Ok(sql)
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Ok(function(
                "if",
                vec![
                    self.lower(test, scope)?,
                    self.lower(if_true, scope)?,
                    self.lower(if_false, scope)?,
                ],
            )),
            Expr::Coalesce { left, right } => Ok(function(
                "ifNull",
                vec![self.lower(left, scope)?, self.lower(right, scope)?],
            )),
            Expr::Convert { operand, app_type } => Ok(SqlExpr::Cast {
                operand: Box::new(self.lower(operand, scope)?),
                type_name: self.mapper.resolve(app_type, &TypeConfig::default())?,
            }),
            Expr::Opaque(_) => Err(untranslatable(expr, "no server-side translation exists")),
        }
    }

    fn lower_parameter(
        &self,
        expr: &Expr,
        name: &str,
        app_type: &AppType,
        scope: &mut Scope,
    ) -> Result<SqlExpr, ClickguardError> {
        if !is_plain_identifier(name) {
            return Err(untranslatable(expr, "parameter names must be plain identifiers"));
        }
        let store_type = self.mapper.resolve(app_type, &TypeConfig::default())?;
        match scope.parameters.iter().find(|p| p.name == name) {
            Some(existing) if existing.store_type != store_type => {
                return Err(untranslatable(
                    expr,
                    format!("bound as both {} and {}", existing.store_type, store_type),
                ))
            }
            Some(_) => {}
            None => scope.parameters.push(QueryParameter {
                name: name.to_string(),
                store_type: store_type.clone(),
            }),
        }
        Ok(raw(self.helper.format_parameter_placeholder(name, Some(&store_type))))
    }

    fn lower_binary(&self, op: BinaryOp, left: &Expr, right: &Expr, scope: &mut Scope) -> Result<SqlExpr, ClickguardError> {
        if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
            let null_side = match (left, right) {
                (other, Expr::Constant(Value::Null)) | (Expr::Constant(Value::Null), other) => Some(other),
                _ => None,
            };
            if let Some(other) = null_side {
                return Ok(SqlExpr::IsNull {
                    operand: Box::new(self.lower(other, scope)?),
                    negated: op == BinaryOp::NotEq,
                });
            }
        }

        let left_type = self.type_of(left, scope);
        let right_type = self.type_of(right, scope);
        let l = self.lower_against(left, right_type.as_ref(), scope)?;
        let r = self.lower_against(right, left_type.as_ref(), scope)?;

        let is_string = |t: &Option<AppType>| t.as_ref().map(|t| t.is_string()).unwrap_or(false);
        let is_int = |t: &Option<AppType>| t.as_ref().map(is_integer).unwrap_or(false);

        Ok(match op {
            BinaryOp::Add if is_string(&left_type) || is_string(&right_type) => function("concat", vec![l, r]),
            BinaryOp::Div if is_int(&left_type) && is_int(&right_type) => function("intDiv", vec![l, r]),
            _ => binary(l, op.symbol(), r),
        })
    }

    /// Lower an operand compared with an enum column: numeric codes become member names.
    fn lower_against(&self, expr: &Expr, peer: Option<&AppType>, scope: &mut Scope) -> Result<SqlExpr, ClickguardError> {
        let def = match peer.map(|t| t.underlying()) {
            Some(AppType::Enum(def)) => def,
            _ => return self.lower(expr, scope),
        };
        match expr {
            Expr::Constant(value @ (Value::Int(_) | Value::UInt(_))) => {
                let code = value
                    .as_i64()
                    .ok_or_else(|| untranslatable(expr, format!("not a member of enum {}", def.name)))?;
                let member = def
                    .members
                    .iter()
                    .find(|m| m.value == code)
                    .ok_or_else(|| untranslatable(expr, format!("{code} is not a member of enum {}", def.name)))?;
                Ok(raw(self.helper.string_literal(&member.name)))
            }
            Expr::Constant(Value::String(name)) if !def.contains(name) => Err(untranslatable(
                expr,
                format!("'{name}' is not a member of enum {}", def.name),
            )),
            _ => self.lower(expr, scope),
        }
    }

    fn nested_field(&self, expr: &Expr, target: &Expr, field: Option<&str>) -> Result<SqlExpr, ClickguardError> {
        match target {
            Expr::Column {
                table,
                name,
                app_type,
            } => match app_type.underlying() {
                AppType::Nested(record) => {
                    let field = match field {
                        Some(f) => f,
                        None => record
                            .first_field()
                            .ok_or_else(|| untranslatable(expr, "nested type declares no fields"))?,
                    };
                    Ok(SqlExpr::Identifier(
                        self.helper.delimit_identifier(&format!("{name}.{field}"), table.as_deref()),
                    ))
                }
                _ => Err(untranslatable(expr, "target is not a Nested column")),
            },
            _ => Err(untranslatable(expr, "Nested operations apply only to a Nested column reference")),
        }
    }

    fn receiver(&self, expr: &Expr, target: &Expr, scope: &Scope) -> Result<(Receiver, AppType), ClickguardError> {
        let target_type = self
            .type_of(target, scope)
            .ok_or_else(|| untranslatable(expr, format!("type of {} is unknown", target.describe())))?;
        let receiver = Receiver::of(&target_type)
            .ok_or_else(|| untranslatable(expr, format!("no translation rules for {target_type}")))?;
        Ok((receiver, target_type))
    }

    fn lower_member(&self, expr: &Expr, target: &Expr, member: &str, scope: &mut Scope) -> Result<SqlExpr, ClickguardError> {
        let (receiver, target_type) = self.receiver(expr, target, scope)?;

        if receiver == Receiver::Json {
            return Ok(SqlExpr::Subcolumn {
                base: Box::new(self.lower(target, scope)?),
                key: self.helper.delimit_identifier(member, None),
            });
        }
        if let AppType::Nested(record) = target_type.underlying() {
            if record.fields.iter().any(|(name, _)| name == member) {
                return self.nested_field(expr, target, Some(member));
            }
        }

        let resolved = Member::resolve(receiver, member)
            .ok_or_else(|| untranslatable(expr, format!("no translation for member {member} on {target_type}")))?;
        let t = self.lower(target, scope)?;
        Ok(match resolved {
            Member::NestedCount => function("length", vec![self.nested_field(expr, target, None)?]),
            Member::ArrayLength => function("length", vec![t]),
            Member::MapCount => function("length", vec![function("mapKeys", vec![t])]),
            Member::MapKeys => function("mapKeys", vec![t]),
            Member::MapValues => function("mapValues", vec![t]),
            Member::StringLength => function("lengthUTF8", vec![t]),
            // ClickHouse numbers Monday=1..Sunday=7; the host uses Sunday=0.
            Member::DatePart(DatePart::DayOfWeek) => binary(function("toDayOfWeek", vec![t]), "%", raw("7")),
            Member::DatePart(part) => function(part.function(), vec![t]),
        })
    }

    fn lower_lambda(
        &self,
        call: &Expr,
        lambda: &Expr,
        element: Option<AppType>,
        scope: &mut Scope,
    ) -> Result<SqlExpr, ClickguardError> {
        let (parameters, body) = match lambda {
            Expr::Lambda { parameters, body } if parameters.len() == 1 => (parameters, body),
            Expr::Lambda { .. } => return Err(untranslatable(call, "collection lambdas take exactly one parameter")),
            _ => return Err(untranslatable(call, "expected a lambda argument")),
        };
        if !is_plain_identifier(&parameters[0]) {
            return Err(untranslatable(lambda, "lambda parameter names must be plain identifiers"));
        }
        scope.lambdas.push((parameters[0].clone(), element));
        let lowered = self.lower(body, scope);
        scope.lambdas.pop();
        Ok(SqlExpr::Lambda {
            parameters: parameters.clone(),
            body: Box::new(lowered?),
        })
    }

    /// Host indices are zero-based; a constant shifts at translation time, anything else
    /// is shifted in SQL with negatives passed through.
    fn lower_shifted_index(&self, expr: &Expr, index: &Expr, scope: &mut Scope) -> Result<SqlExpr, ClickguardError> {
        match fold_constant(index) {
            Some(value) => match value.as_i64() {
                Some(i) => Ok(raw(shifted_constant(expr, i)?.to_string())),
                None => Err(untranslatable(expr, format!("index {value} is not an integer"))),
            },
            None => {
                let lowered = self.lower(index, scope)?;
                Ok(function(
                    "if",
                    vec![
                        binary(lowered.clone(), ">=", raw("0")),
                        binary(lowered.clone(), "+", raw("1")),
                        lowered,
                    ],
                ))
            }
        }
    }

    fn lower_call(
        &self,
        expr: &Expr,
        target: &Expr,
        method: &str,
        args: &[Expr],
        scope: &mut Scope,
    ) -> Result<SqlExpr, ClickguardError> {
        let (receiver, target_type) = self.receiver(expr, target, scope)?;
        let resolved = Method::resolve(receiver, method)
            .ok_or_else(|| untranslatable(expr, format!("no translation for method {method} on {target_type}")))?;
        let arity = |allowed: &[usize]| {
            if allowed.contains(&args.len()) {
                Ok(())
            } else {
                Err(untranslatable(
                    expr,
                    format!("{method} called with {} arguments", args.len()),
                ))
            }
        };

        let element = element_type(&target_type);
        let t = self.lower(target, scope)?;

        // Collection methods optionally take one lambda; `with_lambda` renders `f(lambda, t)`.
        let with_lambda = |this: &Self, name: &'static str, scope: &mut Scope, t: SqlExpr| {
            let lambda = this.lower_lambda(expr, &args[0], element.clone(), scope)?;
            Ok::<_, ClickguardError>(function(name, vec![lambda, t]))
        };

        Ok(match resolved {
            Method::ArrayContains => {
                arity(&[1])?;
                function("has", vec![t, self.lower(&args[0], scope)?])
            }
            Method::ArrayAny => {
                arity(&[0, 1])?;
                if args.is_empty() {
                    function("notEmpty", vec![t])
                } else {
                    with_lambda(self, "arrayExists", scope, t)?
                }
            }
            Method::ArrayAll => {
                arity(&[1])?;
                with_lambda(self, "arrayAll", scope, t)?
            }
            Method::ArrayFirst => {
                arity(&[0, 1])?;
                if args.is_empty() {
                    function("arrayElement", vec![t, raw("1")])
                } else {
                    with_lambda(self, "arrayFirst", scope, t)?
                }
            }
            Method::ArrayLast => {
                arity(&[0, 1])?;
                if args.is_empty() {
                    function("arrayElement", vec![t, raw("-1")])
                } else {
                    with_lambda(self, "arrayLast", scope, t)?
                }
            }
            Method::ArrayCount => {
                arity(&[0, 1])?;
                if args.is_empty() {
                    function("length", vec![t])
                } else {
                    with_lambda(self, "arrayCount", scope, t)?
                }
            }
            Method::ArrayElementAt => {
                arity(&[1])?;
                let index = self.lower_shifted_index(expr, &args[0], scope)?;
                function("arrayElement", vec![t, index])
            }
            Method::ArrayWhere => {
                arity(&[1])?;
                with_lambda(self, "arrayFilter", scope, t)?
            }
            Method::ArraySelect => {
                arity(&[1])?;
                with_lambda(self, "arrayMap", scope, t)?
            }
            Method::ArraySum | Method::ArrayMin | Method::ArrayMax => {
                arity(&[0, 1])?;
                let name = match resolved {
                    Method::ArraySum => "arraySum",
                    Method::ArrayMin => "arrayMin",
                    _ => "arrayMax",
                };
                if args.is_empty() {
                    function(name, vec![t])
                } else {
                    with_lambda(self, name, scope, t)?
                }
            }
            Method::ArrayDistinct => {
                arity(&[0])?;
                function("arrayDistinct", vec![t])
            }
            Method::MapContainsKey => {
                arity(&[1])?;
                function("mapContains", vec![t, self.lower(&args[0], scope)?])
            }
            Method::MapContainsValue => {
                arity(&[1])?;
                function("has", vec![function("mapValues", vec![t]), self.lower(&args[0], scope)?])
            }
            Method::MapCount => {
                arity(&[0])?;
                function("length", vec![function("mapKeys", vec![t])])
            }
            Method::StringContains => {
                arity(&[1])?;
                binary(function("position", vec![t, self.lower(&args[0], scope)?]), ">", raw("0"))
            }
            Method::StringStartsWith => {
                arity(&[1])?;
                function("startsWith", vec![t, self.lower(&args[0], scope)?])
            }
            Method::StringEndsWith => {
                arity(&[1])?;
                function("endsWith", vec![t, self.lower(&args[0], scope)?])
            }
            Method::StringToUpper => {
                arity(&[0])?;
                function("upperUTF8", vec![t])
            }
            Method::StringToLower => {
                arity(&[0])?;
                function("lowerUTF8", vec![t])
            }
            Method::StringTrim => {
                arity(&[0])?;
                function("trimBoth", vec![t])
            }
            Method::StringTrimStart => {
                arity(&[0])?;
                function("trimLeft", vec![t])
            }
            Method::StringTrimEnd => {
                arity(&[0])?;
                function("trimRight", vec![t])
            }
            Method::StringSubstring => {
                arity(&[1, 2])?;
                let mut sql_args = vec![t, self.lower_shifted_index(expr, &args[0], scope)?];
                if let Some(length) = args.get(1) {
                    sql_args.push(self.lower(length, scope)?);
                }
                function("substringUTF8", sql_args)
            }
            Method::StringReplace => {
                arity(&[2])?;
                function(
                    "replaceAll",
                    vec![t, self.lower(&args[0], scope)?, self.lower(&args[1], scope)?],
                )
            }
            Method::DateAdd(unit) => {
                arity(&[1])?;
                function(unit.function(), vec![t, self.lower(&args[0], scope)?])
            }
            Method::NestedAny => {
                arity(&[0])?;
                function("notEmpty", vec![self.nested_field(expr, target, None)?])
            }
            Method::NestedCount => {
                arity(&[0])?;
                function("length", vec![self.nested_field(expr, target, None)?])
            }
            Method::StringIsNullOrEmpty
            | Method::MathAbs
            | Method::MathRound
            | Method::MathFloor
            | Method::MathCeiling
            | Method::MathMax
            | Method::MathMin => return Err(untranslatable(expr, "static function called as an instance method")),
        })
    }

    fn lower_function(
        &self,
        expr: &Expr,
        class: &str,
        name: &str,
        args: &[Expr],
        scope: &mut Scope,
    ) -> Result<SqlExpr, ClickguardError> {
        let resolved = Receiver::of_class(class)
            .and_then(|receiver| Method::resolve(receiver, name))
            .ok_or_else(|| untranslatable(expr, "no translation rule"))?;
        let lowered = args
            .iter()
            .map(|a| self.lower(a, scope))
            .collect::<Result<Vec<_>, _>>()?;
        let expect = |n: &[usize]| {
            if n.contains(&args.len()) {
                Ok(())
            } else {
                Err(untranslatable(expr, format!("called with {} arguments", args.len())))
            }
        };

        match resolved {
            Method::StringIsNullOrEmpty => {
                expect(&[1])?;
                let nullable = self.type_of(&args[0], scope).map(|t| t.is_nullable()).unwrap_or(true);
                let mut lowered = lowered;
                let value = lowered.remove(0);
                if nullable {
                    Ok(function("empty", vec![function("ifNull", vec![value, raw("''")])]))
                } else {
                    Ok(function("empty", vec![value]))
                }
            }
            Method::MathAbs => expect(&[1]).map(|_| function("abs", lowered)),
            // Host rounding defaults to half-to-even.
            Method::MathRound => expect(&[1, 2]).map(|_| function("roundBankers", lowered)),
            Method::MathFloor => expect(&[1]).map(|_| function("floor", lowered)),
            Method::MathCeiling => expect(&[1]).map(|_| function("ceil", lowered)),
            Method::MathMax => expect(&[2]).map(|_| function("greatest", lowered)),
            Method::MathMin => expect(&[2]).map(|_| function("least", lowered)),
            _ => Err(untranslatable(expr, "instance method called as a static function")),
        }
    }

    fn lower_index(&self, expr: &Expr, target: &Expr, index: &Expr, scope: &mut Scope) -> Result<SqlExpr, ClickguardError> {
        let (receiver, _) = self.receiver(expr, target, scope)?;
        match receiver {
            Receiver::Array => {
                let i = self.lower_shifted_index(expr, index, scope)?;
                Ok(function("arrayElement", vec![self.lower(target, scope)?, i]))
            }
            Receiver::Map => Ok(SqlExpr::Subscript {
                target: Box::new(self.lower(target, scope)?),
                index: Box::new(self.lower(index, scope)?),
            }),
            Receiver::String => {
                let i = self.lower_shifted_index(expr, index, scope)?;
                Ok(function("substringUTF8", vec![self.lower(target, scope)?, i, raw("1")]))
            }
            Receiver::Json => {
                let i = self.lower_shifted_index(expr, index, scope)?;
                Ok(SqlExpr::Subscript {
                    target: Box::new(self.lower(target, scope)?),
                    index: Box::new(i),
                })
            }
            _ => Err(untranslatable(expr, "target does not support indexing")),
        }
    }

    /// Static type of an expression, when it can be determined.
    pub(crate) fn type_of(&self, expr: &Expr, scope: &Scope) -> Option<AppType> {
        match expr {
            Expr::Column { app_type, .. } | Expr::Parameter { app_type, .. } => Some(app_type.clone()),
            Expr::Convert { app_type, .. } => Some(app_type.clone()),
            Expr::Constant(value) => value_type(value),
            Expr::LambdaParameter(name) => scope.lambda_type(name).flatten().cloned(),
            Expr::Lambda { .. } | Expr::Opaque(_) => None,
            Expr::Binary { op, left, right } => {
                if op.is_comparison() || op.is_logical() {
                    Some(AppType::Bool)
                } else {
                    self.type_of(left, scope).or_else(|| self.type_of(right, scope))
                }
            }
            Expr::Unary { op: UnaryOp::Not, .. } => Some(AppType::Bool),
            Expr::Unary { operand, .. } => self.type_of(operand, scope),
            Expr::Member { target, member } => {
                let target_type = self.type_of(target, scope)?;
                match target_type.underlying() {
                    AppType::Json => return Some(AppType::Json),
                    AppType::Nested(record) => {
                        if let Some((_, t)) = record.fields.iter().find(|(n, _)| n == member) {
                            return Some(AppType::array(t.clone()));
                        }
                    }
                    _ => {}
                }
                let resolved = Member::resolve(Receiver::of(&target_type)?, member)?;
                Some(match (resolved, target_type.underlying()) {
                    (Member::MapKeys, AppType::Map(k, _)) => AppType::array(k.as_ref().clone()),
                    (Member::MapValues, AppType::Map(_, v)) => AppType::array(v.as_ref().clone()),
                    (Member::DatePart(DatePart::Date), _) => AppType::Date,
                    (Member::DatePart(_), _) => AppType::Int32,
                    _ => AppType::UInt64,
                })
            }
            Expr::Call { target, method, .. } => {
                let target_type = self.type_of(target, scope)?;
                let resolved = Method::resolve(Receiver::of(&target_type)?, method)?;
                match resolved {
                    Method::ArrayFirst | Method::ArrayLast | Method::ArrayElementAt | Method::ArrayMin | Method::ArrayMax => {
                        element_type(&target_type)
                    }
                    Method::ArraySum => element_type(&target_type),
                    Method::ArrayWhere | Method::ArrayDistinct => Some(target_type),
                    // Element type of the projection is unknown without the lambda body type.
                    Method::ArraySelect => None,
                    Method::ArrayCount | Method::MapCount | Method::NestedCount => Some(AppType::UInt64),
                    Method::StringToUpper
                    | Method::StringToLower
                    | Method::StringTrim
                    | Method::StringTrimStart
                    | Method::StringTrimEnd
                    | Method::StringSubstring
                    | Method::StringReplace => Some(AppType::String),
                    Method::DateAdd(_) => Some(target_type),
                    _ => Some(AppType::Bool),
                }
            }
            Expr::Function { class, name, arguments } => {
                let resolved = Method::resolve(Receiver::of_class(class)?, name)?;
                match resolved {
                    Method::StringIsNullOrEmpty => Some(AppType::Bool),
                    _ => arguments.first().and_then(|a| self.type_of(a, scope)),
                }
            }
            Expr::Index { target, .. } => {
                let target_type = self.type_of(target, scope)?;
                match target_type.underlying() {
                    AppType::Array(inner) => Some(inner.as_ref().clone()),
                    AppType::Map(_, v) => Some(v.as_ref().clone()),
                    AppType::String => Some(AppType::String),
                    AppType::Json => Some(AppType::Json),
                    _ => None,
                }
            }
            Expr::JsonPath { .. } => Some(AppType::Json),
            Expr::Conditional { if_true, if_false, .. } => {
                self.type_of(if_true, scope).or_else(|| self.type_of(if_false, scope))
            }
            Expr::Coalesce { left, right } => self
                .type_of(left, scope)
                .map(|t| t.underlying().clone())
                .or_else(|| self.type_of(right, scope)),
        }
    }
}

/// Zero-based host index to one-based ClickHouse index; negatives count from the end.
///
/// `None` when the shifted index does not fit in `i64`.
pub fn shift_index(index: i64) -> Option<i64> {
    if index >= 0 {
        index.checked_add(1)
    } else {
        Some(index)
    }
}

fn shifted_constant(expr: &Expr, index: i64) -> Result<i64, ClickguardError> {
    shift_index(index).ok_or_else(|| untranslatable(expr, format!("index {index} overflows a one-based index")))
}
