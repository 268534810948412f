//! Query expression tree handed over by the host query layer.

use crate::error::ClickguardError;
use crate::types::{AppType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// One step of a JSON subcolumn path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonSegment {
    Key(String),
    /// Zero-based array index; negative values count from the end.
    Index(i64),
}

/// Parse a dotted JSON path such as `a.tags[0].name`.
pub fn parse_json_path(path: &str) -> Result<Vec<JsonSegment>, ClickguardError> {
    let bad = |reason: &str| ClickguardError::untranslatable(format!("JSON path '{path}'"), reason);
    let mut segments = Vec::new();

    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(open) => (&part[..open], &part[open..]),
            None => (part, ""),
        };
        if key.is_empty() {
            return Err(bad("empty key segment"));
        }
        segments.push(JsonSegment::Key(key.to_string()));

        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(|| bad("unclosed '['"))?;
            let index = rest[1..close]
                .trim()
                .parse::<i64>()
                .map_err(|_| bad("array index must be an integer"))?;
            segments.push(JsonSegment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(bad("unexpected text after ']'"));
            }
        }
    }
    Ok(segments)
}

/// A node of the host query expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column {
        table: Option<String>,
        name: String,
        app_type: AppType,
    },
    Constant(Value),
    /// A value bound at execution time.
    Parameter {
        name: String,
        app_type: AppType,
    },
    LambdaParameter(String),
    Lambda {
        parameters: Vec<String>,
        body: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Property access such as `list.Count` or `date.Year`.
    Member {
        target: Box<Expr>,
        member: String,
    },
    /// Instance method call such as `tags.Contains(x)`.
    Call {
        target: Box<Expr>,
        method: String,
        arguments: Vec<Expr>,
    },
    /// Static function call such as `Math.Abs(x)`.
    Function {
        class: String,
        name: String,
        arguments: Vec<Expr>,
    },
    /// Indexer with host (zero-based) semantics.
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    JsonPath {
        target: Box<Expr>,
        path: Vec<JsonSegment>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Coalesce {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Convert {
        operand: Box<Expr>,
        app_type: AppType,
    },
    /// A host construct with no server-side equivalent.
    Opaque(String),
}

impl Expr {
    pub fn column(name: impl Into<String>, app_type: AppType) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
            app_type,
        }
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn parameter(name: impl Into<String>, app_type: AppType) -> Self {
        Expr::Parameter {
            name: name.into(),
            app_type,
        }
    }

    pub fn lambda(parameter: impl Into<String>, body: Expr) -> Self {
        Expr::Lambda {
            parameters: vec![parameter.into()],
            body: Box::new(body),
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::LambdaParameter(name.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }
    }

    pub fn negate(operand: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(operand),
        }
    }

    pub fn equals(self, other: Expr) -> Self {
        Expr::binary(BinaryOp::Eq, self, other)
    }

    pub fn greater_than(self, other: Expr) -> Self {
        Expr::binary(BinaryOp::Gt, self, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::binary(BinaryOp::And, self, other)
    }

    pub fn member(self, member: impl Into<String>) -> Self {
        Expr::Member {
            target: Box::new(self),
            member: member.into(),
        }
    }

    pub fn call(self, method: impl Into<String>, arguments: Vec<Expr>) -> Self {
        Expr::Call {
            target: Box::new(self),
            method: method.into(),
            arguments,
        }
    }

    pub fn function(class: impl Into<String>, name: impl Into<String>, arguments: Vec<Expr>) -> Self {
        Expr::Function {
            class: class.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn index(self, index: Expr) -> Self {
        Expr::Index {
            target: Box::new(self),
            index: Box::new(index),
        }
    }

    /// JSON subcolumn access; fails on a malformed path.
    pub fn json_path(self, path: &str) -> Result<Self, ClickguardError> {
        Ok(Expr::JsonPath {
            target: Box::new(self),
            path: parse_json_path(path)?,
        })
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Expr::Column { name, .. } => format!("column {name}"),
            Expr::Constant(v) => format!("constant {v}"),
            Expr::Parameter { name, .. } => format!("parameter {name}"),
            Expr::LambdaParameter(name) => format!("lambda parameter {name}"),
            Expr::Lambda { .. } => "lambda".to_string(),
            Expr::Binary { op, .. } => format!("binary {}", op.symbol()),
            Expr::Unary { op, .. } => format!("unary {op:?}"),
            Expr::Member { member, .. } => format!("member {member}"),
            Expr::Call { method, .. } => format!("method {method}()"),
            Expr::Function { class, name, .. } => format!("function {class}.{name}()"),
            Expr::Index { .. } => "indexer".to_string(),
            Expr::JsonPath { .. } => "JSON path".to_string(),
            Expr::Conditional { .. } => "conditional".to_string(),
            Expr::Coalesce { .. } => "coalesce".to_string(),
            Expr::Convert { app_type, .. } => format!("conversion to {app_type}"),
            Expr::Opaque(description) => description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_path() {
        assert_eq!(
            parse_json_path("a.tags[0].name").unwrap(),
            vec![
                JsonSegment::Key("a".into()),
                JsonSegment::Key("tags".into()),
                JsonSegment::Index(0),
                JsonSegment::Key("name".into()),
            ]
        );
        assert_eq!(
            parse_json_path("m[1][-1]").unwrap(),
            vec![JsonSegment::Key("m".into()), JsonSegment::Index(1), JsonSegment::Index(-1)]
        );
    }

    #[test]
    fn test_parse_json_path_errors() {
        assert!(parse_json_path("a..b").is_err());
        assert!(parse_json_path("a[0").is_err());
        assert!(parse_json_path("a[x]").is_err());
        assert!(parse_json_path("a[0]b").is_err());
    }
}
