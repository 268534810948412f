//! Minimal SQL expression AST emitted by the translator.
//!
//! Identifiers and literals are stored already quoted by [`crate::SqlHelper`]; `Display`
//! only handles structure and parenthesisation.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// Quoted identifier, possibly table-qualified.
    Identifier(String),
    /// Rendered literal or placeholder.
    Raw(String),
    Function {
        name: &'static str,
        args: Vec<SqlExpr>,
    },
    Binary {
        left: Box<SqlExpr>,
        op: &'static str,
        right: Box<SqlExpr>,
    },
    Not(Box<SqlExpr>),
    Negate(Box<SqlExpr>),
    IsNull {
        operand: Box<SqlExpr>,
        negated: bool,
    },
    /// `base.key`, key already quoted.
    Subcolumn {
        base: Box<SqlExpr>,
        key: String,
    },
    /// `target[index]`.
    Subscript {
        target: Box<SqlExpr>,
        index: Box<SqlExpr>,
    },
    Lambda {
        parameters: Vec<String>,
        body: Box<SqlExpr>,
    },
    Cast {
        operand: Box<SqlExpr>,
        type_name: String,
    },
}

pub fn function(name: &'static str, args: Vec<SqlExpr>) -> SqlExpr {
    SqlExpr::Function { name, args }
}

pub fn binary(left: SqlExpr, op: &'static str, right: SqlExpr) -> SqlExpr {
    SqlExpr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

pub fn raw(text: impl Into<String>) -> SqlExpr {
    SqlExpr::Raw(text.into())
}

impl SqlExpr {
    fn needs_parens(&self) -> bool {
        matches!(
            self,
            SqlExpr::Binary { .. } | SqlExpr::Not(_) | SqlExpr::IsNull { .. } | SqlExpr::Lambda { .. }
        )
    }
}

struct Operand<'a>(&'a SqlExpr);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.needs_parens() {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlExpr::Identifier(s) | SqlExpr::Raw(s) => f.write_str(s),
            SqlExpr::Function { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            SqlExpr::Binary { left, op, right } => write!(f, "{} {} {}", Operand(left), op, Operand(right)),
            SqlExpr::Not(operand) => write!(f, "NOT {}", Operand(operand)),
            SqlExpr::Negate(operand) => write!(f, "-{}", Operand(operand)),
            SqlExpr::IsNull { operand, negated } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{} IS{} NULL", Operand(operand), not)
            }
            SqlExpr::Subcolumn { base, key } => write!(f, "{}.{}", Operand(base), key),
            SqlExpr::Subscript { target, index } => write!(f, "{}[{}]", Operand(target), index),
            SqlExpr::Lambda { parameters, body } => {
                if parameters.len() == 1 {
                    write!(f, "{} -> {}", parameters[0], body)
                } else {
                    write!(f, "({}) -> {}", parameters.join(", "), body)
                }
            }
            SqlExpr::Cast { operand, type_name } => write!(f, "CAST({} AS {})", operand, type_name),
        }
    }
}
