//! Constant values and their ClickHouse literal syntax.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::ClickguardError;
use crate::sql_helper::SqlHelper;

/// A constant appearing in a query expression, a data operation or a default.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    /// Decimal text of a 128/256-bit integer.
    BigInt(String),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Uuid(Uuid),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    /// Parse the decimal text of a big integer.
    pub fn big_int(text: &str) -> Result<Self, ClickguardError> {
        let digits = text.strip_prefix('-').unwrap_or(text);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ClickguardError::mapping(
                "BigInteger",
                format!("'{text}' is not an integer"),
            ));
        }
        Ok(Value::BigInt(text.to_string()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Value::Int(i) => *i < 0,
            Value::BigInt(text) => text.starts_with('-'),
            Value::Float(f) => *f < 0.0,
            Value::Decimal(d) => d.is_sign_negative() && !d.is_zero(),
            _ => false,
        }
    }

    /// Integer view of the value, if it is a whole number that fits `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_string().parse().ok(),
            _ => None,
        }
    }

    /// The ClickHouse type used when this value is bound as a parameter.
    pub fn store_type(&self) -> String {
        match self {
            Value::Null => "Nullable(Nothing)".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::Int(_) => "Int64".to_string(),
            Value::UInt(_) => "UInt64".to_string(),
            Value::BigInt(_) => "Int256".to_string(),
            Value::Float(_) => "Float64".to_string(),
            Value::Decimal(d) => format!("Decimal(38, {})", d.scale()),
            Value::String(_) => "String".to_string(),
            Value::Date(_) => "Date".to_string(),
            Value::DateTime(_) => "DateTime64(3)".to_string(),
            Value::Uuid(_) => "UUID".to_string(),
            Value::Json(_) => "JSON".to_string(),
            Value::Array(items) => match items.iter().find(|v| !v.is_null()) {
                Some(first) => format!("Array({})", first.store_type()),
                None => "Array(Nothing)".to_string(),
            },
        }
    }

    /// Render as an inline ClickHouse literal.
    pub fn to_sql_literal(&self, helper: &SqlHelper) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => helper.format_boolean_literal(*b).to_string(),
            Value::Int(i) => i.to_string(),
            Value::UInt(u) => u.to_string(),
            Value::BigInt(text) => format!("toInt256({})", helper.string_literal(text)),
            Value::Float(f) => format_float(*f),
            Value::Decimal(d) => d.to_string(),
            Value::String(s) => helper.string_literal(s),
            Value::Date(d) => format!("toDate({})", helper.string_literal(&d.format("%Y-%m-%d").to_string())),
            Value::DateTime(dt) => format!(
                "toDateTime64({}, 3)",
                helper.string_literal(&dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            ),
            Value::Uuid(u) => format!("toUUID({})", helper.string_literal(&u.to_string())),
            Value::Json(json) => helper.string_literal(&json.to_string()),
            Value::Array(items) => {
                let parts = items.iter().map(|v| v.to_sql_literal(helper)).collect::<Vec<_>>();
                format!("[{}]", parts.join(", "))
            }
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql_literal(&SqlHelper::default()))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_scalar_literals() {
        let helper = SqlHelper::default();
        assert_eq!(Value::Null.to_sql_literal(&helper), "NULL");
        assert_eq!(Value::Bool(true).to_sql_literal(&helper), "true");
        assert_eq!(Value::Int(-7).to_sql_literal(&helper), "-7");
        assert_eq!(Value::Float(0.025).to_sql_literal(&helper), "0.025");
        assert_eq!(Value::from("it's").to_sql_literal(&helper), "'it\\'s'");
        assert_eq!(
            Value::Decimal(Decimal::from_str("12.50").unwrap()).to_sql_literal(&helper),
            "12.50"
        );
    }

    #[test]
    fn test_temporal_and_uuid_literals() {
        let helper = SqlHelper::default();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(Value::Date(date).to_sql_literal(&helper), "toDate('2024-03-09')");
        let dt = date.and_hms_milli_opt(13, 5, 7, 42).unwrap();
        assert_eq!(
            Value::DateTime(dt).to_sql_literal(&helper),
            "toDateTime64('2024-03-09 13:05:07.042', 3)"
        );
        let id = Uuid::nil();
        assert_eq!(
            Value::Uuid(id).to_sql_literal(&helper),
            "toUUID('00000000-0000-0000-0000-000000000000')"
        );
    }

    #[test]
    fn test_array_literal_and_store_type() {
        let helper = SqlHelper::default();
        let arr = Value::Array(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(arr.to_sql_literal(&helper), "['a', 'b']");
        assert_eq!(arr.store_type(), "Array(String)");
        assert_eq!(Value::Array(vec![]).store_type(), "Array(Nothing)");
    }

    #[test]
    fn test_big_int_validation() {
        assert!(Value::big_int("123456789012345678901234567890").is_ok());
        assert!(Value::big_int("-5").unwrap().is_negative());
        assert!(Value::big_int("12a").is_err());
        assert!(Value::big_int("-").is_err());
    }
}
