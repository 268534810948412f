//! Reverse direction of the type mapping table: ClickHouse type syntax back to an
//! application type.
//!
//! Type arguments that have no place in [`AppType`] (decimal precision, `FixedString`
//! length, `DateTime64` precision and timezone, `LowCardinality`) are dropped.

use crate::error::ClickguardError;
use crate::types::app_type::{AppType, EnumDef, EnumMember, RecordDef};

/// Parse a ClickHouse store type such as `Array(Nullable(String))`.
pub fn parse_store_type(store_type: &str) -> Result<AppType, ClickguardError> {
    let s = store_type.trim();
    let (name, args) = match s.find('(') {
        Some(open) if s.ends_with(')') => (s[..open].trim(), Some(&s[open + 1..s.len() - 1])),
        Some(_) => return Err(ClickguardError::mapping(s, "unbalanced parentheses")),
        None => (s, None),
    };

    let scalar = match name {
        "Bool" | "Boolean" => Some(AppType::Bool),
        "Int8" => Some(AppType::Int8),
        "Int16" => Some(AppType::Int16),
        "Int32" => Some(AppType::Int32),
        "Int64" => Some(AppType::Int64),
        "Int128" => Some(AppType::Int128),
        "UInt8" => Some(AppType::UInt8),
        "UInt16" => Some(AppType::UInt16),
        "UInt32" => Some(AppType::UInt32),
        "UInt64" => Some(AppType::UInt64),
        "UInt128" => Some(AppType::UInt128),
        "Int256" | "UInt256" => Some(AppType::BigInteger),
        "Float32" => Some(AppType::Float32),
        "Float64" => Some(AppType::Float64),
        "Decimal" | "Decimal32" | "Decimal64" | "Decimal128" | "Decimal256" => Some(AppType::Decimal),
        "String" | "FixedString" => Some(AppType::String),
        "Date" | "Date32" => Some(AppType::Date),
        "DateTime" | "DateTime64" => Some(AppType::DateTime),
        "UUID" => Some(AppType::Uuid),
        "IPv4" => Some(AppType::IpV4),
        "IPv6" => Some(AppType::IpV6),
        "JSON" | "Object" => Some(AppType::Json),
        _ => None,
    };
    if let Some(t) = scalar {
        return Ok(t);
    }

    let args = args.ok_or_else(|| ClickguardError::mapping(s, "unknown ClickHouse type"))?;
    match name {
        "Nullable" => Ok(AppType::nullable(parse_store_type(args)?)),
        "LowCardinality" => parse_store_type(args),
        "Array" => Ok(AppType::array(parse_store_type(args)?)),
        "Map" => match split_top_level(args).as_slice() {
            [key, value] => Ok(AppType::map(parse_store_type(key)?, parse_store_type(value)?)),
            _ => Err(ClickguardError::mapping(s, "Map takes exactly two type arguments")),
        },
        "Tuple" => split_top_level(args)
            .into_iter()
            .map(|element| parse_store_type(strip_element_name(element).1))
            .collect::<Result<Vec<_>, _>>()
            .map(AppType::Tuple),
        "Nested" => {
            let fields = split_top_level(args)
                .into_iter()
                .map(|element| match strip_element_name(element) {
                    (Some(field), ty) => Ok((field.to_string(), parse_store_type(ty)?)),
                    (None, _) => Err(ClickguardError::mapping(s, "Nested fields need names")),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AppType::Nested(RecordDef {
                name: "Nested".to_string(),
                fields,
            }))
        }
        "Enum8" | "Enum16" | "Enum" => {
            let members = split_top_level(args)
                .into_iter()
                .map(|entry| parse_enum_member(s, entry))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AppType::Enum(EnumDef {
                name: name.to_string(),
                members,
            }))
        }
        _ => Err(ClickguardError::mapping(s, "unknown ClickHouse type")),
    }
}

/// Split type arguments on top-level commas, respecting parentheses and quotes.
fn split_top_level(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, ch) in args.char_indices() {
        if in_quote {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '\'' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '\'' => in_quote = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = args[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

/// Split `name Type` into its parts; unnamed elements return `None`.
fn strip_element_name(element: &str) -> (Option<&str>, &str) {
    match element.split_once(char::is_whitespace) {
        Some((head, rest)) if !head.contains('(') && !rest.trim().is_empty() && !head.ends_with(',') => {
            (Some(head.trim_matches('"').trim_matches('`')), rest.trim())
        }
        _ => (None, element),
    }
}

fn parse_enum_member(store_type: &str, entry: &str) -> Result<EnumMember, ClickguardError> {
    let (name, value) = entry
        .rsplit_once('=')
        .ok_or_else(|| ClickguardError::mapping(store_type, format!("enum entry '{entry}' has no value")))?;
    let name = name.trim();
    let name = name
        .strip_prefix('\'')
        .and_then(|n| n.strip_suffix('\''))
        .ok_or_else(|| ClickguardError::mapping(store_type, format!("enum name {name} is not quoted")))?;
    let value = value
        .trim()
        .parse::<i64>()
        .map_err(|e| ClickguardError::mapping(store_type, format!("enum value in '{entry}': {e}")))?;
    Ok(EnumMember {
        name: name.replace("\\'", "'").replace("\\\\", "\\"),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::mapping::{resolve_column_type, TypeConfig};

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse_store_type("Int32").unwrap(), AppType::Int32);
        assert_eq!(parse_store_type("UInt256").unwrap(), AppType::BigInteger);
        assert_eq!(parse_store_type("Decimal(18, 4)").unwrap(), AppType::Decimal);
        assert_eq!(parse_store_type("DateTime64(3, 'UTC')").unwrap(), AppType::DateTime);
        assert_eq!(parse_store_type("FixedString(16)").unwrap(), AppType::String);
    }

    #[test]
    fn test_parse_wrappers_and_composites() {
        assert_eq!(
            parse_store_type("LowCardinality(Nullable(String))").unwrap(),
            AppType::nullable(AppType::String)
        );
        assert_eq!(
            parse_store_type("Map(String, Array(Nullable(Int64)))").unwrap(),
            AppType::map(AppType::String, AppType::array(AppType::nullable(AppType::Int64)))
        );
        assert_eq!(
            parse_store_type("Tuple(a String, b DateTime64(3, 'UTC'))").unwrap(),
            AppType::Tuple(vec![AppType::String, AppType::DateTime])
        );
    }

    #[test]
    fn test_parse_enum_round_trips_through_mapping() {
        let def = EnumDef::new("Enum8", [("Active", 1), ("It's, odd", -2)]);
        let rendered = resolve_column_type(&AppType::Enum(def.clone()), &TypeConfig::default()).unwrap();
        assert_eq!(parse_store_type(&rendered).unwrap(), AppType::Enum(def));
    }

    #[test]
    fn test_parse_nested() {
        let parsed = parse_store_type("Nested(Sku String, Qty UInt32)").unwrap();
        match parsed {
            AppType::Nested(record) => {
                assert_eq!(record.first_field(), Some("Sku"));
                assert_eq!(record.fields[1].1, AppType::UInt32);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_fails() {
        assert!(parse_store_type("Geometry").is_err());
        assert!(parse_store_type("Array(String").is_err());
    }
}
