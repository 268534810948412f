//! SQL generation helper for the ClickHouse dialect.
//!
//! ClickHouse escapes string literals with backslashes rather than by doubling quotes,
//! and binds parameters through `{name:Type}` placeholders. Everything that renders SQL
//! text in this crate goes through [`SqlHelper`] so those rules live in one place.

use once_cell::sync::Lazy;
use regex::Regex;

static PLAIN_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Whether `name` may appear unquoted: setting names, parameter names, lambda parameters.
pub fn is_plain_identifier(name: &str) -> bool {
    PLAIN_IDENTIFIER.is_match(name)
}

/// Pure string transforms used by the translator and the DDL generators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlHelper {
    statement_terminator: String,
}

impl Default for SqlHelper {
    fn default() -> Self {
        Self::new(";")
    }
}

impl SqlHelper {
    pub fn new(statement_terminator: impl Into<String>) -> Self {
        Self {
            statement_terminator: statement_terminator.into(),
        }
    }

    pub fn statement_terminator(&self) -> &str {
        &self.statement_terminator
    }

    /// Double every embedded double quote.
    pub fn escape_identifier(&self, name: &str) -> String {
        name.replace('"', "\"\"")
    }

    /// Quote an identifier, optionally qualified by a schema (database).
    ///
    /// ```
    /// use clickguard::SqlHelper;
    ///
    /// let helper = SqlHelper::default();
    /// assert_eq!(helper.delimit_identifier("events", Some("analytics")), "\"analytics\".\"events\"");
    /// assert_eq!(helper.delimit_identifier("a\"b", None), "\"a\"\"b\"");
    /// ```
    pub fn delimit_identifier(&self, name: &str, schema: Option<&str>) -> String {
        match schema {
            Some(schema) if !schema.is_empty() => format!(
                "\"{}\".\"{}\"",
                self.escape_identifier(schema),
                self.escape_identifier(name)
            ),
            _ => format!("\"{}\"", self.escape_identifier(name)),
        }
    }

    /// Quote and join a column list: `"a", "b"`.
    pub fn delimit_column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.delimit_identifier(c, None))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Backslash-escape a string literal body.
    pub fn escape_string_literal(&self, value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for ch in value.chars() {
            match ch {
                '\\' => escaped.push_str("\\\\"),
                '\'' => escaped.push_str("\\'"),
                '\n' => escaped.push_str("\\n"),
                '\r' => escaped.push_str("\\r"),
                '\t' => escaped.push_str("\\t"),
                '\0' => escaped.push_str("\\0"),
                other => escaped.push(other),
            }
        }
        escaped
    }

    /// A complete single-quoted string literal.
    pub fn string_literal(&self, value: &str) -> String {
        format!("'{}'", self.escape_string_literal(value))
    }

    /// `{name:Type}` placeholder; untyped placeholders bind as `String`.
    pub fn format_parameter_placeholder(&self, name: &str, store_type: Option<&str>) -> String {
        format!("{{{}:{}}}", name, store_type.unwrap_or("String"))
    }

    pub fn format_boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }

    /// Append the configured statement terminator.
    pub fn terminate(&self, statement: &str) -> String {
        format!("{}{}", statement, self.statement_terminator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal inverse of `delimit_identifier` for unqualified names.
    fn unquote(quoted: &str) -> String {
        let inner = &quoted[1..quoted.len() - 1];
        inner.replace("\"\"", "\"")
    }

    #[test]
    fn test_identifier_round_trip() {
        let helper = SqlHelper::default();
        for name in ["plain", "with\"quote", "\"\"", "\"edge\"", "", "a\"b\"c"] {
            let quoted = helper.delimit_identifier(name, None);
            assert!(quoted.starts_with('"') && quoted.ends_with('"'));
            assert_eq!(unquote(&quoted), name);
        }
    }

    #[test]
    fn test_schema_qualification() {
        let helper = SqlHelper::default();
        assert_eq!(helper.delimit_identifier("t", Some("db")), "\"db\".\"t\"");
        assert_eq!(helper.delimit_identifier("t", Some("")), "\"t\"");
    }

    #[test]
    fn test_string_literal_uses_backslash_escaping() {
        let helper = SqlHelper::default();
        assert_eq!(helper.string_literal("O'Brien"), "'O\\'Brien'");
        assert_eq!(helper.escape_string_literal("a\\b"), "a\\\\b");
        assert_eq!(helper.escape_string_literal("l1\nl2\r\t\0"), "l1\\nl2\\r\\t\\0");
        // Never SQL-standard doubling.
        assert!(!helper.string_literal("it's").contains("''"));
    }

    #[test]
    fn test_parameter_placeholder() {
        let helper = SqlHelper::default();
        assert_eq!(helper.format_parameter_placeholder("id", Some("UInt64")), "{id:UInt64}");
        assert_eq!(helper.format_parameter_placeholder("name", None), "{name:String}");
    }

    #[test]
    fn test_boolean_and_terminator() {
        let helper = SqlHelper::new(";\n");
        assert_eq!(helper.format_boolean_literal(true), "true");
        assert_eq!(helper.format_boolean_literal(false), "false");
        assert_eq!(helper.terminate("SELECT 1"), "SELECT 1;\n");
    }
}
