//! Application-level value types.
//!
//! [`AppType`] is the closed set of value types the host model can declare on a column.
//! The type mapping table turns each of them into ClickHouse type syntax.

use std::fmt;

/// Storage width chosen for an enum column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumWidth {
    Enum8,
    Enum16,
}

impl EnumWidth {
    pub fn type_name(&self) -> &'static str {
        match self {
            EnumWidth::Enum8 => "Enum8",
            EnumWidth::Enum16 => "Enum16",
        }
    }
}

/// One named enum member. The name, not the numeric code, travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

/// An enum type declared by the application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<EnumMember>,
}

impl EnumDef {
    pub fn new<N: Into<String>>(name: impl Into<String>, members: impl IntoIterator<Item = (N, i64)>) -> Self {
        Self {
            name: name.into(),
            members: members
                .into_iter()
                .map(|(name, value)| EnumMember {
                    name: name.into(),
                    value,
                })
                .collect(),
        }
    }

    /// Pick the narrowest enum storage for the declared value set.
    ///
    /// Returns `None` when the values do not fit 16 bits or there are more than 65536
    /// members. Declaration order does not affect the result.
    pub fn width(&self) -> Option<EnumWidth> {
        let count = self.members.len();
        let fits = |min: i64, max: i64| self.members.iter().all(|m| m.value >= min && m.value <= max);

        if count <= 256 && fits(i8::MIN as i64, i8::MAX as i64) {
            Some(EnumWidth::Enum8)
        } else if count <= 65536 && fits(i16::MIN as i64, i16::MAX as i64) {
            Some(EnumWidth::Enum16)
        } else {
            None
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }
}

/// A plain-data record whose readable fields become parallel arrays of a `Nested` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordDef {
    pub name: String,
    pub fields: Vec<(String, AppType)>,
}

impl RecordDef {
    pub fn new<N: Into<String>>(name: impl Into<String>, fields: impl IntoIterator<Item = (N, AppType)>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(|(n, t)| (n.into(), t)).collect(),
        }
    }

    /// Name of the first declared field. All parallel arrays share its length.
    pub fn first_field(&self) -> Option<&str> {
        self.fields.first().map(|(name, _)| name.as_str())
    }
}

/// Application value types with a ClickHouse mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    /// 256-bit integer; signed unless the column opts into unsigned storage.
    BigInteger,
    Float32,
    Float64,
    Decimal,
    String,
    Bytes,
    Date,
    DateTime,
    DateTimeOffset,
    Uuid,
    /// 4-byte address.
    IpV4,
    /// 16-byte (or IPv4-mapped) address.
    IpV6,
    Json,
    Enum(EnumDef),
    Array(Box<AppType>),
    Map(Box<AppType>, Box<AppType>),
    Tuple(Vec<AppType>),
    Nested(RecordDef),
    Nullable(Box<AppType>),
    /// A host type with no mapping. Resolving it always fails.
    Other(String),
}

impl AppType {
    pub fn nullable(inner: AppType) -> Self {
        AppType::Nullable(Box::new(inner))
    }

    pub fn array(element: AppType) -> Self {
        AppType::Array(Box::new(element))
    }

    pub fn map(key: AppType, value: AppType) -> Self {
        AppType::Map(Box::new(key), Box::new(value))
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, AppType::Nullable(_))
    }

    /// The type with any `Nullable` layer removed.
    pub fn underlying(&self) -> &AppType {
        match self {
            AppType::Nullable(inner) => inner.underlying(),
            other => other,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.underlying(), AppType::Array(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self.underlying(), AppType::Map(_, _))
    }

    pub fn is_json(&self) -> bool {
        matches!(self.underlying(), AppType::Json)
    }

    pub fn is_string(&self) -> bool {
        matches!(self.underlying(), AppType::String)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self.underlying(),
            AppType::Date | AppType::DateTime | AppType::DateTimeOffset
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.underlying(),
            AppType::Int8
                | AppType::Int16
                | AppType::Int32
                | AppType::Int64
                | AppType::Int128
                | AppType::UInt8
                | AppType::UInt16
                | AppType::UInt32
                | AppType::UInt64
                | AppType::UInt128
                | AppType::BigInteger
                | AppType::Float32
                | AppType::Float64
                | AppType::Decimal
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self.underlying(),
            AppType::UInt8 | AppType::UInt16 | AppType::UInt32 | AppType::UInt64 | AppType::UInt128
        )
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppType::Enum(def) => write!(f, "enum {}", def.name),
            AppType::Array(inner) => write!(f, "{inner}[]"),
            AppType::Map(k, v) => write!(f, "map<{k}, {v}>"),
            AppType::Tuple(items) => {
                let parts = items.iter().map(|t| t.to_string()).collect::<Vec<_>>();
                write!(f, "({})", parts.join(", "))
            }
            AppType::Nested(record) => write!(f, "list<{}>", record.name),
            AppType::Nullable(inner) => write!(f, "{inner}?"),
            AppType::Other(name) => f.write_str(name),
            other => write!(f, "{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum8_when_values_fit_signed_byte() {
        let def = EnumDef::new("Status", [("Active", 1), ("Inactive", -128), ("Gone", 127)]);
        assert_eq!(def.width(), Some(EnumWidth::Enum8));
    }

    #[test]
    fn test_enum16_when_value_out_of_byte_range() {
        let def = EnumDef::new("Code", [("Low", 0), ("High", 128)]);
        assert_eq!(def.width(), Some(EnumWidth::Enum16));
    }

    #[test]
    fn test_enum16_when_more_than_256_members() {
        let members: Vec<(String, i64)> = (0..257).map(|i| (format!("M{i}"), (i % 100) as i64)).collect();
        let def = EnumDef::new("Big", members);
        assert_eq!(def.width(), Some(EnumWidth::Enum16));
    }

    #[test]
    fn test_enum_width_independent_of_declaration_order() {
        let forward = EnumDef::new("E", [("A", -5), ("B", 300), ("C", 7)]);
        let reversed = EnumDef::new("E", [("C", 7), ("B", 300), ("A", -5)]);
        assert_eq!(forward.width(), reversed.width());
    }

    #[test]
    fn test_enum_too_wide() {
        let def = EnumDef::new("Huge", [("A", 40_000)]);
        assert_eq!(def.width(), None);
    }

    #[test]
    fn test_underlying_strips_nullable() {
        let t = AppType::nullable(AppType::array(AppType::String));
        assert!(t.is_nullable());
        assert!(t.is_array());
        assert_eq!(t.underlying(), &AppType::array(AppType::String));
    }
}
