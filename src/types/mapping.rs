//! Type mapping table: application types to ClickHouse type syntax.
//!
//! The mapping is a pure function of `(AppType, TypeConfig)`. Wrapping order is always
//! `LowCardinality(Nullable(Base))`. JSON and the composite types (Array, Map, Tuple,
//! Nested) are never wrapped in `Nullable`: JSON handles nulls internally and ClickHouse
//! rejects `Nullable` around composites.

use crate::config::ProviderConfig;
use crate::error::ClickguardError;
use crate::sql_helper::SqlHelper;
use crate::types::app_type::{AppType, EnumDef, RecordDef};
use crate::types::value::Value;

/// Decimal storage selection for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalSpec {
    /// `Decimal(P, S)`
    Precision { precision: u8, scale: u8 },
    /// `Decimal32(S)`
    Decimal32(u8),
    /// `Decimal64(S)`
    Decimal64(u8),
    /// `Decimal128(S)`
    Decimal128(u8),
    /// `Decimal256(S)`
    Decimal256(u8),
}

/// Parameters of the `JSON` column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonTypeParams {
    pub max_dynamic_paths: Option<u32>,
    pub max_dynamic_types: Option<u32>,
}

/// Per-column mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeConfig {
    pub decimal: Option<DecimalSpec>,
    pub datetime_precision: Option<u8>,
    pub timezone: Option<String>,
    pub fixed_string_length: Option<u32>,
    pub low_cardinality: bool,
    /// Store nulls as this default instead of wrapping in `Nullable`.
    pub default_for_null: Option<String>,
    /// Store `BigInteger` as `UInt256` instead of `Int256`.
    pub unsigned_big_integer: bool,
    pub json: JsonTypeParams,
}

impl TypeConfig {
    pub fn low_cardinality(mut self) -> Self {
        self.low_cardinality = true;
        self
    }

    pub fn decimal(mut self, spec: DecimalSpec) -> Self {
        self.decimal = Some(spec);
        self
    }

    pub fn datetime(mut self, precision: u8, timezone: Option<&str>) -> Self {
        self.datetime_precision = Some(precision);
        self.timezone = timezone.map(str::to_string);
        self
    }

    pub fn fixed_string(mut self, length: u32) -> Self {
        self.fixed_string_length = Some(length);
        self
    }

    pub fn default_for_null(mut self, value: impl Into<String>) -> Self {
        self.default_for_null = Some(value.into());
        self
    }

    pub fn unsigned_big_integer(mut self) -> Self {
        self.unsigned_big_integer = true;
        self
    }

    pub fn json(mut self, max_dynamic_paths: Option<u32>, max_dynamic_types: Option<u32>) -> Self {
        self.json = JsonTypeParams {
            max_dynamic_paths,
            max_dynamic_types,
        };
        self
    }

    /// Configuration inherited by element types of a composite column.
    fn element_config(&self) -> TypeConfig {
        TypeConfig {
            low_cardinality: false,
            default_for_null: None,
            ..self.clone()
        }
    }
}

/// A resolved ClickHouse column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnTypeDescriptor {
    pub app_type: AppType,
    /// Base type name, e.g. `Decimal`, `DateTime64`, `Array`.
    pub base_name: String,
    /// Rendered type arguments.
    pub parameters: Vec<String>,
    pub wrap_nullable: bool,
    pub low_cardinality: bool,
}

impl ColumnTypeDescriptor {
    /// The base type with its arguments, without wrappers.
    pub fn base(&self) -> String {
        if self.parameters.is_empty() {
            self.base_name.clone()
        } else {
            format!("{}({})", self.base_name, self.parameters.join(", "))
        }
    }

    pub fn render(&self) -> String {
        let mut rendered = self.base();
        if self.wrap_nullable {
            rendered = format!("Nullable({rendered})");
        }
        if self.low_cardinality {
            rendered = format!("LowCardinality({rendered})");
        }
        rendered
    }
}

/// Resolves column types using provider-wide defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapper {
    pub default_decimal_precision: u8,
    pub default_decimal_scale: u8,
    pub default_datetime_precision: u8,
    pub default_timezone: Option<String>,
    helper: SqlHelper,
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default())
    }
}

/// Resolve a column type with the default provider configuration.
///
/// ```
/// use clickguard::types::{resolve_column_type, AppType, TypeConfig};
///
/// let ty = resolve_column_type(&AppType::array(AppType::String), &TypeConfig::default()).unwrap();
/// assert_eq!(ty, "Array(String)");
/// ```
pub fn resolve_column_type(app_type: &AppType, config: &TypeConfig) -> Result<String, ClickguardError> {
    TypeMapper::default().resolve(app_type, config)
}

impl TypeMapper {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            default_decimal_precision: config.default_decimal_precision,
            default_decimal_scale: config.default_decimal_scale,
            default_datetime_precision: config.default_datetime_precision,
            default_timezone: config.default_timezone.clone(),
            helper: config.sql_helper(),
        }
    }

    pub fn resolve(&self, app_type: &AppType, config: &TypeConfig) -> Result<String, ClickguardError> {
        Ok(self.describe(app_type, config)?.render())
    }

    /// Build the descriptor for one column.
    pub fn describe(&self, app_type: &AppType, config: &TypeConfig) -> Result<ColumnTypeDescriptor, ClickguardError> {
        let (inner, nullable) = match app_type {
            AppType::Nullable(inner) => (inner.as_ref(), true),
            other => (other, false),
        };
        if inner.is_nullable() {
            return Err(ClickguardError::mapping(
                app_type.to_string(),
                "Nullable cannot be nested inside Nullable",
            ));
        }

        let (base_name, parameters) = self.base(inner, config)?;
        let wrap_nullable = nullable && supports_nullable(inner) && config.default_for_null.is_none();

        if config.low_cardinality && !supports_low_cardinality(inner) {
            return Err(ClickguardError::mapping(
                app_type.to_string(),
                "LowCardinality applies only to string, numeric and date columns",
            ));
        }

        Ok(ColumnTypeDescriptor {
            app_type: app_type.clone(),
            base_name,
            parameters,
            wrap_nullable,
            low_cardinality: config.low_cardinality,
        })
    }

    fn element(&self, app_type: &AppType, config: &TypeConfig) -> Result<String, ClickguardError> {
        self.resolve(app_type, &config.element_config())
    }

    fn base(&self, app_type: &AppType, config: &TypeConfig) -> Result<(String, Vec<String>), ClickguardError> {
        let simple = |name: &str| -> Result<(String, Vec<String>), ClickguardError> {
            Ok((name.to_string(), Vec::new()))
        };
        match app_type {
            AppType::Bool => simple("Bool"),
            AppType::Int8 => simple("Int8"),
            AppType::Int16 => simple("Int16"),
            AppType::Int32 => simple("Int32"),
            AppType::Int64 => simple("Int64"),
            AppType::Int128 => simple("Int128"),
            AppType::UInt8 => simple("UInt8"),
            AppType::UInt16 => simple("UInt16"),
            AppType::UInt32 => simple("UInt32"),
            AppType::UInt64 => simple("UInt64"),
            AppType::UInt128 => simple("UInt128"),
            AppType::BigInteger => {
                if config.unsigned_big_integer {
                    simple("UInt256")
                } else {
                    simple("Int256")
                }
            }
            AppType::Float32 => simple("Float32"),
            AppType::Float64 => simple("Float64"),
            AppType::Decimal => self.decimal(config),
            AppType::String => match config.fixed_string_length {
                Some(0) => Err(ClickguardError::mapping("FixedString", "length must be at least 1 byte")),
                Some(n) => Ok(("FixedString".to_string(), vec![n.to_string()])),
                None => simple("String"),
            },
            AppType::Bytes => simple("String"),
            AppType::Date => simple("Date"),
            AppType::DateTime => self.datetime(config, self.default_timezone.as_deref()),
            AppType::DateTimeOffset => self.datetime(config, Some(self.default_timezone.as_deref().unwrap_or("UTC"))),
            AppType::Uuid => simple("UUID"),
            AppType::IpV4 => simple("IPv4"),
            AppType::IpV6 => simple("IPv6"),
            AppType::Json => {
                let mut params = Vec::new();
                if let Some(paths) = config.json.max_dynamic_paths {
                    params.push(format!("max_dynamic_paths={paths}"));
                }
                if let Some(types) = config.json.max_dynamic_types {
                    params.push(format!("max_dynamic_types={types}"));
                }
                Ok(("JSON".to_string(), params))
            }
            AppType::Enum(def) => self.enumeration(def),
            AppType::Array(element) => Ok(("Array".to_string(), vec![self.element(element, config)?])),
            AppType::Map(key, value) => {
                if key.is_nullable() {
                    return Err(ClickguardError::mapping(app_type.to_string(), "map keys must not be nullable"));
                }
                Ok((
                    "Map".to_string(),
                    vec![self.element(key, config)?, self.element(value, config)?],
                ))
            }
            AppType::Tuple(items) => {
                let flat = flatten_tuple(items);
                if flat.is_empty() {
                    return Err(ClickguardError::mapping(app_type.to_string(), "tuples need at least one element"));
                }
                let params = flat
                    .into_iter()
                    .map(|t| self.element(t, config))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(("Tuple".to_string(), params))
            }
            AppType::Nested(record) => self.nested(record, config),
            AppType::Nullable(_) => Err(ClickguardError::mapping(
                app_type.to_string(),
                "Nullable cannot be nested inside Nullable",
            )),
            AppType::Other(name) => Err(ClickguardError::mapping(
                name.clone(),
                "no ClickHouse type mapping is configured for this type",
            )),
        }
    }

    fn decimal(&self, config: &TypeConfig) -> Result<(String, Vec<String>), ClickguardError> {
        let fixed = |name: &str, scale: u8, max: u8| {
            if scale > max {
                Err(ClickguardError::mapping(name, format!("scale {scale} exceeds maximum {max}")))
            } else {
                Ok((name.to_string(), vec![scale.to_string()]))
            }
        };
        match config.decimal {
            None => self.decimal_precision(self.default_decimal_precision, self.default_decimal_scale),
            Some(DecimalSpec::Precision { precision, scale }) => self.decimal_precision(precision, scale),
            Some(DecimalSpec::Decimal32(scale)) => fixed("Decimal32", scale, 9),
            Some(DecimalSpec::Decimal64(scale)) => fixed("Decimal64", scale, 18),
            Some(DecimalSpec::Decimal128(scale)) => fixed("Decimal128", scale, 38),
            Some(DecimalSpec::Decimal256(scale)) => fixed("Decimal256", scale, 76),
        }
    }

    fn decimal_precision(&self, precision: u8, scale: u8) -> Result<(String, Vec<String>), ClickguardError> {
        if precision == 0 || precision > 76 {
            return Err(ClickguardError::mapping("Decimal", format!("precision {precision} is outside 1..=76")));
        }
        if scale > precision {
            return Err(ClickguardError::mapping("Decimal", format!("scale {scale} exceeds precision {precision}")));
        }
        Ok(("Decimal".to_string(), vec![precision.to_string(), scale.to_string()]))
    }

    fn datetime(&self, config: &TypeConfig, fallback_tz: Option<&str>) -> Result<(String, Vec<String>), ClickguardError> {
        let precision = config.datetime_precision.unwrap_or(self.default_datetime_precision);
        if precision > 9 {
            return Err(ClickguardError::mapping("DateTime64", format!("precision {precision} is outside 0..=9")));
        }
        let mut params = vec![precision.to_string()];
        if let Some(tz) = config.timezone.as_deref().or(fallback_tz) {
            params.push(self.helper.string_literal(tz));
        }
        Ok(("DateTime64".to_string(), params))
    }

    fn enumeration(&self, def: &EnumDef) -> Result<(String, Vec<String>), ClickguardError> {
        if def.members.is_empty() {
            return Err(ClickguardError::mapping(def.name.clone(), "enums need at least one member"));
        }
        let width = def.width().ok_or_else(|| {
            ClickguardError::mapping(
                def.name.clone(),
                "enum values must fit 16 bits with at most 65536 members",
            )
        })?;
        let members = def
            .members
            .iter()
            .map(|m| format!("{} = {}", self.helper.string_literal(&m.name), m.value))
            .collect();
        Ok((width.type_name().to_string(), members))
    }

    fn nested(&self, record: &RecordDef, config: &TypeConfig) -> Result<(String, Vec<String>), ClickguardError> {
        if record.fields.is_empty() {
            return Err(ClickguardError::mapping(
                record.name.clone(),
                "Nested records need at least one readable field",
            ));
        }
        let fields = record
            .fields
            .iter()
            .map(|(name, ty)| Ok(format!("{} {}", name, self.element(ty, config)?)))
            .collect::<Result<Vec<_>, ClickguardError>>()?;
        Ok(("Nested".to_string(), fields))
    }

    /// Check a value against a column's type before it is bound or inlined.
    pub fn validate_value(&self, app_type: &AppType, config: &TypeConfig, value: &Value) -> Result<(), ClickguardError> {
        if value.is_null() {
            if app_type.is_nullable() || app_type.is_json() || config.default_for_null.is_some() {
                return Ok(());
            }
            return Err(ClickguardError::mapping(app_type.to_string(), "NULL for a non-nullable column"));
        }

        match (app_type.underlying(), value) {
            (AppType::BigInteger, v) if config.unsigned_big_integer && v.is_negative() => Err(
                ClickguardError::mapping("UInt256", format!("negative value {} for an unsigned 256-bit column", v)),
            ),
            (t, v) if t.is_unsigned() && v.is_negative() => Err(ClickguardError::mapping(
                app_type.to_string(),
                format!("negative value {} for an unsigned column", v),
            )),
            (AppType::Enum(def), Value::String(name)) if !def.contains(name) => Err(ClickguardError::mapping(
                def.name.clone(),
                format!("'{name}' is not a member"),
            )),
            _ => Ok(()),
        }
    }
}

fn supports_nullable(app_type: &AppType) -> bool {
    !matches!(
        app_type,
        AppType::Json | AppType::Array(_) | AppType::Map(_, _) | AppType::Tuple(_) | AppType::Nested(_)
    )
}

fn supports_low_cardinality(app_type: &AppType) -> bool {
    app_type.is_string()
        || (app_type.is_numeric() && !matches!(app_type, AppType::Decimal | AppType::BigInteger))
        || matches!(app_type, AppType::Date | AppType::DateTime | AppType::DateTimeOffset | AppType::Bytes)
}

/// Flatten the overflow nesting used by 8+ element tuples: an eight element tuple whose
/// last element is itself a tuple continues in that tuple.
fn flatten_tuple(items: &[AppType]) -> Vec<&AppType> {
    match items {
        [head @ .., AppType::Tuple(rest)] if items.len() == 8 => {
            let mut flat: Vec<&AppType> = head.iter().collect();
            flat.extend(flatten_tuple(rest));
            flat
        }
        _ => items.iter().collect(),
    }
}
