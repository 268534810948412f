//! Type mapping table between application value types and ClickHouse type syntax.

pub mod app_type;
pub mod mapping;
pub mod parse;
pub mod value;

pub use app_type::{AppType, EnumDef, EnumMember, EnumWidth, RecordDef};
pub use mapping::{resolve_column_type, ColumnTypeDescriptor, DecimalSpec, JsonTypeParams, TypeConfig, TypeMapper};
pub use parse::parse_store_type;
pub use value::Value;
