//! Expression-to-SQL translation.
//!
//! The host query layer hands over an [`Expr`] tree; [`ExpressionTranslator`] lowers it to
//! ClickHouse SQL through a small [`SqlExpr`] AST, and [`SelectQuery`] assembles a full
//! statement including the `FINAL`, `SAMPLE` and `SETTINGS` modifiers.

pub mod expr;
pub mod method;
pub mod select;
pub mod sql;
pub mod translator;

pub use expr::{parse_json_path, BinaryOp, Expr, JsonSegment, UnaryOp};
pub use method::{DatePart, DateUnit, Member, Method, Receiver};
pub use select::{Order, SelectQuery};
pub use sql::SqlExpr;
pub use translator::{fold_constant, shift_index, ExpressionTranslator, QueryParameter, TranslatedQuery};
