//! Transactions.
//!
//! ClickHouse guarantees atomicity per inserted block only. The API surface of a
//! transactional provider is kept so callers fail at the call site with a clear
//! workaround instead of silently running statements one by one.

use crate::error::{ClickguardError, UnsupportedCategory};
use crate::executor::SqlExecutor;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
}

impl IsolationLevel {
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
            IsolationLevel::Snapshot => "SNAPSHOT",
        }
    }
}

/// Begin a transaction on `executor`. Always fails with category `Transaction`.
pub fn begin(executor: &dyn SqlExecutor) -> Result<(), ClickguardError> {
    executor.begin_transaction(None)
}

/// Begin a transaction with an explicit isolation level. Always fails.
pub fn begin_with_isolation(executor: &dyn SqlExecutor, level: IsolationLevel) -> Result<(), ClickguardError> {
    executor.begin_transaction(Some(level))
}

/// Savepoints need an open transaction, so they are refused the same way.
pub fn savepoint(name: &str) -> Result<(), ClickguardError> {
    Err(ClickguardError::unsupported(UnsupportedCategory::Transaction)
        .object(format!("SAVEPOINT {name}"))
        .into())
}
