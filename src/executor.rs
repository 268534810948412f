//! SQL execution contract.
//!
//! The core never talks to a server itself. Callers that need to run generated SQL (the
//! migration history repository, for instance) go through [`SqlExecutor`], implemented
//! by whatever ClickHouse client the host application uses.

use crate::error::{ClickguardError, UnsupportedCategory};
use crate::transaction::IsolationLevel;

/// Trait for executing generated SQL against a ClickHouse server.
///
/// # Examples
///
/// ```
/// use clickguard::executor::SqlExecutor;
/// use clickguard::ClickguardError;
///
/// struct Recorder(std::cell::RefCell<Vec<String>>);
///
/// impl SqlExecutor for Recorder {
///     fn execute(&self, sql: &str) -> Result<u64, ClickguardError> {
///         self.0.borrow_mut().push(sql.to_string());
///         Ok(0)
///     }
///
///     fn query_rows(&self, _sql: &str) -> Result<Vec<Vec<String>>, ClickguardError> {
///         Ok(Vec::new())
///     }
/// }
///
/// let recorder = Recorder(Default::default());
/// recorder.execute("SELECT 1;").unwrap();
/// assert_eq!(recorder.0.borrow().len(), 1);
/// ```
pub trait SqlExecutor {
    /// Execute a statement and return the number of rows written, or `0`.
    ///
    /// # Errors
    ///
    /// Returns [`ClickguardError::Execution`] when the server rejects the statement.
    fn execute(&self, sql: &str) -> Result<u64, ClickguardError>;

    /// Run a query and return every row, each column rendered as text.
    fn query_rows(&self, sql: &str) -> Result<Vec<Vec<String>>, ClickguardError>;

    /// ClickHouse has no multi-statement transactions; every implementation refuses.
    fn begin_transaction(&self, isolation: Option<IsolationLevel>) -> Result<(), ClickguardError> {
        let mut error = ClickguardError::unsupported(UnsupportedCategory::Transaction).object("BEGIN TRANSACTION");
        if let Some(level) = isolation {
            error = error.object(format!("BEGIN TRANSACTION ISOLATION LEVEL {}", level.to_sql()));
        }
        Err(error.into())
    }
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for &T {
    fn execute(&self, sql: &str) -> Result<u64, ClickguardError> {
        (**self).execute(sql)
    }

    fn query_rows(&self, sql: &str) -> Result<Vec<Vec<String>>, ClickguardError> {
        (**self).query_rows(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullExecutor;

    impl SqlExecutor for NullExecutor {
        fn execute(&self, _sql: &str) -> Result<u64, ClickguardError> {
            Ok(0)
        }

        fn query_rows(&self, _sql: &str) -> Result<Vec<Vec<String>>, ClickguardError> {
            Ok(vec![vec!["1".to_string()]])
        }
    }

    #[test]
    fn test_begin_transaction_always_refused() {
        let executor = NullExecutor;
        let err = executor.begin_transaction(None).unwrap_err();
        assert_eq!(err.unsupported_category(), Some(UnsupportedCategory::Transaction));

        let err = executor
            .begin_transaction(Some(IsolationLevel::Serializable))
            .unwrap_err();
        assert!(err.to_string().contains("SERIALIZABLE"));
    }

    #[test]
    fn test_reference_forwards() {
        let executor = NullExecutor;
        let by_ref: &dyn SqlExecutor = &executor;
        assert_eq!((&by_ref).query_rows("SELECT 1").unwrap().len(), 1);
    }
}
