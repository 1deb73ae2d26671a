//! Database executor port for user on-chain tables.
//!
//! The row cache and indexing store speak to the database through this
//! narrow capability: run one statement, run a batch in a transaction.
//! Statements are built by the caller; parameters travel as domain
//! [`Value`]s and are bound by the adapter.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::row::Value;

/// A parameterized SQL statement.
///
/// Placeholders use Postgres syntax (`$1`, `$2`, ...); parameters are in
/// storage form (see [`crate::types::row::ColumnKind::encode`]).
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// Statement text.
    pub sql: String,
    /// Bind parameters in placeholder order.
    pub params: Vec<Value>,
}

impl SqlStatement {
    /// A statement with no parameters.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A parameterized statement.
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Port for executing statements against the user-table database.
#[async_trait]
pub trait DbExecutor: Send + Sync {
    /// Run a statement and return its rows as arrays of column values, in
    /// select-list order.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    async fn query(&self, stmt: SqlStatement) -> Result<Vec<Vec<Value>>>;

    /// Run a statement and return the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    async fn execute(&self, stmt: SqlStatement) -> Result<u64>;

    /// Run a batch of statements inside a single transaction.
    ///
    /// Used by the row-cache flush; either every statement commits or none
    /// do.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; the transaction is rolled
    /// back.
    async fn execute_batch(&self, stmts: Vec<SqlStatement>) -> Result<()>;
}
