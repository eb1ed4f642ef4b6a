use async_trait::async_trait;

use crate::bulk::InsertStatement;

pub mod postgres;
pub mod sql_value;
pub mod sqlite;

use postgres::client::PostgresError;
use sqlite::client::SqliteError;

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("{0}")]
    Postgres(#[from] PostgresError),

    #[error("{0}")]
    Sqlite(#[from] SqliteError),

    #[error("{0}")]
    Other(String),
}

/// A database a bulk insert can flush into.
///
/// Implementations must be safe to share between many bulk inserts at once, pooling is their
/// concern.
#[async_trait]
pub trait BulkInsertDatabase: Send + Sync {
    /// Executes one multi-row insert and returns the number of rows the database reports.
    async fn execute_insert(&self, statement: &InsertStatement<'_>) -> Result<u64, DatabaseError>;
}
