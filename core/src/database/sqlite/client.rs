use std::{env, path::PathBuf};

use async_trait::async_trait;
use dotenv::dotenv;
use rusqlite::{params_from_iter, Connection};
use tracing::{error, info};

use crate::{
    bulk::InsertStatement,
    database::{BulkInsertDatabase, DatabaseError},
    SqlValue,
};

pub fn connection_string() -> Result<String, env::VarError> {
    dotenv().ok();
    // Default to ./sqlbulk.db if DATABASE_URL is not set
    let connection = env::var("DATABASE_URL").unwrap_or_else(|_| "./sqlbulk.db".to_string());
    Ok(connection)
}

#[derive(thiserror::Error, Debug)]
pub enum SqliteConnectionError {
    #[error("The database connection string is wrong please check your environment: {0}")]
    DatabaseConnectionConfigWrong(#[from] env::VarError),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] SqliteError),

    #[error("Can not connect to the database please make sure your connection string is correct")]
    CanNotConnectToDatabase,
}

#[derive(thiserror::Error, Debug)]
pub enum SqliteError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("SQLite blocking task failed: {0}")]
    TaskJoinError(#[from] tokio::task::JoinError),
}

/// SQLite database file used as a bulk insert target.
///
/// Each statement opens its own connection on tokio's blocking pool.
pub struct SqliteClient {
    db_path: String,
}

impl SqliteClient {
    pub async fn new() -> Result<Self, SqliteConnectionError> {
        let connection_str = connection_string()?;
        Self::open(&connection_str).await
    }

    /// Opens (creating if needed) the database at `db_path` and switches it to WAL mode.
    pub async fn open(db_path: &str) -> Result<Self, SqliteConnectionError> {
        info!("Connecting to SQLite database at: {}", db_path);

        let db_path_clone = db_path.to_string();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = PathBuf::from(&db_path_clone).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        error!("Failed to create parent directories for SQLite database: {}", e);
                        SqliteConnectionError::CanNotConnectToDatabase
                    })?;
                }
            }

            let conn = Connection::open(&db_path_clone).map_err(|e| {
                error!("Error connecting to SQLite database: {}", e);
                SqliteConnectionError::CanNotConnectToDatabase
            })?;

            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;").map_err(
                |e| {
                    error!("Error setting SQLite pragmas: {}", e);
                    SqliteConnectionError::CanNotConnectToDatabase
                },
            )?;

            info!("Successfully connected to SQLite database");
            Ok::<(), SqliteConnectionError>(())
        })
        .await
        .map_err(|_| SqliteConnectionError::CanNotConnectToDatabase)??;

        Ok(SqliteClient { db_path: db_path.to_string() })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), SqliteError> {
        let db_path = self.db_path.clone();
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(&sql)?;
            Ok::<(), rusqlite::Error>(())
        })
        .await??;

        Ok(())
    }

    pub async fn execute(&self, query: &str, params: Vec<SqlValue>) -> Result<usize, SqliteError> {
        let db_path = self.db_path.clone();
        let query = query.to_string();

        let affected = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute(&query, params_from_iter(params.iter()))
        })
        .await??;

        Ok(affected)
    }
}

#[async_trait]
impl BulkInsertDatabase for SqliteClient {
    async fn execute_insert(&self, statement: &InsertStatement<'_>) -> Result<u64, DatabaseError> {
        // the blocking pool needs owned values
        let params: Vec<SqlValue> = statement.params().cloned().collect();

        let affected = self.execute(statement.sql(), params).await?;
        Ok(affected as u64)
    }
}
