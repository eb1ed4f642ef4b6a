use std::{env, time::Duration};

use async_trait::async_trait;
use bb8::{Pool, RunError};
use bb8_postgres::PostgresConnectionManager;
use dotenv::dotenv;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::{task, time::timeout};
pub use tokio_postgres::types::ToSql;
use tokio_postgres::{config::SslMode, Config, Error as PgError, ToStatement};
use tracing::{debug, error};

use crate::{
    bulk::InsertStatement,
    database::{BulkInsertDatabase, DatabaseError},
};

pub fn connection_string() -> Result<String, env::VarError> {
    dotenv().ok();
    let connection = env::var("DATABASE_URL")?;
    Ok(connection)
}

#[derive(thiserror::Error, Debug)]
pub enum PostgresConnectionError {
    #[error("The database connection string is wrong please check your environment: {0}")]
    DatabaseConnectionConfigWrong(#[from] env::VarError),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] tokio_postgres::Error),

    #[error("Can not connect to the database please make sure your connection string is correct")]
    CanNotConnectToDatabase,

    #[error("Could not parse connection string make sure it is correctly formatted")]
    CouldNotParseConnectionString,

    #[error("Could not create tls connector")]
    CouldNotCreateTlsConnector,
}

#[derive(thiserror::Error, Debug)]
pub enum PostgresError {
    #[error("PgError {0}")]
    PgError(#[from] PgError),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] RunError<tokio_postgres::Error>),
}

/// Pooled PostgreSQL connection used as a bulk insert target.
pub struct PostgresClient {
    pool: Pool<PostgresConnectionManager<MakeTlsConnector>>,
}

impl PostgresClient {
    /// Connects to `DATABASE_URL`, falling back to a plain connection when TLS fails and the
    /// connection string does not require it.
    pub async fn new() -> Result<Self, PostgresConnectionError> {
        let connection_str = connection_string()?;
        Self::connect(&connection_str).await
    }

    pub async fn connect(connection_str: &str) -> Result<Self, PostgresConnectionError> {
        async fn _connect(
            connection_str: &str,
            disable_ssl: bool,
        ) -> Result<PostgresClient, PostgresConnectionError> {
            let mut config: Config = connection_str
                .parse()
                .map_err(|_| PostgresConnectionError::CouldNotParseConnectionString)?;

            if disable_ssl {
                config.ssl_mode(SslMode::Disable);
            }

            let connector = TlsConnector::builder()
                .build()
                .map_err(|_| PostgresConnectionError::CouldNotCreateTlsConnector)?;
            let tls_connector = MakeTlsConnector::new(connector);

            let (client, connection) =
                match timeout(Duration::from_millis(5000), config.connect(tls_connector.clone()))
                    .await
                {
                    Ok(Ok((client, connection))) => (client, connection),
                    Ok(Err(e)) => {
                        // retry without ssl if ssl has been attempted and failed
                        if !disable_ssl &&
                            config.get_ssl_mode() != SslMode::Disable &&
                            !connection_str.contains("sslmode=require")
                        {
                            debug!("TLS connection failed, retrying without TLS: {}", e);
                            return Box::pin(_connect(connection_str, true)).await;
                        }
                        error!("Error connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                    Err(e) => {
                        error!("Timeout connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                };

            let connection_handle = task::spawn(connection);

            if client.query_one("SELECT 1", &[]).await.is_err() {
                return Err(PostgresConnectionError::CanNotConnectToDatabase);
            }

            drop(client);
            match connection_handle.await {
                Ok(Ok(())) => (),
                Ok(Err(_)) => return Err(PostgresConnectionError::CanNotConnectToDatabase),
                Err(_) => return Err(PostgresConnectionError::CanNotConnectToDatabase),
            }

            let manager = PostgresConnectionManager::new(config, tls_connector);

            let pool = Pool::builder().build(manager).await?;

            Ok(PostgresClient { pool })
        }

        _connect(connection_str, false).await
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), PostgresError> {
        let conn = self.pool.get().await?;
        conn.batch_execute(sql).await.map_err(PostgresError::PgError)
    }

    pub async fn execute<T>(
        &self,
        query: &T,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, PostgresError>
    where
        T: ?Sized + ToStatement,
    {
        let conn = self.pool.get().await?;
        conn.execute(query, params).await.map_err(PostgresError::PgError)
    }
}

fn bind_params<'a>(statement: &InsertStatement<'a>) -> Vec<&'a (dyn ToSql + Sync)> {
    statement.params().map(|param| param as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl BulkInsertDatabase for PostgresClient {
    async fn execute_insert(&self, statement: &InsertStatement<'_>) -> Result<u64, DatabaseError> {
        let params = bind_params(statement);

        Ok(self.execute(statement.sql(), &params).await?)
    }
}
