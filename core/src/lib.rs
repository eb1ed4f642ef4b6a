mod bulk;
pub use bulk::{
    build_insert_statement, row_limit_for, BulkInsert, BulkInsertConfig, BulkInsertError,
    BulkInsertErrors, BulkInsertSetupError, ContextError, ExecutionContext, ExecutionError,
    FailedBatch, FailedBatchPolicy, FinishSummary, InsertStatement, StatementBuildError,
    MAX_BOUND_PARAMS,
};

mod database;
pub use database::{
    postgres::client::{
        connection_string as postgres_connection_string, PostgresClient, PostgresConnectionError,
        PostgresError, ToSql,
    },
    sql_value::SqlValue,
    sqlite::client::{
        connection_string as sqlite_connection_string, SqliteClient, SqliteConnectionError,
        SqliteError,
    },
    BulkInsertDatabase, DatabaseError,
};

mod logger;
pub use logger::{setup_info_logger, setup_logger, setup_scoped_logger};

// export 3rd party dependencies
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
pub use tracing::level_filters::LevelFilter;
