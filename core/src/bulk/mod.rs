//! Buffered multi-row inserts sized to the database's bound parameter limit.

mod config;
mod context;
mod error;
mod insert;
mod query_builder;

pub use config::{BulkInsertConfig, FailedBatchPolicy, MAX_BOUND_PARAMS};
pub use context::{ContextError, ExecutionContext};
pub use error::{
    BulkInsertError, BulkInsertErrors, BulkInsertSetupError, ExecutionError, FailedBatch,
    StatementBuildError,
};
pub use insert::{row_limit_for, BulkInsert, FinishSummary};
pub use query_builder::{build_insert_statement, InsertStatement};
