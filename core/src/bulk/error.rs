use crate::{bulk::context::ContextError, database::DatabaseError, SqlValue};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BulkInsertSetupError {
    #[error("A bulk insert needs at least one column")]
    NoColumns,

    #[error(
        "A row of {columns} columns does not fit in a statement of at most {max_bound_params} bound parameters"
    )]
    TooManyColumns { columns: usize, max_bound_params: usize },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StatementBuildError {
    #[error("Can not build an insert statement without rows")]
    EmptyBatch,

    #[error("Row {index} has no values")]
    EmptyRow { index: usize },

    #[error("Invalid identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: &'static str },

    #[error("Statement needs {count} bound parameters but at most {max} are allowed")]
    TooManyParameters { count: usize, max: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("{0}")]
    Database(#[from] DatabaseError),

    #[error("Execution was cancelled")]
    Cancelled,

    #[error("Execution deadline exceeded")]
    DeadlineExceeded,
}

impl From<ContextError> for ExecutionError {
    fn from(error: ContextError) -> Self {
        match error {
            ContextError::Cancelled => ExecutionError::Cancelled,
            ContextError::DeadlineExceeded => ExecutionError::DeadlineExceeded,
        }
    }
}

impl ExecutionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::Cancelled)
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, ExecutionError::DeadlineExceeded)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BulkInsertError {
    #[error("Could not build insert statement for {table}: {source}")]
    StatementBuild {
        table: String,
        #[source]
        source: StatementBuildError,
    },

    #[error("Insert into {table} failed: {source}")]
    Execution {
        table: String,
        #[source]
        source: ExecutionError,
    },
}

impl BulkInsertError {
    pub fn table(&self) -> &str {
        match self {
            BulkInsertError::StatementBuild { table, .. } => table,
            BulkInsertError::Execution { table, .. } => table,
        }
    }
}

/// One flush that did not make it into the database.
#[derive(Debug)]
pub struct FailedBatch {
    pub error: BulkInsertError,
    /// The rows of the failed flush. Only populated under `FailedBatchPolicy::Retain`.
    pub rows: Vec<Vec<SqlValue>>,
}

/// Every failed flush of a bulk insert, reported together once it finishes.
#[derive(thiserror::Error, Debug)]
#[error("{} errors: [{}]", .failures.len(), join_errors(.failures))]
pub struct BulkInsertErrors {
    failures: Vec<FailedBatch>,
}

fn join_errors(failures: &[FailedBatch]) -> String {
    failures.iter().map(|failure| failure.error.to_string()).collect::<Vec<_>>().join("; ")
}

impl BulkInsertErrors {
    pub(crate) fn new(failures: Vec<FailedBatch>) -> Self {
        Self { failures }
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BulkInsertError> {
        self.failures.iter().map(|failure| &failure.error)
    }

    pub fn failures(&self) -> &[FailedBatch] {
        &self.failures
    }

    /// Number of rows handed back across all failed flushes.
    pub fn failed_row_count(&self) -> usize {
        self.failures.iter().map(|failure| failure.rows.len()).sum()
    }

    pub fn into_failed_rows(self) -> Vec<Vec<SqlValue>> {
        self.failures.into_iter().flat_map(|failure| failure.rows).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_failure(table: &str) -> FailedBatch {
        FailedBatch {
            error: BulkInsertError::StatementBuild {
                table: table.to_string(),
                source: StatementBuildError::EmptyRow { index: 0 },
            },
            rows: vec![vec![SqlValue::I64(1)]],
        }
    }

    #[test]
    fn test_aggregate_display() {
        let errors = BulkInsertErrors::new(vec![build_failure("a"), build_failure("b")]);

        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.to_string(),
            "2 errors: [Could not build insert statement for a: Row 0 has no values; \
             Could not build insert statement for b: Row 0 has no values]"
        );
    }

    #[test]
    fn test_failed_rows() {
        let errors = BulkInsertErrors::new(vec![build_failure("a"), build_failure("a")]);

        assert_eq!(errors.failed_row_count(), 2);
        assert_eq!(errors.iter().map(|e| e.table()).collect::<Vec<_>>(), vec!["a", "a"]);
        assert_eq!(errors.into_failed_rows(), vec![vec![SqlValue::I64(1)], vec![SqlValue::I64(1)]]);
    }

    #[test]
    fn test_execution_error_flavour() {
        let cancelled = ExecutionError::from(ContextError::Cancelled);
        let timed_out = ExecutionError::from(ContextError::DeadlineExceeded);

        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_deadline_exceeded());
        assert!(timed_out.is_deadline_exceeded());
        assert!(matches!(cancelled, ExecutionError::Cancelled));
        assert_eq!(timed_out.to_string(), "Execution deadline exceeded");
    }
}
