use std::mem;

use tracing::{debug, error, warn};

use crate::{
    bulk::{
        config::{BulkInsertConfig, FailedBatchPolicy},
        context::ExecutionContext,
        error::{
            BulkInsertError, BulkInsertErrors, BulkInsertSetupError, ExecutionError, FailedBatch,
        },
        query_builder::build_insert_statement,
    },
    database::BulkInsertDatabase,
    SqlValue,
};

/// Rows a flush may hold so that `columns * rows` stays under `max_bound_params`, keeping one
/// row of headroom.
///
/// Wide tables end up with a limit of 0, which flushes on every row.
pub fn row_limit_for(column_count: usize, max_bound_params: usize) -> usize {
    if column_count == 0 {
        return 0;
    }
    (max_bound_params / column_count).saturating_sub(1)
}

/// Returned by [`BulkInsert::finish`] when every flush succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishSummary {
    pub flushes: usize,
    pub rows_inserted: u64,
}

/// Inserts as many rows as possible per statement sent to the database.
///
/// Rows are buffered until the row limit is reached and then flushed inline as one multi-row
/// INSERT. Flush errors are collected and only reported by [`BulkInsert::finish`], the inserter
/// keeps accepting rows after a failed flush.
///
/// ```no_run
/// # async fn run(db: &sqlbulk::PostgresClient) -> Result<(), Box<dyn std::error::Error>> {
/// use sqlbulk::{row, BulkInsert, ExecutionContext};
///
/// let mut insert = BulkInsert::new(ExecutionContext::new(), db, "pairs", ["a", "b"])?;
/// for i in 0..500_i64 {
///     insert.values(row![i, i * 2]).await;
/// }
/// insert.finish().await?;
/// # Ok(())
/// # }
/// ```
pub struct BulkInsert<'a, D>
where
    D: BulkInsertDatabase + ?Sized,
{
    ctx: ExecutionContext,
    database: &'a D,
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    limit: usize,
    config: BulkInsertConfig,
    failures: Vec<FailedBatch>,
    flush_count: usize,
    rows_inserted: u64,
}

impl<'a, D> BulkInsert<'a, D>
where
    D: BulkInsertDatabase + ?Sized,
{
    pub fn new<T, C, S>(
        ctx: ExecutionContext,
        database: &'a D,
        table: T,
        columns: C,
    ) -> Result<Self, BulkInsertSetupError>
    where
        T: Into<String>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(ctx, database, table, columns, BulkInsertConfig::default())
    }

    pub fn with_config<T, C, S>(
        ctx: ExecutionContext,
        database: &'a D,
        table: T,
        columns: C,
        config: BulkInsertConfig,
    ) -> Result<Self, BulkInsertSetupError>
    where
        T: Into<String>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(BulkInsertSetupError::NoColumns);
        }
        if columns.len() > config.max_bound_params {
            return Err(BulkInsertSetupError::TooManyColumns {
                columns: columns.len(),
                max_bound_params: config.max_bound_params,
            });
        }

        let limit = row_limit_for(columns.len(), config.max_bound_params);

        Ok(Self {
            ctx,
            database,
            table: table.into(),
            columns,
            rows: Vec::new(),
            limit,
            config,
            failures: Vec::new(),
            flush_count: 0,
            rows_inserted: 0,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_limit(&self) -> usize {
        self.limit
    }

    pub fn pending_rows(&self) -> usize {
        self.rows.len()
    }

    /// Flush attempts so far, failed ones included.
    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    pub fn rows_inserted(&self) -> u64 {
        self.rows_inserted
    }

    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    /// Adds a set of values, flushing before returning once the row limit is reached.
    ///
    /// The values must line up with the column list; a mismatch is only detected when the
    /// database rejects the statement.
    pub async fn values(&mut self, row: Vec<SqlValue>) {
        self.rows.push(row);

        if self.rows.len() >= self.limit {
            self.flush().await;
        }
    }

    /// Flushes the remaining rows and reports every flush error collected along the way.
    pub async fn finish(mut self) -> Result<FinishSummary, BulkInsertErrors> {
        if !self.rows.is_empty() {
            self.flush().await;
        }

        let failures = mem::take(&mut self.failures);
        if failures.is_empty() {
            return Ok(FinishSummary {
                flushes: self.flush_count,
                rows_inserted: self.rows_inserted,
            });
        }

        Err(BulkInsertErrors::new(failures))
    }

    async fn flush(&mut self) {
        // the buffer is emptied whatever the outcome
        let rows = mem::take(&mut self.rows);
        self.flush_count += 1;

        match self.execute(&rows).await {
            Ok(affected) => {
                debug!("{} - Inserted {} rows ({} reported)", self.table, rows.len(), affected);
                self.rows_inserted += rows.len() as u64;
            }
            Err(error) => {
                error!("{} - Failed to insert batch of {} rows: {}", self.table, rows.len(), error);
                let rows = match self.config.failed_batch_policy {
                    FailedBatchPolicy::Retain => rows,
                    FailedBatchPolicy::Discard => Vec::new(),
                };
                self.failures.push(FailedBatch { error, rows });
            }
        }
    }

    async fn execute(&self, rows: &[Vec<SqlValue>]) -> Result<u64, BulkInsertError> {
        let statement =
            build_insert_statement(&self.table, &self.columns, rows, self.config.max_bound_params)
                .map_err(|source| BulkInsertError::StatementBuild {
                    table: self.table.clone(),
                    source,
                })?;

        debug!(
            "{} - Executing insert of {} rows with {} parameters",
            self.table,
            statement.row_count(),
            statement.param_count()
        );

        let result = match self.ctx.run(self.database.execute_insert(&statement)).await {
            Ok(Ok(affected)) => Ok(affected),
            Ok(Err(e)) => Err(ExecutionError::Database(e)),
            Err(e) => Err(ExecutionError::from(e)),
        };

        result.map_err(|source| BulkInsertError::Execution { table: self.table.clone(), source })
    }
}

impl<D> Drop for BulkInsert<'_, D>
where
    D: BulkInsertDatabase + ?Sized,
{
    fn drop(&mut self) {
        if !self.rows.is_empty() {
            warn!(
                "{} - Bulk insert dropped without finish, {} pending rows were not inserted",
                self.table,
                self.rows.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Mutex, time::Duration};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        bulk::{error::StatementBuildError, InsertStatement},
        database::DatabaseError,
        row,
    };

    struct RecordedInsert {
        sql: String,
        rows: Vec<Vec<SqlValue>>,
    }

    /// Records every statement it is asked to run and fails the calls listed in `failing_calls`.
    #[derive(Default)]
    struct RecordingDatabase {
        executions: Mutex<Vec<RecordedInsert>>,
        failing_calls: HashSet<usize>,
        fail_all: bool,
        delay: Option<Duration>,
    }

    impl RecordingDatabase {
        fn failing_on(calls: &[usize]) -> Self {
            Self { failing_calls: calls.iter().copied().collect(), ..Default::default() }
        }

        fn always_failing() -> Self {
            Self { fail_all: true, ..Default::default() }
        }

        fn slow(delay: Duration) -> Self {
            Self { delay: Some(delay), ..Default::default() }
        }

        fn execution_count(&self) -> usize {
            self.executions.lock().unwrap().len()
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.executions.lock().unwrap().iter().map(|e| e.rows.len()).collect()
        }
    }

    #[async_trait]
    impl BulkInsertDatabase for RecordingDatabase {
        async fn execute_insert(
            &self,
            statement: &InsertStatement<'_>,
        ) -> Result<u64, DatabaseError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let call = {
                let mut executions = self.executions.lock().unwrap();
                executions.push(RecordedInsert {
                    sql: statement.sql().to_string(),
                    rows: statement.rows().to_vec(),
                });
                executions.len() - 1
            };

            if self.fail_all || self.failing_calls.contains(&call) {
                return Err(DatabaseError::Other(format!("call {} rejected", call)));
            }

            Ok(statement.row_count() as u64)
        }
    }

    #[test]
    fn test_row_limit_for_every_column_count() {
        for columns in 1..=999 {
            assert_eq!(row_limit_for(columns, 999), 999 / columns - 1, "columns = {}", columns);
        }
        assert_eq!(row_limit_for(1, 999), 998);
        assert_eq!(row_limit_for(2, 999), 498);
        assert_eq!(row_limit_for(3, 999), 332);
        assert_eq!(row_limit_for(500, 999), 0);
        assert_eq!(row_limit_for(0, 999), 0);
    }

    #[test]
    fn test_new_rejects_empty_columns() {
        let db = RecordingDatabase::default();

        let result = BulkInsert::new(ExecutionContext::new(), &db, "t", Vec::<String>::new());

        assert_eq!(result.err(), Some(BulkInsertSetupError::NoColumns));
    }

    #[test]
    fn test_new_rejects_too_many_columns() {
        let db = RecordingDatabase::default();
        let columns: Vec<String> = (0..1000).map(|i| format!("c{}", i)).collect();

        let result = BulkInsert::new(ExecutionContext::new(), &db, "t", columns);

        assert_eq!(
            result.err(),
            Some(BulkInsertSetupError::TooManyColumns { columns: 1000, max_bound_params: 999 })
        );
    }

    #[test]
    fn test_new_uses_configured_limit() {
        let db = RecordingDatabase::default();
        let config = BulkInsertConfig { max_bound_params: 65535, ..Default::default() };

        let insert =
            BulkInsert::with_config(ExecutionContext::new(), &db, "t", ["a", "b", "c"], config)
                .unwrap();

        assert_eq!(insert.row_limit(), 21844);
        assert_eq!(insert.columns(), &["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(insert.table(), "t");
    }

    #[tokio::test]
    async fn test_unbounded_parameter_limit() {
        let db = RecordingDatabase::default();
        let config = BulkInsertConfig { max_bound_params: usize::MAX, ..Default::default() };

        let mut insert =
            BulkInsert::with_config(ExecutionContext::new(), &db, "t", ["a", "b"], config)
                .unwrap();
        assert_eq!(insert.row_limit(), usize::MAX / 2 - 1);

        insert.values(row![1_i64, 2_i64]).await;
        assert_eq!(insert.pending_rows(), 1);
        assert_eq!(db.execution_count(), 0);

        let summary = insert.finish().await.unwrap();
        assert_eq!(summary, FinishSummary { flushes: 1, rows_inserted: 1 });
    }

    #[tokio::test]
    async fn test_flushes_when_limit_reached() {
        let db = RecordingDatabase::default();
        let mut insert = BulkInsert::new(ExecutionContext::new(), &db, "pairs", ["a", "b"]).unwrap();
        let limit = insert.row_limit();

        for i in 0..(limit as i64 - 1) {
            insert.values(row![i, i]).await;
        }
        assert_eq!(db.execution_count(), 0);
        assert_eq!(insert.pending_rows(), limit - 1);

        insert.values(row![0_i64, 0_i64]).await;
        assert_eq!(db.execution_count(), 1);
        assert_eq!(insert.pending_rows(), 0);

        insert.values(row![1_i64, 1_i64]).await;
        assert_eq!(db.execution_count(), 1);
        assert_eq!(insert.pending_rows(), 1);

        let summary = insert.finish().await.unwrap();
        assert_eq!(summary, FinishSummary { flushes: 2, rows_inserted: limit as u64 + 1 });
    }

    #[tokio::test]
    async fn test_automatic_flush_count() {
        let db = RecordingDatabase::default();
        let mut insert = BulkInsert::new(ExecutionContext::new(), &db, "t", ["v"]).unwrap();
        let limit = insert.row_limit();

        for i in 0..(limit * 3 + 5) {
            insert.values(row![i as i64]).await;
        }
        assert_eq!(db.execution_count(), 3);
        assert_eq!(insert.flush_count(), 3);

        insert.finish().await.unwrap();
        assert_eq!(db.batch_sizes(), vec![limit, limit, limit, 5]);
    }

    #[tokio::test]
    async fn test_finish_after_exact_multiple_does_not_flush() {
        let db = RecordingDatabase::default();
        let mut insert = BulkInsert::new(ExecutionContext::new(), &db, "t", ["v"]).unwrap();
        let limit = insert.row_limit();

        for i in 0..(limit * 2) {
            insert.values(row![i as i64]).await;
        }
        assert_eq!(db.execution_count(), 2);

        let summary = insert.finish().await.unwrap();
        assert_eq!(db.execution_count(), 2);
        assert_eq!(summary.flushes, 2);
        assert_eq!(summary.rows_inserted, (limit * 2) as u64);
    }

    #[tokio::test]
    async fn test_finish_with_nothing_pending() {
        let db = RecordingDatabase::default();
        let insert = BulkInsert::new(ExecutionContext::new(), &db, "t", ["v"]).unwrap();

        let summary = insert.finish().await.unwrap();

        assert_eq!(summary, FinishSummary { flushes: 0, rows_inserted: 0 });
        assert_eq!(db.execution_count(), 0);
    }

    #[tokio::test]
    async fn test_two_columns_500_rows() {
        let db = RecordingDatabase::default();
        let mut insert = BulkInsert::new(ExecutionContext::new(), &db, "pairs", ["a", "b"]).unwrap();
        assert_eq!(insert.row_limit(), 498);

        for i in 0..500_i64 {
            insert.values(row![i, i * 2]).await;
        }

        assert!(insert.finish().await.is_ok());
        assert_eq!(db.batch_sizes(), vec![498, 2]);

        let executions = db.executions.lock().unwrap();
        assert_eq!(
            executions[1].sql,
            "INSERT INTO \"pairs\" (\"a\", \"b\") VALUES ($1,$2),($3,$4)"
        );
        assert_eq!(executions[1].rows, vec![row![498_i64, 996_i64], row![499_i64, 998_i64]]);
        assert_eq!(executions[0].rows[0], row![0_i64, 0_i64]);
        assert_eq!(executions[0].rows[497], row![497_i64, 994_i64]);
    }

    #[tokio::test]
    async fn test_single_column_single_row() {
        let db = RecordingDatabase::default();
        let mut insert = BulkInsert::new(ExecutionContext::new(), &db, "t", ["v"]).unwrap();
        assert_eq!(insert.row_limit(), 998);

        insert.values(row!["hello"]).await;
        assert_eq!(db.execution_count(), 0);

        insert.finish().await.unwrap();

        let executions = db.executions.lock().unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].sql, "INSERT INTO \"t\" (\"v\") VALUES ($1)");
        assert_eq!(executions[0].rows, vec![row!["hello"]]);
    }

    #[tokio::test]
    async fn test_wide_table_flushes_every_row() {
        let db = RecordingDatabase::default();
        let columns: Vec<String> = (0..600).map(|i| format!("c{}", i)).collect();
        let mut insert = BulkInsert::new(ExecutionContext::new(), &db, "wide", columns).unwrap();
        assert_eq!(insert.row_limit(), 0);

        for _ in 0..3 {
            insert.values(vec![SqlValue::Null; 600]).await;
            assert_eq!(insert.pending_rows(), 0);
        }

        insert.finish().await.unwrap();
        assert_eq!(db.batch_sizes(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_failed_flush_is_deferred_and_rows_dropped() {
        let db = RecordingDatabase::failing_on(&[0]);
        let mut insert = BulkInsert::new(ExecutionContext::new(), &db, "pairs", ["a", "b"]).unwrap();

        for i in 0..498_i64 {
            insert.values(row![i, i]).await;
        }
        assert_eq!(insert.pending_rows(), 0);
        assert_eq!(insert.error_count(), 1);
        assert_eq!(insert.rows_inserted(), 0);

        // still usable after the failure
        insert.values(row![1_i64, 1_i64]).await;
        insert.values(row![2_i64, 2_i64]).await;

        let errors = insert.finish().await.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.failed_row_count(), 0);
        assert!(errors.to_string().starts_with("1 errors: [Insert into pairs failed: call 0 rejected"));
        assert_eq!(db.batch_sizes(), vec![498, 2]);
    }

    #[tokio::test]
    async fn test_finish_reports_every_failure() {
        let db = RecordingDatabase::always_failing();
        let mut insert = BulkInsert::new(ExecutionContext::new(), &db, "t", ["v"]).unwrap();
        let limit = insert.row_limit();

        for i in 0..(limit * 2 + 1) {
            insert.values(row![i as i64]).await;
        }

        let errors = insert.finish().await.unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.to_string().starts_with("3 errors: ["));
        assert!(errors
            .iter()
            .all(|e| matches!(e, BulkInsertError::Execution { source: ExecutionError::Database(_), .. })));
    }

    #[tokio::test]
    async fn test_retain_policy_hands_back_rows() {
        let db = RecordingDatabase::failing_on(&[1]);
        let config = BulkInsertConfig {
            max_bound_params: 4,
            failed_batch_policy: FailedBatchPolicy::Retain,
        };
        let mut insert =
            BulkInsert::with_config(ExecutionContext::new(), &db, "t", ["a", "b"], config).unwrap();
        assert_eq!(insert.row_limit(), 1);

        insert.values(row![1_i64, 10_i64]).await;
        insert.values(row![2_i64, 20_i64]).await;
        insert.values(row![3_i64, 30_i64]).await;

        let errors = insert.finish().await.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.into_failed_rows(), vec![row![2_i64, 20_i64]]);
    }

    #[tokio::test]
    async fn test_statement_build_error_is_recorded() {
        let db = RecordingDatabase::default();
        let mut insert = BulkInsert::new(ExecutionContext::new(), &db, "", ["v"]).unwrap();

        insert.values(row![1_i64]).await;

        let errors = insert.finish().await.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(db.execution_count(), 0);
        assert!(matches!(
            errors.iter().next(),
            Some(BulkInsertError::StatementBuild {
                source: StatementBuildError::InvalidIdentifier { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_deadline_exceeded_is_an_execution_error() {
        let db = RecordingDatabase::slow(Duration::from_secs(5));
        let ctx = ExecutionContext::with_timeout(Duration::from_millis(20));
        let mut insert = BulkInsert::new(ctx, &db, "t", ["v"]).unwrap();

        insert.values(row![1_i64]).await;

        let errors = insert.finish().await.unwrap_err();
        assert_eq!(errors.len(), 1);
        match errors.iter().next() {
            Some(BulkInsertError::Execution { source, .. }) => {
                assert!(source.is_deadline_exceeded())
            }
            other => panic!("Expected execution error, got {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_execution() {
        let db = RecordingDatabase::default();
        let ctx = ExecutionContext::new();
        let mut insert = BulkInsert::new(ctx.child(), &db, "t", ["v"]).unwrap();

        insert.values(row![1_i64]).await;
        ctx.cancel();

        let errors = insert.finish().await.unwrap_err();
        assert_eq!(db.execution_count(), 0);
        assert!(matches!(
            errors.iter().next(),
            Some(BulkInsertError::Execution {
                source: ExecutionError::Cancelled,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_works_through_trait_object() {
        let db = RecordingDatabase::default();
        let dyn_db: &dyn BulkInsertDatabase = &db;
        let mut insert = BulkInsert::new(ExecutionContext::new(), dyn_db, "t", ["v"]).unwrap();

        insert.values(row![true]).await;

        assert_eq!(insert.finish().await.unwrap().rows_inserted, 1);
        assert_eq!(db.execution_count(), 1);
    }
}
