use serde::{Deserialize, Serialize};

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER`, the lowest limit among the supported databases.
pub const MAX_BOUND_PARAMS: usize = 999;

/// What happens to the rows of a flush that failed.
///
/// Failed flushes are never retried; this only decides whether the rows are handed back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedBatchPolicy {
    /// Drop the rows once the error is recorded.
    #[default]
    Discard,

    /// Keep the rows with the recorded error so the caller can get them back from `finish`.
    Retain,
}

/// Tuning options for a bulk insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkInsertConfig {
    /// Most bound parameters a single statement may carry. The row limit is derived from it.
    #[serde(default = "default_max_bound_params")]
    pub max_bound_params: usize,

    #[serde(default)]
    pub failed_batch_policy: FailedBatchPolicy,
}

fn default_max_bound_params() -> usize {
    MAX_BOUND_PARAMS
}

impl Default for BulkInsertConfig {
    fn default() -> Self {
        Self { max_bound_params: MAX_BOUND_PARAMS, failed_batch_policy: FailedBatchPolicy::Discard }
    }
}
