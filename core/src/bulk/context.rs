use std::{future::Future, time::Duration};

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("Execution was cancelled")]
    Cancelled,

    #[error("Execution deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation and deadline carried into every statement a bulk insert executes.
///
/// Cancelling the context (or passing its deadline) aborts the in-flight `await`. For the SQLite
/// backend the blocking work already handed to the blocking pool still runs to completion.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self { token: CancellationToken::new(), deadline: None }
    }
}

impl ExecutionContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self { token: CancellationToken::new(), deadline: Some(deadline) }
    }

    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    /// Derives a context that is cancelled together with this one but can also be cancelled on
    /// its own. The deadline is inherited.
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token(), deadline: self.deadline }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Drives `future` to completion unless the context is cancelled or its deadline passes
    /// first. A context that is already done never polls the future.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        if self.token.is_cancelled() {
            return Err(ContextError::Cancelled);
        }

        match self.deadline {
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return Err(ContextError::DeadlineExceeded);
                }

                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(ContextError::Cancelled),
                    _ = sleep_until(deadline) => Err(ContextError::DeadlineExceeded),
                    output = future => Ok(output),
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(ContextError::Cancelled),
                    output = future => Ok(output),
                }
            }
        }
    }
}
