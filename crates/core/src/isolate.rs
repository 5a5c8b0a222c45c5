//! Failure isolation shared by every stage that must keep going after a bad item.

use std::fmt::Display;
use std::future::Future;
use tracing::error;

/// Granularity at which a failure was contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Indexing,
    Query,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Indexing => "indexing",
            Stage::Query => "query",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs `operation`; on error logs `label` with the error and returns `fallback`.
pub fn isolate<T, E, F>(stage: Stage, label: impl Display, fallback: T, operation: F) -> T
where
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    match operation() {
        Ok(value) => value,
        Err(failure) => {
            error!(stage = %stage, item = %label, error = %failure, "Error during {stage} of {label}: {failure}");
            fallback
        }
    }
}

/// Async counterpart of [`isolate`].
pub async fn isolate_async<T, E, Fut>(
    stage: Stage,
    label: impl Display,
    fallback: T,
    operation: Fut,
) -> T
where
    E: Display,
    Fut: Future<Output = Result<T, E>>,
{
    match operation.await {
        Ok(value) => value,
        Err(failure) => {
            error!(stage = %stage, item = %label, error = %failure, "Error during {stage} of {label}: {failure}");
            fallback
        }
    }
}
