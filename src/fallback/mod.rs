//! Ordered "try A, else B, else C" evaluation.
//!
//! Each strategy is a named, lazily-started future. The runner stops at the first success
//! and records `(strategy, outcome)` for every strategy it touched, so callers get a uniform
//! audit trail without nesting error handling.

use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::AcquireError;

/// Why a strategy produced no value
#[derive(Debug, Clone)]
pub enum StepError {
    /// Not applicable or a prerequisite is missing; not a failure
    Skipped(String),
    Failed(String),
}

impl StepError {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StepError::Skipped(reason.into())
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        StepError::Failed(reason.into())
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepError::Skipped(reason) => write!(f, "skipped: {reason}"),
            StepError::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

impl From<AcquireError> for StepError {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::ToolMissing(_) => StepError::Skipped(err.to_string()),
            other => StepError::Failed(other.to_string()),
        }
    }
}

impl From<crate::fetch::FetchError> for StepError {
    fn from(err: crate::fetch::FetchError) -> Self {
        StepError::from(AcquireError::from(err))
    }
}

impl From<crate::process::ToolError> for StepError {
    fn from(err: crate::process::ToolError) -> Self {
        StepError::from(AcquireError::from(err))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed(String),
    Skipped(String),
    /// Never started because an earlier strategy won
    NotTried,
}

/// One strategy evaluation, as it appears in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub stage: String,
    pub strategy: String,
    pub outcome: AttemptOutcome,
}

impl Attempt {
    pub fn new(stage: impl Into<String>, strategy: impl Into<String>, outcome: AttemptOutcome) -> Self {
        Self {
            stage: stage.into(),
            strategy: strategy.into(),
            outcome,
        }
    }

    pub fn from_step<T>(
        stage: impl Into<String>,
        strategy: impl Into<String>,
        result: &Result<T, StepError>,
    ) -> Self {
        let outcome = match result {
            Ok(_) => AttemptOutcome::Succeeded,
            Err(StepError::Skipped(reason)) => AttemptOutcome::Skipped(reason.clone()),
            Err(StepError::Failed(reason)) => AttemptOutcome::Failed(reason.clone()),
        };
        Self::new(stage, strategy, outcome)
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Succeeded
    }
}

type StepFn<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, Result<T, StepError>> + Send + 'a>;

/// Ordered list of named strategies evaluated until one succeeds
pub struct FallbackChain<'a, T> {
    stage: String,
    steps: Vec<(String, StepFn<'a, T>)>,
}

/// Result of running a chain
#[derive(Debug)]
pub struct FallbackResult<T> {
    pub value: Option<T>,
    pub winner: Option<String>,
    pub attempts: Vec<Attempt>,
}

impl<T> FallbackResult<T> {
    /// Human-readable `strategy: outcome` summary of the failed attempts
    pub fn failure_summary(&self) -> String {
        self.attempts
            .iter()
            .filter_map(|attempt| match &attempt.outcome {
                AttemptOutcome::Failed(reason) => Some(format!("{}: {}", attempt.strategy, reason)),
                AttemptOutcome::Skipped(reason) => {
                    Some(format!("{}: skipped ({})", attempt.strategy, reason))
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl<'a, T: Send + 'a> FallbackChain<'a, T> {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            steps: Vec::new(),
        }
    }

    /// Append a strategy; it only starts if every earlier one failed or skipped
    pub fn step<F, Fut>(mut self, name: impl Into<String>, start: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, StepError>> + Send + 'a,
    {
        self.steps
            .push((name.into(), Box::new(move || start().boxed())));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn run(self) -> FallbackResult<T> {
        let mut attempts = Vec::with_capacity(self.steps.len());
        let mut steps = self.steps.into_iter();

        while let Some((name, start)) = steps.next() {
            let result = start().await;
            let attempt = Attempt::from_step(&self.stage, &name, &result);
            match &attempt.outcome {
                AttemptOutcome::Succeeded => {
                    tracing::info!(chain = %self.stage, strategy = %name, "outcome=success")
                }
                AttemptOutcome::Skipped(reason) => {
                    tracing::info!(chain = %self.stage, strategy = %name, "outcome=skip reason={}", reason)
                }
                AttemptOutcome::Failed(reason) => {
                    tracing::warn!(chain = %self.stage, strategy = %name, "outcome=error err={}", reason)
                }
                AttemptOutcome::NotTried => {}
            }
            attempts.push(attempt);

            if let Ok(value) = result {
                attempts.extend(
                    steps.map(|(rest, _)| Attempt::new(&self.stage, rest, AttemptOutcome::NotTried)),
                );
                return FallbackResult {
                    value: Some(value),
                    winner: Some(name),
                    attempts,
                };
            }
        }

        FallbackResult {
            value: None,
            winner: None,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn stops_at_first_success_and_records_every_strategy() {
        let counter = AtomicUsize::new(0);
        let started = &counter;

        let result = FallbackChain::new("metadata")
            .step("a", move || async move {
                started.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(StepError::failed("boom"))
            })
            .step("b", move || async move {
                started.fetch_add(1, Ordering::SeqCst);
                Err(StepError::skipped("not configured"))
            })
            .step("c", move || async move {
                started.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .step("d", move || async move {
                started.fetch_add(1, Ordering::SeqCst);
                Ok(8)
            })
            .run()
            .await;

        assert_eq!(result.value, Some(7));
        assert_eq!(result.winner.as_deref(), Some("c"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        let outcomes: Vec<_> = result.attempts.iter().map(|a| a.outcome.clone()).collect();
        assert_eq!(
            outcomes,
            vec![
                AttemptOutcome::Failed("boom".into()),
                AttemptOutcome::Skipped("not configured".into()),
                AttemptOutcome::Succeeded,
                AttemptOutcome::NotTried,
            ]
        );
        assert!(result.attempts.iter().all(|a| a.stage == "metadata"));
    }

    #[tokio::test]
    async fn all_failures_yield_no_value() {
        let result = FallbackChain::new("audio")
            .step("x", || async { Err::<(), _>(StepError::failed("one")) })
            .step("y", || async { Err::<(), _>(StepError::failed("two")) })
            .run()
            .await;

        assert!(result.value.is_none());
        assert!(result.winner.is_none());
        assert_eq!(result.failure_summary(), "x: one; y: two");
    }

    #[test]
    fn tool_missing_maps_to_skip() {
        let step = StepError::from(AcquireError::ToolMissing("yt-dlp".into()));
        assert!(matches!(step, StepError::Skipped(_)));
        let step = StepError::from(AcquireError::EmptyResult("asr".into()));
        assert!(matches!(step, StepError::Failed(_)));
    }
}
