// SPDX-License-Identifier: MIT

//! Step execution harness: input validation, timeout, retries, output coercion

use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;

use super::{Step, StepContext};
use crate::sdk::error::StepError;

/// Result of running a step through the harness
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub result: Result<Value, StepError>,
    /// Attempts made after the first one
    pub retry_count: u32,
}

impl StepOutcome {
    fn new(result: Result<Value, StepError>, retry_count: u32) -> Self {
        Self {
            result,
            retry_count,
        }
    }
}

/// Run a step with its declared policies
///
/// Invalid input, timeouts, cancellation and panics fail immediately.
/// Errors from the step's own logic are retried up to `max_retries` times
/// with a fixed backoff.
pub async fn run_step(step: &dyn Step, raw_input: Value, ctx: &StepContext) -> StepOutcome {
    let meta = step.metadata();

    if let Err(e) = step.input_schema().validate(&raw_input) {
        log::warn!("Step {} rejected its input: {}", step.step_id(), e);
        return StepOutcome::new(Err(StepError::InvalidInput(e)), 0);
    }

    let mut retries = 0;
    loop {
        match attempt(step, raw_input.clone(), ctx).await {
            Ok(output) => {
                let coerced = step
                    .output_schema()
                    .coerce(output)
                    .map_err(StepError::InvalidOutput);
                return StepOutcome::new(coerced, retries);
            }
            Err(e) if e.is_retryable() && retries < meta.max_retries => {
                retries += 1;
                log::warn!(
                    "Step {} failed ({}), retry {}/{} in {:?}",
                    step.step_id(),
                    e,
                    retries,
                    meta.max_retries,
                    meta.retry_backoff
                );
                tokio::select! {
                    _ = tokio::time::sleep(meta.retry_backoff) => {}
                    _ = ctx.cancelled() => {
                        return StepOutcome::new(Err(StepError::Cancelled), retries);
                    }
                }
            }
            Err(e) => return StepOutcome::new(Err(e), retries),
        }
    }
}

async fn attempt(step: &dyn Step, input: Value, ctx: &StepContext) -> Result<Value, StepError> {
    let guarded = AssertUnwindSafe(step.execute(input, ctx)).catch_unwind();

    let finished = match step.metadata().timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(finished) => finished,
            Err(_) => return Err(StepError::Timeout(limit)),
        },
        None => guarded.await,
    };

    finished.unwrap_or_else(|panic| Err(StepError::Panicked(panic_message(panic))))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::schema::{FieldKind, Schema};
    use crate::sdk::step::StepMetadata;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails `failures` times, then echoes its input
    struct FlakyStep {
        metadata: StepMetadata,
        schema: Schema,
        failures: u32,
        calls: AtomicU32,
        sleep: Option<Duration>,
    }

    impl FlakyStep {
        fn new(failures: u32, max_retries: u32) -> Self {
            Self {
                metadata: StepMetadata::named("flaky")
                    .with_retries(max_retries, Duration::from_millis(1)),
                schema: Schema::new().field("message", FieldKind::String),
                failures,
                calls: AtomicU32::new(0),
                sleep: None,
            }
        }
    }

    #[async_trait]
    impl Step for FlakyStep {
        fn step_id(&self) -> &str {
            "flaky"
        }

        fn kind(&self) -> &str {
            "flaky"
        }

        fn metadata(&self) -> &StepMetadata {
            &self.metadata
        }

        fn input_schema(&self) -> &Schema {
            &self.schema
        }

        fn output_schema(&self) -> &Schema {
            &self.schema
        }

        async fn execute(&self, input: Value, _ctx: &StepContext) -> Result<Value, StepError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.sleep {
                tokio::time::sleep(d).await;
            }
            if call < self.failures {
                return Err(format!("attempt {} failed", call + 1).into());
            }
            if input["message"] == "panic" {
                panic!("step exploded");
            }
            Ok(json!({"message": input["message"], "noise": 1}))
        }
    }

    #[tokio::test]
    async fn test_success_coerces_output() {
        let step = FlakyStep::new(0, 0);
        let outcome = run_step(&step, json!({"message": "hi"}), &StepContext::detached("flaky")).await;

        assert_eq!(outcome.result.unwrap(), json!({"message": "hi"}));
        assert_eq!(outcome.retry_count, 0);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let step = FlakyStep::new(2, 3);
        let outcome = run_step(&step, json!({"message": "hi"}), &StepContext::detached("flaky")).await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.retry_count, 2);
        assert_eq!(step.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let step = FlakyStep::new(5, 2);
        let outcome = run_step(&step, json!({"message": "hi"}), &StepContext::detached("flaky")).await;

        assert_eq!(
            outcome.result.unwrap_err(),
            StepError::Execution("attempt 3 failed".into())
        );
        assert_eq!(outcome.retry_count, 2);
        assert_eq!(step.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_input_is_not_retried() {
        let step = FlakyStep::new(0, 3);
        let outcome = run_step(&step, json!({"text": "hi"}), &StepContext::detached("flaky")).await;

        assert!(matches!(outcome.result, Err(StepError::InvalidInput(_))));
        assert_eq!(step.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_not_retried() {
        let mut step = FlakyStep::new(0, 3);
        step.metadata = step.metadata.clone().with_timeout(Duration::from_millis(10));
        step.sleep = Some(Duration::from_millis(200));

        let outcome = run_step(&step, json!({"message": "hi"}), &StepContext::detached("flaky")).await;

        assert_eq!(
            outcome.result.unwrap_err(),
            StepError::Timeout(Duration::from_millis(10))
        );
        assert_eq!(step.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let step = FlakyStep::new(0, 3);
        let outcome =
            run_step(&step, json!({"message": "panic"}), &StepContext::detached("flaky")).await;

        assert_eq!(
            outcome.result.unwrap_err(),
            StepError::Panicked("step exploded".into())
        );
        assert_eq!(step.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let mut step = FlakyStep::new(5, 5);
        step.metadata.retry_backoff = Duration::from_secs(30);
        let ctx = StepContext::detached("flaky");
        ctx.cancellation().cancel();

        let outcome = run_step(&step, json!({"message": "hi"}), &ctx).await;

        assert_eq!(outcome.result.unwrap_err(), StepError::Cancelled);
        assert_eq!(outcome.retry_count, 1);
    }
}
