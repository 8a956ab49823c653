// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::sdk::error::{StepError, WorkflowError};
use crate::sdk::schema::Schema;
use crate::sdk::step::{Step, StepBase, StepConfig, StepContext, StepMetadata};

pub const KIND: &str = "delay";

#[derive(Debug, Deserialize)]
struct DelayArgs {
    millis: u64,
}

/// Waits, then returns its input; stops early when cancelled
pub struct DelayStep {
    base: StepBase,
    millis: u64,
}

impl DelayStep {
    pub fn new(step_id: impl Into<String>, delay: Duration) -> Self {
        let step_id = step_id.into();
        let mut config = StepConfig::new(step_id.clone(), KIND);
        config.metadata = StepMetadata::named(step_id);
        Self {
            base: StepBase::from_config(&config),
            millis: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn from_config(config: &StepConfig) -> Result<Self, WorkflowError> {
        let args: DelayArgs = serde_json::from_value(Value::Object(config.params.clone()))
            .map_err(|e| WorkflowError::InvalidStepConfig {
                step_id: config.step_id.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base: StepBase::from_config(config),
            millis: args.millis,
        })
    }
}

#[async_trait]
impl Step for DelayStep {
    fn step_id(&self) -> &str {
        &self.base.step_id
    }

    fn kind(&self) -> &str {
        &self.base.kind
    }

    fn metadata(&self) -> &StepMetadata {
        &self.base.metadata
    }

    fn input_schema(&self) -> &Schema {
        &self.base.input_schema
    }

    fn output_schema(&self) -> &Schema {
        &self.base.output_schema
    }

    fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("millis".into(), Value::from(self.millis));
        params
    }

    async fn execute(&self, input: Value, ctx: &StepContext) -> Result<Value, StepError> {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(self.millis)) => Ok(input),
            _ = ctx.cancelled() => Err(StepError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_waits_then_returns_input() {
        let step = DelayStep::new("wait", Duration::from_millis(10));
        let out = step
            .execute(json!({"n": 1}), &StepContext::detached("wait"))
            .await
            .unwrap();
        assert_eq!(out, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting() {
        let step = DelayStep::new("wait", Duration::from_secs(30));
        let ctx = StepContext::detached("wait");
        ctx.cancellation().cancel();

        let err = step.execute(json!({}), &ctx).await.unwrap_err();
        assert_eq!(err, StepError::Cancelled);
    }

    #[test]
    fn test_requires_millis() {
        assert!(DelayStep::from_config(&StepConfig::new("wait", KIND)).is_err());

        let config = StepConfig::new("wait", KIND).param("millis", json!(250));
        let step = DelayStep::from_config(&config).unwrap();
        assert_eq!(step.config(), config);
    }

    #[test]
    fn test_oversized_delay_saturates() {
        let step = DelayStep::new("wait", Duration::MAX);
        assert_eq!(step.params()["millis"], json!(u64::MAX));
    }
}
