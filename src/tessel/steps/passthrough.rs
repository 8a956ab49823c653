// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;

use crate::sdk::error::StepError;
use crate::sdk::schema::Schema;
use crate::sdk::step::{Step, StepBase, StepConfig, StepContext, StepMetadata};

pub const KIND: &str = "passthrough";

/// Returns its input unchanged
pub struct PassthroughStep {
    base: StepBase,
}

impl PassthroughStep {
    pub fn new(step_id: impl Into<String>) -> Self {
        let step_id = step_id.into();
        let mut config = StepConfig::new(step_id.clone(), KIND);
        config.metadata = StepMetadata::named(step_id);
        Self::from_config(&config)
    }

    pub fn from_config(config: &StepConfig) -> Self {
        Self {
            base: StepBase::from_config(config),
        }
    }
}

#[async_trait]
impl Step for PassthroughStep {
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

    async fn execute(&self, input: Value, _ctx: &StepContext) -> Result<Value, StepError> {
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::schema::FieldKind;
    use crate::sdk::step::run_step;
    use serde_json::json;

    #[tokio::test]
    async fn test_returns_input() {
        let step = PassthroughStep::new("echo");
        let ctx = StepContext::detached("echo");
        let out = step.execute(json!({"a": 1}), &ctx).await.unwrap();
        assert_eq!(out, json!({"a": 1}));
        assert_eq!(step.kind(), KIND);
        assert_eq!(step.metadata().name, "echo");
    }

    #[tokio::test]
    async fn test_output_schema_drops_extra_fields() {
        let mut config = StepConfig::new("echo", KIND);
        config.output_schema = Schema::new().field("a", FieldKind::Integer);
        let step = PassthroughStep::from_config(&config);

        let outcome = run_step(&step, json!({"a": 1, "b": 2}), &StepContext::detached("echo")).await;
        assert_eq!(outcome.result.unwrap(), json!({"a": 1}));
    }
}
