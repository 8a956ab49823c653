// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sdk::error::{StepError, WorkflowError};
use crate::sdk::schema::Schema;
use crate::sdk::step::{Step, StepBase, StepConfig, StepContext, StepMetadata};

pub const KIND: &str = "set_state";

#[derive(Debug, Default, Deserialize, Serialize)]
struct SetStateArgs {
    #[serde(default)]
    values: Map<String, Value>,
}

/// Writes its configured `values` into the shared state and returns its input
pub struct SetStateStep {
    base: StepBase,
    values: Map<String, Value>,
}

impl SetStateStep {
    pub fn new(step_id: impl Into<String>, values: Map<String, Value>) -> Self {
        let step_id = step_id.into();
        let mut config = StepConfig::new(step_id.clone(), KIND);
        config.metadata = StepMetadata::named(step_id);
        Self {
            base: StepBase::from_config(&config),
            values,
        }
    }

    pub fn from_config(config: &StepConfig) -> Result<Self, WorkflowError> {
        let args: SetStateArgs = serde_json::from_value(Value::Object(config.params.clone()))
            .map_err(|e| WorkflowError::InvalidStepConfig {
                step_id: config.step_id.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base: StepBase::from_config(config),
            values: args.values,
        })
    }
}

#[async_trait]
impl Step for SetStateStep {
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
        params.insert("values".into(), Value::Object(self.values.clone()));
        params
    }

    async fn execute(&self, input: Value, ctx: &StepContext) -> Result<Value, StepError> {
        for (key, value) in &self.values {
            log::debug!("Step {} sets state '{}'", self.step_id(), key);
            ctx.set_state(key, value.clone()).await;
        }
        Ok(input)
    }
}
