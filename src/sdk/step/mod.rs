// SPDX-License-Identifier: MIT

//! Step contract
//!
//! A step is a typed unit of work: it declares an input schema, an output
//! schema and an `execute` operation. Steps know nothing about the graph
//! they are placed in and keep no state between runs.

mod context;
mod harness;

pub use context::StepContext;
pub use harness::{run_step, StepOutcome};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::sdk::error::StepError;
use crate::sdk::schema::Schema;

/// Core trait implemented by every step
#[async_trait]
pub trait Step: Send + Sync {
    /// Unique id of the step within its workflow
    fn step_id(&self) -> &str;

    /// Registry key used to rebuild the step from its configuration
    fn kind(&self) -> &str;

    fn metadata(&self) -> &StepMetadata;

    fn input_schema(&self) -> &Schema;

    fn output_schema(&self) -> &Schema;

    /// Implementation-specific configuration fields
    fn params(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Run the step's logic once
    async fn execute(&self, input: Value, ctx: &StepContext) -> Result<Value, StepError>;

    /// Serializable description of the step
    fn config(&self) -> StepConfig {
        StepConfig {
            step_id: self.step_id().to_string(),
            kind: self.kind().to_string(),
            metadata: self.metadata().clone(),
            input_schema: self.input_schema().clone(),
            output_schema: self.output_schema().clone(),
            params: self.params(),
        }
    }
}

/// Descriptive and policy fields of a step
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StepMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Retries after the first failed attempt
    #[serde(default)]
    pub max_retries: u32,
    /// Per-attempt time limit, in seconds on the wire
    #[serde(default, with = "optional_secs", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Fixed wait between retries, in seconds on the wire
    #[serde(default = "default_backoff", with = "secs")]
    pub retry_backoff: Duration,
    /// How the input is chosen when several dependencies are satisfied
    #[serde(default)]
    pub join: JoinPolicy,
}

impl Default for StepMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            tags: Vec::new(),
            max_retries: 0,
            timeout: None,
            retry_backoff: default_backoff(),
            join: JoinPolicy::default(),
        }
    }
}

impl StepMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_join(mut self, join: JoinPolicy) -> Self {
        self.join = join;
        self
    }
}

fn default_backoff() -> Duration {
    Duration::from_secs(1)
}

/// Input selection for steps with several satisfied dependencies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinPolicy {
    /// Output of the first satisfied dependency in declaration order
    #[default]
    First,
    /// Shallow merge of every satisfied dependency's object output
    Merge,
}

/// Serializable form of a step
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StepConfig {
    pub step_id: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: StepMetadata,
    #[serde(default)]
    pub input_schema: Schema,
    #[serde(default)]
    pub output_schema: Schema,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl StepConfig {
    pub fn new(step_id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            kind: kind.into(),
            metadata: StepMetadata::default(),
            input_schema: Schema::default(),
            output_schema: Schema::default(),
            params: Map::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Fields shared by configuration-driven steps
#[derive(Debug, Clone)]
pub struct StepBase {
    pub step_id: String,
    pub kind: String,
    pub metadata: StepMetadata,
    pub input_schema: Schema,
    pub output_schema: Schema,
}

impl StepBase {
    pub fn from_config(config: &StepConfig) -> Self {
        Self {
            step_id: config.step_id.clone(),
            kind: config.kind.clone(),
            metadata: config.metadata.clone(),
            input_schema: config.input_schema.clone(),
            output_schema: config.output_schema.clone(),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_defaults() {
        let meta: StepMetadata = serde_json::from_value(json!({})).unwrap();
        assert_eq!(meta, StepMetadata::default());
        assert_eq!(meta.retry_backoff, Duration::from_secs(1));
        assert_eq!(meta.join, JoinPolicy::First);
        assert!(meta.timeout.is_none());
    }

    #[test]
    fn test_metadata_durations_in_seconds() {
        let meta: StepMetadata = serde_yaml::from_str(
            r#"
            name: fetch
            max_retries: 2
            timeout: 1.5
            retry_backoff: 0.25
            join: merge
        "#,
        )
        .unwrap();

        assert_eq!(meta.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(meta.retry_backoff, Duration::from_millis(250));
        assert_eq!(meta.join, JoinPolicy::Merge);

        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["timeout"], json!(1.5));
        assert_eq!(value["retry_backoff"], json!(0.25));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let result: Result<StepMetadata, _> = serde_json::from_value(json!({"timeout": -1.0}));
        assert!(result.is_err());
    }

    #[test]
    fn test_step_config_keeps_params() {
        let yaml = r#"
            step_id: wait
            kind: delay
            millis: 50
            metadata:
              name: Wait a bit
        "#;
        let config: StepConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.step_id, "wait");
        assert_eq!(config.kind, "delay");
        assert_eq!(config.params.get("millis"), Some(&json!(50)));
        assert!(config.input_schema.is_open());

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["millis"], json!(50));
        assert_eq!(value["input_schema"]["type"], json!("object"));
    }
}
