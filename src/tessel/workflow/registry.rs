// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::sdk::error::WorkflowError;
use crate::sdk::step::{Step, StepConfig};
use crate::tessel::steps::{
    DelayStep, PassthroughStep, SetStateStep, DELAY_KIND, PASSTHROUGH_KIND, SET_STATE_KIND,
};

/// Builds a step from its serialized configuration
pub type StepFactory =
    Arc<dyn Fn(&StepConfig) -> Result<Arc<dyn Step>, WorkflowError> + Send + Sync>;

/// Maps a step `kind` to the factory that rebuilds it
#[derive(Clone)]
pub struct StepRegistry {
    factories: Arc<RwLock<HashMap<String, StepFactory>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A registry preloaded with the built-in steps
    pub fn with_builtins() -> Self {
        let mut factories: HashMap<String, StepFactory> = HashMap::new();
        factories.insert(PASSTHROUGH_KIND.to_string(), Arc::new(build_passthrough));
        factories.insert(SET_STATE_KIND.to_string(), Arc::new(build_set_state));
        factories.insert(DELAY_KIND.to_string(), Arc::new(build_delay));

        Self {
            factories: Arc::new(RwLock::new(factories)),
        }
    }

    pub async fn register<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&StepConfig) -> Result<Arc<dyn Step>, WorkflowError> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().await;
        factories.insert(kind.into(), Arc::new(factory));
    }

    pub async fn get(&self, kind: &str) -> Option<StepFactory> {
        let factories = self.factories.read().await;
        factories.get(kind).cloned()
    }

    /// Build a step from its configuration using the factory for its kind
    pub async fn build(&self, config: &StepConfig) -> Result<Arc<dyn Step>, WorkflowError> {
        let factory = self
            .get(&config.kind)
            .await
            .ok_or_else(|| WorkflowError::UnknownKind(config.kind.clone()))?;
        factory(config)
    }

    /// Registered kinds, sorted
    pub async fn kinds(&self) -> Vec<String> {
        let factories = self.factories.read().await;
        let mut kinds: Vec<String> = factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

fn build_passthrough(config: &StepConfig) -> Result<Arc<dyn Step>, WorkflowError> {
    Ok(Arc::new(PassthroughStep::from_config(config)))
}

fn build_set_state(config: &StepConfig) -> Result<Arc<dyn Step>, WorkflowError> {
    Ok(Arc::new(SetStateStep::from_config(config)?))
}

fn build_delay(config: &StepConfig) -> Result<Arc<dyn Step>, WorkflowError> {
    Ok(Arc::new(DelayStep::from_config(config)?))
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
