// SPDX-License-Identifier: MIT

//! Wire form of a workflow

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::graph::{Edge, Workflow, WorkflowMetadata};
use super::state::StateSchema;
use crate::sdk::step::StepConfig;

/// Serializable workflow, as stored in YAML/JSON files and sent over HTTP
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowDefinition {
    #[serde(default = "new_workflow_id")]
    pub id: String,
    pub metadata: WorkflowMetadata,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub initial_state: Map<String, Value>,
    #[serde(default, skip_serializing_if = "StateSchema::is_empty")]
    pub state_schema: StateSchema,
    #[serde(default)]
    pub start_step_id: Option<String>,
    #[serde(default)]
    pub end_step_ids: BTreeSet<String>,
}

fn new_workflow_id() -> String {
    Uuid::new_v4().to_string()
}

impl Workflow {
    /// Wire form of the graph; steps and edges keep their declaration order
    pub fn to_definition(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            id: self.id.clone(),
            metadata: self.metadata.clone(),
            steps: self.steps().map(|s| s.config()).collect(),
            edges: self.edges().to_vec(),
            initial_state: self.initial_state().clone(),
            state_schema: self.state_schema().clone(),
            start_step_id: self.start_step_id().map(str::to_string),
            end_step_ids: self.end_step_ids().clone(),
        }
    }
}
