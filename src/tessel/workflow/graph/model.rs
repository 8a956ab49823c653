// SPDX-License-Identifier: MIT

//! Graph model: steps, edges, start and end steps

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::sdk::error::WorkflowError;
use crate::sdk::step::Step;
use crate::tessel::workflow::condition::EdgeCondition;
use crate::tessel::workflow::state::StateSchema;

/// Descriptive workflow metadata
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WorkflowMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Directed, conditionally active link between two steps
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Edge {
    #[serde(default = "new_edge_id")]
    pub id: String,
    pub from_step: String,
    pub to_step: String,
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// A graph of steps
///
/// Built once through the `add_*`/`set_*` operations and read-only while
/// it runs; every run-scoped value lives in a `WorkflowExecution`.
pub struct Workflow {
    pub id: String,
    pub metadata: WorkflowMetadata,
    steps: HashMap<String, Arc<dyn Step>>,
    step_order: Vec<String>,
    edges: Vec<Edge>,
    initial_state: Map<String, Value>,
    state_schema: StateSchema,
    start_step_id: Option<String>,
    end_step_ids: BTreeSet<String>,
}

fn new_edge_id() -> String {
    Uuid::new_v4().to_string()
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(
            Uuid::new_v4().to_string(),
            WorkflowMetadata {
                name: name.into(),
                ..WorkflowMetadata::default()
            },
        )
    }

    pub fn with_id(id: impl Into<String>, metadata: WorkflowMetadata) -> Self {
        Self {
            id: id.into(),
            metadata,
            steps: HashMap::new(),
            step_order: Vec::new(),
            edges: Vec::new(),
            initial_state: Map::new(),
            state_schema: StateSchema::default(),
            start_step_id: None,
            end_step_ids: BTreeSet::new(),
        }
    }

    pub fn add_step(&mut self, step: Arc<dyn Step>) -> Result<&mut Self, WorkflowError> {
        let id = step.step_id().to_string();
        if self.steps.contains_key(&id) {
            return Err(WorkflowError::DuplicateStep(id));
        }
        self.step_order.push(id.clone());
        self.steps.insert(id, step);
        Ok(self)
    }

    /// Link two existing steps; `None` means an `always` condition
    pub fn add_edge(
        &mut self,
        from: &str,
        to: &str,
        condition: Option<EdgeCondition>,
    ) -> Result<&mut Self, WorkflowError> {
        self.push_edge(Edge {
            id: new_edge_id(),
            from_step: from.to_string(),
            to_step: to.to_string(),
            condition: condition.unwrap_or_default(),
        })
    }

    /// Add a fully specified edge, keeping its id
    pub fn push_edge(&mut self, edge: Edge) -> Result<&mut Self, WorkflowError> {
        for id in [&edge.from_step, &edge.to_step] {
            if !self.steps.contains_key(id) {
                return Err(WorkflowError::UnknownStep(id.clone()));
            }
        }
        self.edges.push(edge);
        Ok(self)
    }

    pub fn set_start_step(&mut self, step_id: &str) -> Result<&mut Self, WorkflowError> {
        if !self.steps.contains_key(step_id) {
            return Err(WorkflowError::UnknownStep(step_id.to_string()));
        }
        self.start_step_id = Some(step_id.to_string());
        Ok(self)
    }

    /// Declare an end step; existence is checked by `validate`
    pub fn add_end_step(&mut self, step_id: &str) -> &mut Self {
        self.end_step_ids.insert(step_id.to_string());
        self
    }

    pub fn set_initial_state(&mut self, state: Map<String, Value>) -> &mut Self {
        self.initial_state = state;
        self
    }

    pub fn set_state_schema(&mut self, schema: StateSchema) -> &mut Self {
        self.state_schema = schema;
        self
    }

    pub fn step(&self, step_id: &str) -> Option<&Arc<dyn Step>> {
        self.steps.get(step_id)
    }

    /// Steps in the order they were added
    pub fn steps(&self) -> impl Iterator<Item = &Arc<dyn Step>> {
        self.step_order.iter().filter_map(|id| self.steps.get(id))
    }

    pub fn step_ids(&self) -> &[String] {
        &self.step_order
    }

    pub fn has_step(&self, step_id: &str) -> bool {
        self.steps.contains_key(step_id)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn initial_state(&self) -> &Map<String, Value> {
        &self.initial_state
    }

    pub fn state_schema(&self) -> &StateSchema {
        &self.state_schema
    }

    pub fn start_step_id(&self) -> Option<&str> {
        self.start_step_id.as_deref()
    }

    pub fn end_step_ids(&self) -> &BTreeSet<String> {
        &self.end_step_ids
    }

    pub fn is_end_step(&self, step_id: &str) -> bool {
        self.end_step_ids.contains(step_id)
    }

    pub fn incoming_edges<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.to_step == step_id)
    }

    pub fn outgoing_edges<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.from_step == step_id)
    }

    /// Upstream step ids in edge declaration order, without duplicates
    pub fn get_step_dependencies(&self, step_id: &str) -> Vec<&str> {
        dedup(
            self.edges
                .iter()
                .filter(|e| e.to_step == step_id)
                .map(|e| e.from_step.as_str()),
        )
    }

    /// Downstream step ids in edge declaration order, without duplicates
    pub fn get_step_dependents(&self, step_id: &str) -> Vec<&str> {
        dedup(
            self.edges
                .iter()
                .filter(|e| e.from_step == step_id)
                .map(|e| e.to_step.as_str()),
        )
    }
}

fn dedup<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .field("steps", &self.step_order)
            .field("edges", &self.edges)
            .field("start_step_id", &self.start_step_id)
            .field("end_step_ids", &self.end_step_ids)
            .finish()
    }
}
