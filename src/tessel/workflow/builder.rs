// SPDX-License-Identifier: MIT

//! Workflow builder - turns definitions into runnable graphs

use std::path::Path;

use crate::sdk::error::TesselError;
use crate::tessel::workflow::graph::Workflow;
use crate::tessel::workflow::loader::WorkflowLoader;
use crate::tessel::workflow::registry::StepRegistry;
use crate::tessel::workflow::types::WorkflowDefinition;

/// Builds `Workflow` graphs from definitions, resolving steps through a registry
pub struct Builder {
    loader: WorkflowLoader,
    registry: StepRegistry,
}

impl Builder {
    pub fn new(registry: StepRegistry) -> Self {
        Self {
            loader: WorkflowLoader::new(),
            registry,
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Build a workflow from a YAML or JSON file
    pub async fn build_from_file<P: AsRef<Path>>(&self, path: P) -> Result<Workflow, TesselError> {
        let def = self.loader.load_workflow(path)?;
        self.build(&def).await
    }

    /// Build a workflow from a parsed definition
    ///
    /// Construction errors (unknown kinds, duplicate ids, dangling edges)
    /// fail here; structural checks are left to `Workflow::validate`.
    pub async fn build(&self, def: &WorkflowDefinition) -> Result<Workflow, TesselError> {
        let mut workflow = Workflow::with_id(def.id.clone(), def.metadata.clone());

        for config in &def.steps {
            let step = self.registry.build(config).await?;
            workflow.add_step(step)?;
        }
        for edge in &def.edges {
            workflow.push_edge(edge.clone())?;
        }
        if let Some(start) = &def.start_step_id {
            workflow.set_start_step(start)?;
        }
        for end in &def.end_step_ids {
            workflow.add_end_step(end);
        }
        workflow
            .set_initial_state(def.initial_state.clone())
            .set_state_schema(def.state_schema.clone());

        log::info!(
            "Built workflow '{}' with {} steps and {} edges",
            def.metadata.name,
            def.steps.len(),
            def.edges.len()
        );
        Ok(workflow)
    }
}
