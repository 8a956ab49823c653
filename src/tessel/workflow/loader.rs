// SPDX-License-Identifier: MIT

//! Workflow loader - YAML/JSON file loading and parsing

use std::fs;
use std::path::Path;

use super::types::WorkflowDefinition;
use crate::sdk::error::{TesselError, WorkflowError};

/// Loads workflow definitions from files
///
/// YAML is a superset of JSON, so both formats go through `serde_yaml`.
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow definition from a YAML or JSON file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowDefinition, TesselError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WorkflowError::FileNotFound(path.display().to_string()).into());
        }
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition, TesselError> {
        let def: WorkflowDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }

    pub fn to_yaml(def: &WorkflowDefinition) -> Result<String, TesselError> {
        Ok(serde_yaml::to_string(def)?)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}
