// SPDX-License-Identifier: MIT

//! Typed error handling for tessel-rs
//!
//! `TesselError` is the top-level error, `WorkflowError` covers graph
//! construction and run-level failures, `StepError` covers a single
//! step invocation.

use std::time::Duration;
use thiserror::Error;

use crate::tessel::workflow::execution::WorkflowExecution;

/// Top-level error type for tessel-rs
#[derive(Debug, Error)]
pub enum TesselError {
    /// Configuration errors (bad env vars, invalid runner settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Graph construction or validation errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Errors raised by a single step
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    /// A run reached the `failed` terminal status
    #[error("Workflow failed: {message}")]
    RunFailed {
        message: String,
        execution: Box<WorkflowExecution>,
    },

    /// A run reached the `cancelled` terminal status
    #[error("Workflow cancelled")]
    RunCancelled { execution: Box<WorkflowExecution> },

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Workflow graph and run-level errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkflowError {
    /// A step with the same id was already added
    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    /// An operation referenced a step that is not part of the graph
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    /// No constructor is registered for a step kind
    #[error("Unknown step kind: {0}")]
    UnknownKind(String),

    /// A step's configuration could not be turned into a step
    #[error("Invalid configuration for step '{step_id}': {message}")]
    InvalidStepConfig { step_id: String, message: String },

    /// Structural validation failed
    #[error("Validation failed: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// No step is ready, none is running, and some steps never ran
    #[error("Workflow stuck: no runnable steps, stranded steps: {}", .0.join(", "))]
    Stuck(Vec<String>),

    /// Workflow file not found when loading
    #[error("Workflow file not found: {0}")]
    FileNotFound(String),
}

/// Errors produced while running a single step
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepError {
    /// Input does not satisfy the step's input schema
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// Output does not satisfy the step's output schema
    #[error("Output validation failed: {0}")]
    InvalidOutput(String),

    /// The step exceeded its timeout
    #[error("Step timed out after {0:?}")]
    Timeout(Duration),

    /// The step observed cancellation and stopped
    #[error("Step cancelled")]
    Cancelled,

    /// The step's own logic failed
    #[error("{0}")]
    Execution(String),

    /// The step panicked
    #[error("Step panicked: {0}")]
    Panicked(String),
}

impl TesselError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// The execution record attached to a failed or cancelled run
    pub fn execution(&self) -> Option<&WorkflowExecution> {
        match self {
            Self::RunFailed { execution, .. } | Self::RunCancelled { execution } => {
                Some(execution)
            }
            _ => None,
        }
    }
}

impl StepError {
    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Only failures of the step's own logic are retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution(_))
    }
}

impl From<&str> for StepError {
    fn from(s: &str) -> Self {
        Self::Execution(s.to_string())
    }
}

impl From<String> for StepError {
    fn from(s: String) -> Self {
        Self::Execution(s)
    }
}
