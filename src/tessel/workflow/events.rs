// SPDX-License-Identifier: MIT

//! Lifecycle events emitted while a workflow runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::execution::WorkflowExecution;

/// A single notification on the run's event stream
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowEvent {
    pub timestamp: DateTime<Utc>,
    pub workflow_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Event type and its payload
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    WorkflowStarted {
        initial_input: Value,
    },
    StepStarted {
        step_id: String,
        input_data: Value,
    },
    StepCompleted {
        step_id: String,
        output_data: Value,
    },
    StepFailed {
        step_id: String,
        error: String,
    },
    EdgeActivated {
        from_step: String,
        to_step: String,
        data: Value,
    },
    WorkflowCompleted {
        execution: Box<WorkflowExecution>,
    },
    WorkflowFailed {
        execution: Box<WorkflowExecution>,
        error: String,
    },
    WorkflowCancelled {
        execution: Box<WorkflowExecution>,
        error: String,
    },
}

impl WorkflowEvent {
    pub fn new(workflow_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            workflow_id: workflow_id.into(),
            kind,
        }
    }

    /// Wire name of the event type
    pub fn event_type(&self) -> &'static str {
        match &self.kind {
            EventKind::WorkflowStarted { .. } => "workflow_started",
            EventKind::StepStarted { .. } => "step_started",
            EventKind::StepCompleted { .. } => "step_completed",
            EventKind::StepFailed { .. } => "step_failed",
            EventKind::EdgeActivated { .. } => "edge_activated",
            EventKind::WorkflowCompleted { .. } => "workflow_completed",
            EventKind::WorkflowFailed { .. } => "workflow_failed",
            EventKind::WorkflowCancelled { .. } => "workflow_cancelled",
        }
    }

    /// Step id for step-scoped events
    pub fn step_id(&self) -> Option<&str> {
        match &self.kind {
            EventKind::StepStarted { step_id, .. }
            | EventKind::StepCompleted { step_id, .. }
            | EventKind::StepFailed { step_id, .. } => Some(step_id),
            _ => None,
        }
    }

    /// Final execution record carried by terminal events
    pub fn terminal_execution(&self) -> Option<&WorkflowExecution> {
        match &self.kind {
            EventKind::WorkflowCompleted { execution }
            | EventKind::WorkflowFailed { execution, .. }
            | EventKind::WorkflowCancelled { execution, .. } => Some(execution),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_execution().is_some()
    }
}
