// SPDX-License-Identifier: MIT

//! Run-scoped execution records
//!
//! Status changes only move forward: `pending -> running -> settled` for a
//! step and `created -> running -> terminal` for a run. Transition methods
//! return `false` and leave the record untouched when asked to move
//! backwards or out of a settled status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Record of one step within one run
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StepExecution {
    pub step_id: String,
    pub status: StepStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub input_data: Option<Value>,
    pub output_data: Option<Value>,
    pub error: Option<String>,
    pub retry_count: u32,
}

impl StepExecution {
    pub fn pending(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Pending,
            start_time: None,
            end_time: None,
            input_data: None,
            output_data: None,
            error: None,
            retry_count: 0,
        }
    }

    /// Record a launch with its prepared input
    pub fn start(&mut self, input: Value) -> bool {
        if self.status != StepStatus::Pending {
            return false;
        }
        self.status = StepStatus::Running;
        self.start_time = Some(Utc::now());
        self.input_data = Some(input);
        true
    }

    pub fn complete(&mut self, output: Value, retry_count: u32) -> bool {
        if !self.settle(StepStatus::Completed) {
            return false;
        }
        self.output_data = Some(output);
        self.retry_count = retry_count;
        true
    }

    pub fn fail(&mut self, error: impl Into<String>, retry_count: u32) -> bool {
        if !self.settle(StepStatus::Failed) {
            return false;
        }
        self.error = Some(error.into());
        self.retry_count = retry_count;
        true
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> bool {
        if !self.settle(StepStatus::Cancelled) {
            return false;
        }
        self.error = Some(reason.into());
        true
    }

    fn settle(&mut self, status: StepStatus) -> bool {
        if self.status != StepStatus::Running {
            return false;
        }
        self.status = status;
        self.end_time = Some(Utc::now());
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Record of one run of a workflow
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Shared state as of the last settlement
    pub state: Map<String, Value>,
    pub step_executions: BTreeMap<String, StepExecution>,
    pub error: Option<String>,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, state: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: WorkflowStatus::Created,
            start_time: None,
            end_time: None,
            state,
            step_executions: BTreeMap::new(),
            error: None,
        }
    }

    pub fn start(&mut self) -> bool {
        if self.status != WorkflowStatus::Created {
            return false;
        }
        self.status = WorkflowStatus::Running;
        self.start_time = Some(Utc::now());
        true
    }

    /// Move to a terminal status; only the first call has an effect
    pub fn finish(&mut self, status: WorkflowStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.end_time = Some(Utc::now());
        self.error = error;
        true
    }

    pub fn step(&self, step_id: &str) -> Option<&StepExecution> {
        self.step_executions.get(step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut StepExecution> {
        self.step_executions.get_mut(step_id)
    }

    pub fn status_of(&self, step_id: &str) -> Option<StepStatus> {
        self.step(step_id).map(|s| s.status)
    }

    pub fn is_completed(&self, step_id: &str) -> bool {
        self.status_of(step_id) == Some(StepStatus::Completed)
    }

    /// Output of a completed step
    pub fn output_of(&self, step_id: &str) -> Option<&Value> {
        self.step(step_id)
            .filter(|s| s.status == StepStatus::Completed)
            .and_then(|s| s.output_data.as_ref())
    }

    pub fn running_steps(&self) -> Vec<String> {
        self.step_executions
            .values()
            .filter(|s| s.status == StepStatus::Running)
            .map(|s| s.step_id.clone())
            .collect()
    }

    /// True when every recorded step completed
    pub fn all_completed(&self) -> bool {
        self.step_executions
            .values()
            .all(|s| s.status == StepStatus::Completed)
    }
}
