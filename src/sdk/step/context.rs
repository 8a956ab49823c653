// SPDX-License-Identifier: MIT

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::tessel::workflow::state::SharedState;

/// Handle given to a step for one invocation
///
/// The state handle points at the live run state, so writes are visible to
/// steps scheduled later in the same run.
#[derive(Clone)]
pub struct StepContext {
    workflow_id: String,
    execution_id: String,
    step_id: String,
    state: SharedState,
    cancel: CancellationToken,
}

impl StepContext {
    pub fn new(
        workflow_id: impl Into<String>,
        execution_id: impl Into<String>,
        step_id: impl Into<String>,
        state: SharedState,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: execution_id.into(),
            step_id: step_id.into(),
            state,
            cancel,
        }
    }

    /// A context outside of any run, with empty state
    pub fn detached(step_id: impl Into<String>) -> Self {
        Self::new(
            "detached",
            "detached",
            step_id,
            SharedState::default(),
            CancellationToken::new(),
        )
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Read a state value by dot path
    pub async fn get_state(&self, path: &str) -> Option<Value> {
        self.state.get_path(path).await
    }

    /// Write a state value through the key's reducer
    pub async fn set_state(&self, key: &str, value: Value) {
        self.state.update(key, value).await
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run asks its steps to stop
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
