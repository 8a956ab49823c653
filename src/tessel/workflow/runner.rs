// SPDX-License-Identifier: MIT

//! Workflow runner
//!
//! One scheduler task per run drives a `JoinSet` of step tasks. Each launch
//! takes a permit from a semaphore of `max_concurrent_steps`; the permit
//! travels with the step's result and is released only after the
//! scheduler has recorded the settlement, so the number of `running`
//! records never exceeds the bound.
//!
//! Every round the scheduler:
//! 1. honours cancellation (in-flight steps are marked cancelled, drained,
//!    and the run ends `cancelled`)
//! 2. launches ready steps while permits are available
//! 3. detects deadlock when nothing is ready or running but steps remain
//! 4. waits for the first step to settle and records the result
//!
//! A failed step aborts the run: no new launches, running siblings are
//! signalled, drained and recorded as cancelled.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use super::config::RunnerConfig;
use super::events::{EventKind, WorkflowEvent};
use super::execution::{StepExecution, StepStatus, WorkflowExecution, WorkflowStatus};
use super::graph::Workflow;
use super::state::{SharedState, WorkflowState};
use crate::sdk::error::{StepError, TesselError, WorkflowError};
use crate::sdk::step::{run_step, StepContext, StepOutcome};

/// Runs workflows and streams their lifecycle events
#[derive(Debug, Clone, Default)]
pub struct WorkflowRunner {
    config: RunnerConfig,
}

impl WorkflowRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Start a run in the background and return its event stream
    ///
    /// The stream ends after exactly one terminal event. Dropping the
    /// stream does not stop the run; cancel the token for that.
    pub fn run_stream(
        &self,
        workflow: Arc<Workflow>,
        initial_input: Value,
        cancel: CancellationToken,
    ) -> ReceiverStream<WorkflowEvent> {
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let run = Run::new(
            workflow,
            initial_input,
            cancel,
            self.config.max_concurrent_steps.max(1),
            tx,
        );
        tokio::spawn(run.drive());
        ReceiverStream::new(rx)
    }

    /// Run to completion and return the terminal execution
    ///
    /// Failed and cancelled runs come back as `TesselError::RunFailed` and
    /// `TesselError::RunCancelled`, both carrying the partial execution.
    pub async fn run(
        &self,
        workflow: Arc<Workflow>,
        initial_input: Value,
        cancel: CancellationToken,
    ) -> Result<WorkflowExecution, TesselError> {
        let mut events = self.run_stream(workflow, initial_input, cancel);

        while let Some(event) = events.next().await {
            match event.kind {
                EventKind::WorkflowCompleted { execution } => return Ok(*execution),
                EventKind::WorkflowFailed { execution, error } => {
                    return Err(TesselError::RunFailed {
                        message: error,
                        execution,
                    })
                }
                EventKind::WorkflowCancelled { execution, .. } => {
                    return Err(TesselError::RunCancelled { execution })
                }
                _ => {}
            }
        }

        Err(TesselError::other("Event stream closed before the run finished"))
    }
}

/// How the scheduling loop ended
enum Exit {
    /// Nothing left to run, or an end step completed
    Finished,
    Failed(String),
    Cancelled,
}

/// A step task's result together with the permit it ran under
struct Settlement {
    step_id: String,
    outcome: StepOutcome,
    _permit: OwnedSemaphorePermit,
}

/// State of one run, owned by its scheduler task
struct Run {
    workflow: Arc<Workflow>,
    initial_input: Value,
    execution: WorkflowExecution,
    state: SharedState,
    cancel: CancellationToken,
    steps_cancel: CancellationToken,
    permits: Arc<Semaphore>,
    tasks: JoinSet<Settlement>,
    events: mpsc::Sender<WorkflowEvent>,
}

impl Run {
    fn new(
        workflow: Arc<Workflow>,
        initial_input: Value,
        cancel: CancellationToken,
        max_concurrent_steps: usize,
        events: mpsc::Sender<WorkflowEvent>,
    ) -> Self {
        let mut seed = workflow.initial_state().clone();
        if let Value::Object(input) = &initial_input {
            seed.extend(input.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let state = WorkflowState::new(workflow.state_schema(), &seed);
        let execution = WorkflowExecution::new(&workflow.id, state.snapshot());

        Self {
            steps_cancel: cancel.child_token(),
            state: SharedState::new(state),
            permits: Arc::new(Semaphore::new(max_concurrent_steps)),
            tasks: JoinSet::new(),
            workflow,
            initial_input,
            execution,
            cancel,
            events,
        }
    }

    async fn drive(mut self) {
        let validation = self.workflow.validate();
        for warning in &validation.warnings {
            log::warn!("Workflow {}: {}", self.workflow.metadata.name, warning);
        }
        if !validation.is_valid {
            let error = WorkflowError::Invalid(validation.errors).to_string();
            log::error!("Workflow {} rejected: {}", self.workflow.metadata.name, error);
            self.execution
                .finish(WorkflowStatus::Failed, Some(error.clone()));
            let execution = Box::new(self.execution.clone());
            self.emit(EventKind::WorkflowFailed { execution, error })
                .await;
            return;
        }

        self.execution.start();
        log::info!(
            "Running workflow {} (execution {})",
            self.workflow.metadata.name,
            self.execution.id
        );
        self.emit(EventKind::WorkflowStarted {
            initial_input: self.initial_input.clone(),
        })
        .await;

        let exit = self.schedule().await;
        self.finalize(exit).await;
    }

    async fn schedule(&mut self) -> Exit {
        let mut end_reached = false;

        loop {
            if self.cancel.is_cancelled() {
                return self.cancel_in_flight().await;
            }

            if !end_reached {
                for step_id in self.workflow.get_ready_steps(&self.execution) {
                    let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                        break;
                    };
                    self.launch(step_id, permit).await;
                }
            }

            if self.tasks.is_empty() {
                if end_reached {
                    return Exit::Finished;
                }
                let stranded = self.workflow.stranded_steps(&self.execution);
                if stranded.is_empty() {
                    return Exit::Finished;
                }
                let error = WorkflowError::Stuck(stranded).to_string();
                log::error!("Workflow {}: {}", self.workflow.metadata.name, error);
                return Exit::Failed(error);
            }

            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => continue,
                joined = self.tasks.join_next() => joined,
            };
            let Some(joined) = joined else {
                continue;
            };

            match joined {
                Ok(settlement) => {
                    if let Some(exit) = self.settle(settlement).await {
                        return exit;
                    }
                }
                Err(e) => {
                    log::error!("Step task ended abnormally: {}", e);
                    return self.abort(format!("Step task ended abnormally: {}", e)).await;
                }
            }

            if !end_reached && self.end_step_completed() {
                log::info!(
                    "Workflow {} reached an end step, waiting for {} running step(s)",
                    self.workflow.metadata.name,
                    self.tasks.len()
                );
                end_reached = true;
            }
        }
    }

    async fn launch(&mut self, step_id: String, permit: OwnedSemaphorePermit) {
        let Some(step) = self.workflow.step(&step_id).cloned() else {
            return;
        };

        let input = self
            .workflow
            .prepare_input(&step_id, &self.execution, &self.initial_input);
        let mut record = StepExecution::pending(&step_id);
        record.start(input.clone());
        self.execution
            .step_executions
            .insert(step_id.clone(), record);

        log::info!("Starting step {}", step_id);
        self.emit(EventKind::StepStarted {
            step_id: step_id.clone(),
            input_data: input.clone(),
        })
        .await;

        let ctx = StepContext::new(
            self.workflow.id.clone(),
            self.execution.id.clone(),
            step_id.clone(),
            self.state.clone(),
            self.steps_cancel.child_token(),
        );
        self.tasks.spawn(async move {
            let outcome = run_step(step.as_ref(), input, &ctx).await;
            Settlement {
                step_id,
                outcome,
                _permit: permit,
            }
        });
    }

    /// Record a settled step; `Some` ends the run
    async fn settle(&mut self, settlement: Settlement) -> Option<Exit> {
        let Settlement {
            step_id, outcome, ..
        } = settlement;
        let retries = outcome.retry_count;

        match outcome.result {
            Ok(output) => {
                if let Some(record) = self.execution.step_mut(&step_id) {
                    record.complete(output.clone(), retries);
                }
                self.state
                    .update(&format!("{}_output", step_id), output.clone())
                    .await;
                self.execution.state = self.state.snapshot().await;

                log::info!("Step {} completed", step_id);
                self.emit(EventKind::StepCompleted {
                    step_id: step_id.clone(),
                    output_data: output.clone(),
                })
                .await;

                let workflow = Arc::clone(&self.workflow);
                for edge in workflow.outgoing_edges(&step_id) {
                    log::debug!("Edge {} -> {} activated", edge.from_step, edge.to_step);
                    self.emit(EventKind::EdgeActivated {
                        from_step: edge.from_step.clone(),
                        to_step: edge.to_step.clone(),
                        data: output.clone(),
                    })
                    .await;
                }
                None
            }
            Err(StepError::Cancelled) => {
                let error = StepError::Cancelled.to_string();
                if let Some(record) = self.execution.step_mut(&step_id) {
                    record.cancel(error.clone());
                }
                self.execution.state = self.state.snapshot().await;

                log::info!("Step {} cancelled", step_id);
                self.emit(EventKind::StepFailed { step_id, error }).await;
                None
            }
            Err(e) => {
                let error = e.to_string();
                if let Some(record) = self.execution.step_mut(&step_id) {
                    record.fail(error.clone(), retries);
                }
                self.execution.state = self.state.snapshot().await;

                log::error!("Step {} failed: {}", step_id, error);
                self.emit(EventKind::StepFailed {
                    step_id: step_id.clone(),
                    error: error.clone(),
                })
                .await;

                let reason = format!("Step '{}' failed: {}", step_id, error);
                Some(self.abort(reason).await)
            }
        }
    }

    /// Fail-fast: signal running siblings, wait for them, discard their results
    async fn abort(&mut self, reason: String) -> Exit {
        self.steps_cancel.cancel();
        while self.tasks.join_next().await.is_some() {}
        self.cancel_running("Cancelled after workflow failure").await;
        Exit::Failed(reason)
    }

    async fn cancel_in_flight(&mut self) -> Exit {
        log::info!(
            "Workflow {} cancelled with {} running step(s)",
            self.workflow.metadata.name,
            self.tasks.len()
        );
        self.steps_cancel.cancel();
        self.cancel_running("Workflow cancelled").await;
        while self.tasks.join_next().await.is_some() {}
        Exit::Cancelled
    }

    async fn cancel_running(&mut self, reason: &str) {
        for step_id in self.execution.running_steps() {
            if let Some(record) = self.execution.step_mut(&step_id) {
                record.cancel(reason);
            }
            self.emit(EventKind::StepFailed {
                step_id,
                error: reason.to_string(),
            })
            .await;
        }
    }

    fn end_step_completed(&self) -> bool {
        self.workflow
            .end_step_ids()
            .iter()
            .any(|id| self.execution.is_completed(id))
    }

    async fn finalize(mut self, exit: Exit) {
        self.execution.state = self.state.snapshot().await;

        let (status, error) = match exit {
            Exit::Finished if self.execution.all_completed() => (WorkflowStatus::Completed, None),
            Exit::Finished => (
                WorkflowStatus::Failed,
                Some(incomplete_summary(&self.execution)),
            ),
            Exit::Failed(error) => (WorkflowStatus::Failed, Some(error)),
            Exit::Cancelled => (
                WorkflowStatus::Cancelled,
                Some("Workflow cancelled".to_string()),
            ),
        };
        self.execution.finish(status, error.clone());

        log::info!(
            "Workflow {} finished with status {:?}",
            self.workflow.metadata.name,
            status
        );

        let execution = Box::new(self.execution.clone());
        let error = error.unwrap_or_default();
        let kind = match status {
            WorkflowStatus::Completed => EventKind::WorkflowCompleted { execution },
            WorkflowStatus::Cancelled => EventKind::WorkflowCancelled { execution, error },
            _ => EventKind::WorkflowFailed { execution, error },
        };
        self.emit(kind).await;
    }

    async fn emit(&self, kind: EventKind) {
        let event = WorkflowEvent::new(self.workflow.id.clone(), kind);
        // A closed channel only means nobody is listening
        let _ = self.events.send(event).await;
    }
}

fn incomplete_summary(execution: &WorkflowExecution) -> String {
    let unfinished: Vec<String> = execution
        .step_executions
        .values()
        .filter(|s| s.status != StepStatus::Completed)
        .map(|s| format!("{} ({})", s.step_id, s.status.as_str()))
        .collect();
    format!("Steps did not complete: {}", unfinished.join(", "))
}
