// SPDX-License-Identifier: MIT

//! Workflow graph
//!
//! This module provides the `Workflow` graph model, its structural
//! validator, and the readiness rules the runner schedules by.

mod model;
mod ready;
mod validator;

pub use model::{Edge, Workflow, WorkflowMetadata};
pub use validator::ValidationResult;
