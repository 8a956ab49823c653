// SPDX-License-Identifier: MIT

//! Shared run state
//!
//! This module provides:
//! - `StateSchema` - optional per-key reducers and defaults
//! - `WorkflowState` - state values with reducer-aware writes
//! - `SharedState` - the guarded handle steps and the runner write through

mod schema;
mod store;

pub use schema::{ReducerType, StateFieldDef, StateSchema};
pub use store::{lookup_path, SharedState, WorkflowState};
