// SPDX-License-Identifier: MIT

//! Edge conditions
//!
//! An edge is active when its condition holds. Conditions are a single
//! field/operator/value comparison against either the source step's output
//! or the run's shared state:
//! - `always` - no comparison, always active
//! - `output_based` - `status == "ok"` evaluated on the upstream output
//! - `state_based` - `priority in ["high", "urgent"]` evaluated on shared state

mod ast;
mod evaluator;

pub use ast::{ConditionType, EdgeCondition, Operator};
pub use evaluator::evaluate;
