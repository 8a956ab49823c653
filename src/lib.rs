// SPDX-License-Identifier: MIT

//! tessel-rs: a typed workflow execution engine
//!
//! - `sdk` holds the step contract, schemas and error types
//! - `tessel` holds the workflow graph, the runner, built-in steps and the HTTP surface

pub mod sdk;
pub mod tessel;
