// SPDX-License-Identifier: MIT

//! Step development kit
//!
//! Everything a step author needs: the `Step` trait, the execution
//! harness, structural schemas and the crate's error types.

pub mod error;
pub mod schema;
pub mod step;
