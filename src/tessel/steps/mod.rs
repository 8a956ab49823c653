// SPDX-License-Identifier: MIT

//! Built-in steps
//!
//! Registered under their `kind` by `StepRegistry::with_builtins`.

mod delay;
mod passthrough;
mod set_state;

pub use delay::{DelayStep, KIND as DELAY_KIND};
pub use passthrough::{PassthroughStep, KIND as PASSTHROUGH_KIND};
pub use set_state::{SetStateStep, KIND as SET_STATE_KIND};
