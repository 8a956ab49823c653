// SPDX-License-Identifier: MIT

pub mod server;
pub mod steps;
pub mod workflow;
