// SPDX-License-Identifier: MIT

pub mod builder;
pub mod condition;
pub mod config;
pub mod events;
pub mod execution;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod runner;
pub mod state;
pub mod types;
