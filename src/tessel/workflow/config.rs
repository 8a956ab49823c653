// SPDX-License-Identifier: MIT

//! Runner configuration

use std::env;

use crate::sdk::error::TesselError;

pub const DEFAULT_MAX_CONCURRENT_STEPS: usize = 10;
pub const DEFAULT_EVENT_BUFFER: usize = 100;

const ENV_MAX_CONCURRENT_STEPS: &str = "TESSEL_MAX_CONCURRENT_STEPS";
const ENV_EVENT_BUFFER: &str = "TESSEL_EVENT_BUFFER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Upper bound on steps running at the same time
    pub max_concurrent_steps: usize,
    /// Capacity of the event channel behind `run_stream`
    pub event_buffer: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_steps: DEFAULT_MAX_CONCURRENT_STEPS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl RunnerConfig {
    pub fn with_max_concurrent_steps(mut self, max: usize) -> Self {
        self.max_concurrent_steps = max;
        self
    }

    /// Defaults overridden by `TESSEL_*` environment variables
    pub fn from_env() -> Result<Self, TesselError> {
        let defaults = Self::default();
        Ok(Self {
            max_concurrent_steps: read_positive(
                ENV_MAX_CONCURRENT_STEPS,
                defaults.max_concurrent_steps,
            )?,
            event_buffer: read_positive(ENV_EVENT_BUFFER, defaults.event_buffer)?,
        })
    }
}

fn read_positive(key: &str, default: usize) -> Result<usize, TesselError> {
    match env::var(key) {
        Ok(raw) => parse_positive(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize, TesselError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(TesselError::config(format!(
            "{} must be a positive integer, got '{}'",
            key, raw
        ))),
    }
}
