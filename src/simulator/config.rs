//! Batch configuration and scenario file loading.

use crate::error::{ConfigError, ConstructionError};
use crate::scenario::ScenarioConfig;
use std::fs;
use std::path::Path;

/// Configuration for a batch of simulation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of concurrent executors
    pub thread_budget: usize,

    /// Iterations to simulate for every scenario
    pub iterations: u32,

    /// Whether executors return a dps-over-time series
    pub track_timeline: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            thread_budget: std::thread::available_parallelism().map_or(4, |n| n.get()),
            iterations: 1000,
            track_timeline: true,
        }
    }
}

impl BatchConfig {
    /// Small batch for a quick look at a scenario
    pub fn quick() -> Self {
        Self {
            iterations: 200,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConstructionError> {
        if self.thread_budget == 0 {
            return Err(ConstructionError::InvalidThreads("0".to_string()));
        }
        if self.iterations == 0 {
            return Err(ConstructionError::InvalidIterations("0".to_string()));
        }
        Ok(())
    }

    /// Build from untyped input, e.g. form fields or CLI arguments.
    ///
    /// Missing, non-numeric and non-positive values are rejected.
    pub fn from_raw(threads: Option<&str>, iterations: Option<&str>) -> Result<Self, ConstructionError> {
        let thread_budget = parse_positive(threads)
            .map_err(ConstructionError::InvalidThreads)?;
        let iterations = parse_positive(iterations)
            .map_err(ConstructionError::InvalidIterations)?;

        Ok(Self {
            thread_budget: usize::try_from(thread_budget)
                .map_err(|_| ConstructionError::InvalidThreads(thread_budget.to_string()))?,
            iterations: u32::try_from(iterations)
                .map_err(|_| ConstructionError::InvalidIterations(iterations.to_string()))?,
            ..Default::default()
        })
    }
}

fn parse_positive(raw: Option<&str>) -> Result<u64, String> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or("missing")?;
    match raw.parse::<i64>() {
        Ok(n) if n > 0 => Ok(n as u64),
        _ => Err(raw.to_string()),
    }
}

/// Load a JSON array of scenarios.
pub fn load_scenarios(path: &Path) -> Result<Vec<ScenarioConfig>, ConfigError> {
    let data = fs::read_to_string(path)?;
    let scenarios = serde_json::from_str(&data)?;
    Ok(scenarios)
}

/// Single active scenario with default kernel parameters.
pub fn default_scenarios(seed: u64) -> Vec<ScenarioConfig> {
    vec![ScenarioConfig::new("default", "Default raid")
        .active()
        .with_seed(seed)]
}
