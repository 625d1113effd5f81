//! Scenario ("raid") configuration as seen by the orchestrator.
//!
//! The simulation parameters themselves are opaque to this crate and are
//! carried verbatim in `params` for the kernel to interpret.

use crate::error::ConstructionError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

fn new_raid_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One configuration to simulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Unique key of the scenario within a batch
    #[serde(default = "new_raid_id")]
    pub raid_id: String,

    #[serde(default)]
    pub raid_name: String,

    /// The scenario whose aggregate becomes the top-level result
    #[serde(default)]
    pub is_active: bool,

    #[serde(default)]
    pub rng_seed: u64,

    /// Kernel parameters, passed through untouched
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ScenarioConfig {
    pub fn new(raid_id: impl Into<String>, raid_name: impl Into<String>) -> Self {
        Self {
            raid_id: raid_id.into(),
            raid_name: raid_name.into(),
            is_active: false,
            rng_seed: 0,
            params: serde_json::Value::Null,
        }
    }

    pub fn active(mut self) -> Self {
        self.is_active = true;
        self
    }

    pub fn with_seed(mut self, rng_seed: u64) -> Self {
        self.rng_seed = rng_seed;
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Seed for one run task: `rng_seed + run_index * iterations`.
    ///
    /// `iterations` is the task's own chunk size, so a short final chunk
    /// can start inside the stream of an earlier chunk.
    pub fn derive_seed(&self, run_index: u32, iterations: u32) -> u64 {
        self.rng_seed
            .wrapping_add(u64::from(run_index).wrapping_mul(u64::from(iterations)))
    }

    /// Owned copy handed to an executor, carrying the derived seed.
    pub fn for_run(&self, run_index: u32, iterations: u32) -> Self {
        let mut config = self.clone();
        config.rng_seed = self.derive_seed(run_index, iterations);
        config
    }
}

/// Check the orchestrator-visible invariants of a scenario list.
///
/// A batch with no active scenario is accepted with a warning; the first
/// scenario then stands in for the active one when results are compiled.
pub fn validate_batch(scenarios: &[ScenarioConfig]) -> Result<(), ConstructionError> {
    if scenarios.is_empty() {
        return Err(ConstructionError::NoScenarios);
    }

    let mut seen = HashSet::with_capacity(scenarios.len());
    for scenario in scenarios {
        if !seen.insert(scenario.raid_id.as_str()) {
            return Err(ConstructionError::DuplicateRaidId(scenario.raid_id.clone()));
        }
    }

    let active = scenarios.iter().filter(|s| s.is_active).count();
    if active > 1 {
        return Err(ConstructionError::MultipleActive { count: active });
    }
    if active == 0 {
        warn!(
            scenarios = scenarios.len(),
            "no active scenario in batch, falling back to the first"
        );
    }

    Ok(())
}
