//! Messages exchanged between the orchestrator and its executors.
//!
//! Every task travels as one request and comes back as exactly one
//! reply; there is no streaming mid-task.

use crate::error::ExecutorError;
use crate::kernel::KernelOutput;
use crate::result::PartialResult;
use crate::run_queue::RunTask;
use crate::scenario::ScenarioConfig;

/// Everything an executor needs to run one task.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    /// Owned copy with the per-task seed already applied
    pub config: ScenarioConfig,
    pub iterations: u32,
    pub raid_id: String,
    pub raid_name: String,
    pub is_active_raid: bool,
    pub track_timeline: bool,
    pub do_stat_weights: bool,
}

impl StartRequest {
    pub fn for_task(scenario: &ScenarioConfig, task: &RunTask, track_timeline: bool) -> Self {
        Self {
            config: scenario.for_run(task.run_index, task.iteration_count),
            iterations: task.iteration_count,
            raid_id: scenario.raid_id.clone(),
            raid_name: scenario.raid_name.clone(),
            is_active_raid: scenario.is_active,
            track_timeline,
            do_stat_weights: scenario.is_active,
        }
    }

    /// Normalise kernel output into a partial result for this request.
    ///
    /// Single samples become one-iteration results. The iteration count
    /// must match what was requested, and fields the request did not ask
    /// for are dropped.
    pub fn accept(&self, slot: usize, output: KernelOutput) -> Result<PartialResult, ExecutorError> {
        let mut result = match output {
            KernelOutput::Single(sample) => PartialResult::from(sample),
            KernelOutput::Batch(result) => result,
        };

        if result.iteration_count != self.iterations {
            return Err(ExecutorError::InvalidResult {
                slot,
                raid_id: self.raid_id.clone(),
                reason: format!(
                    "expected {} iterations, kernel returned {}",
                    self.iterations, result.iteration_count
                ),
            });
        }
        if !result.dps.is_finite() {
            return Err(ExecutorError::InvalidResult {
                slot,
                raid_id: self.raid_id.clone(),
                reason: format!("non-finite dps {}", result.dps),
            });
        }

        if !self.do_stat_weights {
            result.stat_weights = None;
        }
        if !self.track_timeline {
            result.dps_timeline.clear();
        }

        Ok(result)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorRequest {
    Start(StartRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorReply {
    Success {
        raid_id: String,
        is_active_raid: bool,
        result: PartialResult,
    },
    Error(ExecutorError),
}

/// A reply tagged with the slot it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEvent {
    pub slot: usize,
    pub reply: ExecutorReply,
}
