//! Splits a batch into bounded-size run tasks.

use crate::constants::{MAX_CHUNK_ITERATIONS, MIN_CHUNK_ITERATIONS};

/// A bounded slice of one scenario's requested iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTask {
    /// Index of the owning scenario in the batch's scenario list
    pub scenario: usize,
    pub iteration_count: u32,
    /// Ordinal within the owning scenario
    pub run_index: u32,
    pub started: bool,
}

/// Ordered task list for a batch plus the derived pool size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunQueue {
    pub chunk_size: u32,
    pub worker_count: usize,
    pub chunks_per_scenario: u32,
    pub tasks: Vec<RunTask>,
}

/// Iterations per chunk: `clamp(ceil(I/T), 50, 200)`, never more than `I`.
pub fn chunk_size(iterations: u32, thread_budget: usize) -> u32 {
    let threads = u32::try_from(thread_budget.max(1)).unwrap_or(u32::MAX);
    let per_thread = iterations.div_ceil(threads);
    per_thread
        .clamp(MIN_CHUNK_ITERATIONS, MAX_CHUNK_ITERATIONS)
        .min(iterations)
        .max(1)
}

impl RunQueue {
    /// Build the task list, scenario-major with ascending run indices.
    pub fn build(iterations: u32, thread_budget: usize, scenario_count: usize) -> Self {
        let chunk_size = chunk_size(iterations, thread_budget);
        let chunks_per_scenario = iterations.div_ceil(chunk_size);
        let worker_count = thread_budget.min(chunks_per_scenario as usize);

        let mut tasks = Vec::with_capacity(scenario_count * chunks_per_scenario as usize);
        for scenario in 0..scenario_count {
            let mut remaining = iterations;
            for run_index in 0..chunks_per_scenario {
                let iteration_count = chunk_size.min(remaining);
                remaining -= iteration_count;
                tasks.push(RunTask {
                    scenario,
                    iteration_count,
                    run_index,
                    started: false,
                });
            }
        }

        Self {
            chunk_size,
            worker_count,
            chunks_per_scenario,
            tasks,
        }
    }

    /// Claim the first task not yet started, in creation order.
    pub fn claim_next(&mut self) -> Option<RunTask> {
        let task = self.tasks.iter_mut().find(|t| !t.started)?;
        task.started = true;
        Some(*task)
    }

    pub fn remaining(&self) -> usize {
        self.tasks.iter().filter(|t| !t.started).count()
    }
}
