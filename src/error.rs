//! Error taxonomy for batch construction, execution and merging.

use thiserror::Error;

/// Raised synchronously before any executor starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("invalid threads: {0}")]
    InvalidThreads(String),
    #[error("invalid iterations: {0}")]
    InvalidIterations(String),
    #[error("batch has no scenarios")]
    NoScenarios,
    #[error("{count} scenarios are marked active, expected exactly one")]
    MultipleActive { count: usize },
    #[error("duplicate raid id {0:?}")]
    DuplicateRaidId(String),
}

/// An executor failed while running a task. Fatal to the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("kernel failed in slot {slot} for raid {raid_id}: {message}")]
    Kernel {
        slot: usize,
        raid_id: String,
        message: String,
    },
    #[error("kernel panicked in slot {slot} for raid {raid_id}: {message}")]
    Panicked {
        slot: usize,
        raid_id: String,
        message: String,
    },
    #[error("executor channel for slot {slot} closed unexpectedly")]
    Disconnected { slot: usize },
    #[error("all executor channels closed before the batch completed")]
    PoolClosed,
    #[error("failed to spawn executor for slot {slot}: {message}")]
    Spawn { slot: usize, message: String },
    #[error("invalid result from slot {slot} for raid {raid_id}: {reason}")]
    InvalidResult {
        slot: usize,
        raid_id: String,
        reason: String,
    },
}

/// A partial result broke an aggregation invariant. Indicates an
/// unstable scenario configuration upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeContractViolation {
    #[error("raid {raid_id}: per-agent length changed from {expected} to {got}")]
    AgentCountMismatch {
        raid_id: String,
        expected: usize,
        got: usize,
    },
    #[error("raid {raid_id}: merged iterations {merged} exceed target {target}")]
    IterationOverflow {
        raid_id: String,
        target: u32,
        merged: u32,
    },
    #[error("raid {raid_id}: partial result carries zero iterations")]
    ZeroIterations { raid_id: String },
    #[error("raid {raid_id} is not part of this batch")]
    UnknownRaid { raid_id: String },
}

/// The single payload handed to the error callback of a failed batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Merge(#[from] MergeContractViolation),
    #[error("failed to start the batch control thread: {0}")]
    ControlThread(String),
}

/// Outcome of a blocking batch run that did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("batch ended without reporting an outcome")]
    NoOutcome,
}

/// Scenario file loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse scenario file: {0}")]
    Json(#[from] serde_json::Error),
}
