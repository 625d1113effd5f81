//! Raidsim - Monte Carlo batch orchestration for combat simulations.
//!
//! Splits a batch of trials into bounded chunks, runs them on a fixed pool
//! of executor threads and merges the partial results incrementally, for
//! one or several scenarios compared side by side.

pub mod aggregate;
pub mod constants;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod messages;
pub mod orchestrator;
pub mod pool;
pub mod result;
pub mod run_queue;
pub mod scenario;
pub mod simulator;

pub use aggregate::{ComparisonEntry, FinalResult, Progress, ResultAggregator};
pub use error::{BatchError, ConstructionError, ExecutorError, MergeContractViolation, RunError};
pub use kernel::{KernelError, KernelOutput, SimulationKernel, SyntheticKernel};
pub use orchestrator::{BatchCallbacks, BatchHandle, BatchState, BatchSummary, Orchestrator};
pub use result::{AgentResult, AggregatedResult, PartialResult, Sample, StatWeights};
pub use run_queue::{RunQueue, RunTask};
pub use scenario::ScenarioConfig;
pub use simulator::BatchConfig;
