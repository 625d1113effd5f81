//! Blocking batch runner built on the orchestrator callbacks.

use super::config::BatchConfig;
use crate::aggregate::{FinalResult, Progress};
use crate::error::RunError;
use crate::kernel::SimulationKernel;
use crate::orchestrator::{BatchCallbacks, Orchestrator};
use crate::scenario::ScenarioConfig;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Run a batch to completion on the calling thread.
///
/// Must not be called from inside an async runtime.
pub fn run_batch(
    config: &BatchConfig,
    scenarios: Vec<ScenarioConfig>,
    kernel: Arc<dyn SimulationKernel>,
    on_progress: impl FnMut(Progress) + Send + 'static,
) -> Result<FinalResult, RunError> {
    // Exactly one of the two callbacks fires
    let (tx, mut rx) = mpsc::unbounded_channel::<Result<FinalResult, RunError>>();
    let err_tx = tx.clone();

    let callbacks = BatchCallbacks::new(
        move |result| {
            let _ = tx.send(Ok(result));
        },
        move |err| {
            let _ = err_tx.send(Err(err.into()));
        },
    )
    .with_progress(on_progress);

    let orchestrator = Orchestrator::new(config.clone(), scenarios, kernel, callbacks)?;
    let handle = orchestrator.start();
    let outcome = rx.blocking_recv().ok_or(RunError::NoOutcome)?;
    handle.join();
    outcome
}
