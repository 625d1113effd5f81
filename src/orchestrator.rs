//! Batch orchestration: one control loop that owns the run queue, the
//! worker pool and the per-scenario aggregates.
//!
//! All orchestrator state is touched from a single thread. Executors only
//! ever see owned request values and only ever send back owned replies, so
//! one completion is fully merged and re-dispatched before the next one is
//! read off the event channel.
//!
//! There are no timeouts: an executor that never replies stalls the batch.

use crate::aggregate::{FinalResult, Progress, ResultAggregator};
use crate::error::{BatchError, ConstructionError, ExecutorError};
use crate::kernel::SimulationKernel;
use crate::messages::{ExecutorReply, PoolEvent, StartRequest};
use crate::pool::WorkerPool;
use crate::run_queue::{RunQueue, RunTask};
use crate::scenario::{validate_batch, ScenarioConfig};
use crate::simulator::BatchConfig;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

pub type SuccessCallback = Box<dyn FnOnce(FinalResult) + Send>;
pub type ErrorCallback = Box<dyn FnOnce(BatchError) + Send>;
pub type ProgressCallback = Box<dyn FnMut(Progress) + Send>;

/// Outcome callbacks. Exactly one of `on_success` / `on_error` fires.
pub struct BatchCallbacks {
    on_success: SuccessCallback,
    on_error: ErrorCallback,
    on_progress: Option<ProgressCallback>,
}

impl BatchCallbacks {
    pub fn new(
        on_success: impl FnOnce(FinalResult) + Send + 'static,
        on_error: impl FnOnce(BatchError) + Send + 'static,
    ) -> Self {
        Self {
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: impl FnMut(Progress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(on_progress));
        self
    }
}

/// State of a started batch. Before `start` the batch is just an
/// [`Orchestrator`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Running,
    Completed,
    Failed,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Failed)
    }
}

/// What the control loop saw, returned by [`BatchHandle::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub state: BatchState,
    pub slots: usize,
    pub slots_terminated: usize,
    pub tasks: usize,
    pub tasks_started: usize,
}

impl BatchSummary {
    fn failed() -> Self {
        Self {
            state: BatchState::Failed,
            slots: 0,
            slots_terminated: 0,
            tasks: 0,
            tasks_started: 0,
        }
    }
}

/// A validated batch, ready to start.
pub struct Orchestrator {
    config: BatchConfig,
    scenarios: Vec<ScenarioConfig>,
    kernel: Arc<dyn SimulationKernel>,
    callbacks: BatchCallbacks,
}

impl Orchestrator {
    pub fn new(
        config: BatchConfig,
        scenarios: Vec<ScenarioConfig>,
        kernel: Arc<dyn SimulationKernel>,
        callbacks: BatchCallbacks,
    ) -> Result<Self, ConstructionError> {
        config.validate()?;
        validate_batch(&scenarios)?;

        Ok(Self {
            config,
            scenarios,
            kernel,
            callbacks,
        })
    }

    /// Start the batch on a background control thread and return at once.
    ///
    /// Consumes the orchestrator, so a batch can only be started once.
    pub fn start(self) -> BatchHandle {
        let (state_tx, state_rx) = watch::channel(BatchState::Running);

        // The batch is handed over after the spawn so a failed spawn
        // still owns the callbacks
        let (launch_tx, launch_rx) = oneshot::channel::<(Orchestrator, watch::Sender<BatchState>)>();
        let thread = thread::Builder::new()
            .name("raidsim-orchestrator".to_string())
            .spawn(move || match launch_rx.blocking_recv() {
                Ok((orchestrator, state)) => orchestrator.run(state),
                Err(_) => BatchSummary::failed(),
            });

        match thread {
            Ok(thread) => match launch_tx.send((self, state_tx)) {
                Ok(()) => BatchHandle {
                    thread: Some(thread),
                    state: state_rx,
                },
                Err((orchestrator, _)) => {
                    orchestrator.abort_start("control thread exited before the batch started".to_string())
                }
            },
            Err(e) => self.abort_start(e.to_string()),
        }
    }

    /// Fail a batch that never got a control thread.
    fn abort_start(self, message: String) -> BatchHandle {
        error!(error = %message, "failed to start orchestrator thread");
        (self.callbacks.on_error)(BatchError::ControlThread(message));
        let (_, state) = watch::channel(BatchState::Failed);
        BatchHandle {
            thread: None,
            state,
        }
    }

    fn run(self, state: watch::Sender<BatchState>) -> BatchSummary {
        let started_at = Instant::now();
        let queue = RunQueue::build(
            self.config.iterations,
            self.config.thread_budget,
            self.scenarios.len(),
        );
        info!(
            scenarios = self.scenarios.len(),
            iterations = self.config.iterations,
            chunk_size = queue.chunk_size,
            workers = queue.worker_count,
            tasks = queue.tasks.len(),
            "starting batch"
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(queue.worker_count, Arc::clone(&self.kernel), events_tx);

        let mut batch = Batch {
            aggregator: ResultAggregator::new(&self.scenarios, self.config.iterations),
            track_timeline: self.config.track_timeline,
            scenarios: self.scenarios,
            queue,
            pool: None,
            callbacks: self.callbacks,
            started_at,
            state,
        };

        match pool {
            Ok(pool) => {
                batch.pool = Some(pool);
                batch.drive(events_rx)
            }
            Err(e) => batch.fail(e.into()),
        }
    }
}

/// Handle to a running batch.
pub struct BatchHandle {
    thread: Option<JoinHandle<BatchSummary>>,
    state: watch::Receiver<BatchState>,
}

impl BatchHandle {
    pub fn state(&self) -> BatchState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wait asynchronously for the batch to reach a terminal state.
    pub async fn finished(&mut self) -> BatchState {
        match self.state.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            // Sender dropped without a terminal state: the control thread died
            Err(_) => BatchState::Failed,
        }
    }

    /// Block until the control loop exits.
    pub fn join(mut self) -> BatchSummary {
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| BatchSummary::failed()),
            None => BatchSummary::failed(),
        }
    }
}

/// Control-loop state for a running batch.
struct Batch {
    scenarios: Vec<ScenarioConfig>,
    queue: RunQueue,
    aggregator: ResultAggregator,
    pool: Option<WorkerPool>,
    callbacks: BatchCallbacks,
    track_timeline: bool,
    started_at: Instant,
    state: watch::Sender<BatchState>,
}

impl Batch {
    fn drive(mut self, mut events: mpsc::UnboundedReceiver<PoolEvent>) -> BatchSummary {
        // One task per executor, in creation order
        let slots = self.pool.as_ref().map_or(0, WorkerPool::len);
        for slot in 0..slots {
            if let Err(e) = self.dispatch_next(slot) {
                return self.fail(e.into());
            }
        }

        loop {
            let Some(PoolEvent { slot, reply }) = events.blocking_recv() else {
                return self.fail(ExecutorError::PoolClosed.into());
            };
            if let Some(pool) = self.pool.as_mut() {
                pool.mark_idle(slot);
            }

            let (raid_id, result) = match reply {
                ExecutorReply::Success { raid_id, result, .. } => (raid_id, result),
                ExecutorReply::Error(e) => return self.fail(e.into()),
            };

            let merged = match self.aggregator.merge(&raid_id, &result) {
                Ok(merged) => merged.iteration_count,
                Err(violation) => return self.fail(violation.into()),
            };
            debug!(
                slot,
                raid_id = %raid_id,
                iterations = result.iteration_count,
                merged,
                "merged partial result"
            );

            let progress = self.aggregator.progress();
            if let Some(on_progress) = self.callbacks.on_progress.as_mut() {
                on_progress(progress);
            }

            if self.aggregator.is_complete() {
                return self.complete();
            }

            if let Err(e) = self.dispatch_next(slot) {
                return self.fail(e.into());
            }
        }
    }

    /// Give `slot` the next unclaimed task, or release it if none remain.
    fn dispatch_next(&mut self, slot: usize) -> Result<(), ExecutorError> {
        let Some(pool) = self.pool.as_mut() else {
            return Ok(());
        };

        match self.queue.claim_next() {
            Some(task) => {
                let request = request_for(&self.scenarios, &task, self.track_timeline);
                pool.dispatch(slot, request)
            }
            None => {
                debug!(slot, "queue exhausted, releasing executor");
                pool.terminate(slot);
                Ok(())
            }
        }
    }

    fn summary(&self, state: BatchState) -> BatchSummary {
        let (slots, slots_terminated) = self
            .pool
            .as_ref()
            .map_or((0, 0), |p| (p.len(), p.terminated_count()));
        BatchSummary {
            state,
            slots,
            slots_terminated,
            tasks: self.queue.tasks.len(),
            tasks_started: self.queue.tasks.len() - self.queue.remaining(),
        }
    }

    fn complete(mut self) -> BatchSummary {
        if let Some(pool) = self.pool.as_mut() {
            pool.terminate_all();
        }
        let summary = self.summary(BatchState::Completed);

        let elapsed = self.started_at.elapsed();
        info!(
            seconds = elapsed.as_secs_f64(),
            iterations = self.aggregator.merged_iterations(),
            "batch completed"
        );
        let final_result = self.aggregator.compile(elapsed);
        (self.callbacks.on_success)(final_result);
        self.state.send_replace(BatchState::Completed);

        summary
    }

    fn fail(mut self, err: BatchError) -> BatchSummary {
        if let Some(pool) = self.pool.as_mut() {
            pool.terminate_all();
        }
        let summary = self.summary(BatchState::Failed);

        error!(error = %err, "batch failed");
        (self.callbacks.on_error)(err);
        self.state.send_replace(BatchState::Failed);

        summary
    }
}

fn request_for(scenarios: &[ScenarioConfig], task: &RunTask, track_timeline: bool) -> StartRequest {
    StartRequest::for_task(&scenarios[task.scenario], task, track_timeline)
}
