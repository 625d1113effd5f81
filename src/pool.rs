//! Fixed-size pool of executor threads.
//!
//! Each slot owns one OS thread that runs one task at a time. Requests go
//! in over a per-slot channel and every reply comes back, tagged with its
//! slot, on a single shared event channel.

use crate::error::ExecutorError;
use crate::kernel::SimulationKernel;
use crate::messages::{ExecutorReply, ExecutorRequest, PoolEvent, StartRequest};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, warn};

struct Slot {
    requests: Option<mpsc::UnboundedSender<ExecutorRequest>>,
    handle: Option<JoinHandle<()>>,
    busy: bool,
}

pub struct WorkerPool {
    slots: Vec<Slot>,
}

impl WorkerPool {
    /// Start `size` executors that report into `events`.
    ///
    /// The pool keeps no copy of `events`, so the receiver sees the
    /// channel close once every executor has exited.
    pub fn spawn(
        size: usize,
        kernel: Arc<dyn SimulationKernel>,
        events: mpsc::UnboundedSender<PoolEvent>,
    ) -> Result<Self, ExecutorError> {
        let mut pool = Self {
            slots: Vec::with_capacity(size),
        };

        for slot in 0..size {
            let (tx, rx) = mpsc::unbounded_channel();
            let kernel = Arc::clone(&kernel);
            let events = events.clone();
            let handle = thread::Builder::new()
                .name(format!("raidsim-executor-{}", slot))
                .spawn(move || executor_loop(slot, kernel, rx, events))
                .map_err(|e| ExecutorError::Spawn {
                    slot,
                    message: e.to_string(),
                })?;

            pool.slots.push(Slot {
                requests: Some(tx),
                handle: Some(handle),
                busy: false,
            });
        }

        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Hand one task to the executor in `slot`.
    pub fn dispatch(&mut self, slot: usize, request: StartRequest) -> Result<(), ExecutorError> {
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(ExecutorError::Disconnected { slot })?;
        let sender = entry
            .requests
            .as_ref()
            .ok_or(ExecutorError::Disconnected { slot })?;

        debug!(
            slot,
            raid_id = %request.raid_id,
            iterations = request.iterations,
            seed = request.config.rng_seed,
            "dispatch"
        );
        sender
            .send(ExecutorRequest::Start(request))
            .map_err(|_| ExecutorError::Disconnected { slot })?;
        entry.busy = true;
        Ok(())
    }

    /// Record that `slot` has replied and is idle again.
    pub fn mark_idle(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            entry.busy = false;
        }
    }

    /// Release the executor in `slot`. Idempotent.
    ///
    /// An idle executor is joined. A busy one is detached: it finishes its
    /// current task, finds nobody listening and exits.
    pub fn terminate(&mut self, slot: usize) {
        let Some(entry) = self.slots.get_mut(slot) else {
            return;
        };
        if entry.requests.take().is_none() {
            return;
        }

        match entry.handle.take() {
            Some(handle) if !entry.busy => {
                if handle.join().is_err() {
                    warn!(slot, "executor thread panicked during shutdown");
                }
                debug!(slot, "executor terminated");
            }
            Some(_) => debug!(slot, "executor detached while busy"),
            None => {}
        }
    }

    pub fn terminate_all(&mut self) {
        for slot in 0..self.slots.len() {
            self.terminate(slot);
        }
    }

    pub fn is_terminated(&self, slot: usize) -> bool {
        self.slots.get(slot).map_or(true, |s| s.requests.is_none())
    }

    pub fn terminated_count(&self) -> usize {
        self.slots.iter().filter(|s| s.requests.is_none()).count()
    }

    pub fn all_terminated(&self) -> bool {
        self.terminated_count() == self.slots.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

fn executor_loop(
    slot: usize,
    kernel: Arc<dyn SimulationKernel>,
    mut requests: mpsc::UnboundedReceiver<ExecutorRequest>,
    events: mpsc::UnboundedSender<PoolEvent>,
) {
    while let Some(request) = requests.blocking_recv() {
        let ExecutorRequest::Start(start) = request;
        let reply = execute(slot, kernel.as_ref(), &start);
        if events.send(PoolEvent { slot, reply }).is_err() {
            // Orchestrator is gone
            break;
        }
    }
}

fn execute(slot: usize, kernel: &dyn SimulationKernel, start: &StartRequest) -> ExecutorReply {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        kernel.run(&start.config, start.iterations)
    }));

    let raid_id = start.raid_id.clone();
    match outcome {
        Ok(Ok(output)) => match start.accept(slot, output) {
            Ok(result) => ExecutorReply::Success {
                raid_id,
                is_active_raid: start.is_active_raid,
                result,
            },
            Err(e) => ExecutorReply::Error(e),
        },
        Ok(Err(e)) => ExecutorReply::Error(ExecutorError::Kernel {
            slot,
            raid_id,
            message: e.to_string(),
        }),
        Err(payload) => ExecutorReply::Error(ExecutorError::Panicked {
            slot,
            raid_id,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelError, KernelOutput, SyntheticKernel};
    use crate::result::PartialResult;
    use crate::run_queue::RunTask;
    use crate::scenario::ScenarioConfig;

    fn request(raid_id: &str, iterations: u32) -> StartRequest {
        let scenario = ScenarioConfig::new(raid_id, raid_id).active().with_seed(9);
        let task = RunTask {
            scenario: 0,
            iteration_count: iterations,
            run_index: 0,
            started: true,
        };
        StartRequest::for_task(&scenario, &task, true)
    }

    #[test]
    fn test_dispatch_and_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::spawn(2, Arc::new(SyntheticKernel), tx).unwrap();
        assert_eq!(pool.len(), 2);

        pool.dispatch(1, request("r", 60)).unwrap();
        let event = rx.blocking_recv().unwrap();
        assert_eq!(event.slot, 1);
        match event.reply {
            ExecutorReply::Success { raid_id, result, .. } => {
                assert_eq!(raid_id, "r");
                assert_eq!(result.iteration_count, 60);
            }
            ExecutorReply::Error(e) => panic!("unexpected error {e}"),
        }

        pool.mark_idle(1);
        pool.terminate_all();
        assert!(pool.all_terminated());
        // Every executor has exited, so the event channel is closed
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::spawn(3, Arc::new(SyntheticKernel), tx).unwrap();
        pool.terminate(1);
        pool.terminate(1);
        assert!(pool.is_terminated(1));
        assert!(!pool.is_terminated(0));
        assert_eq!(pool.terminated_count(), 1);
        assert!(matches!(
            pool.dispatch(1, request("r", 2)),
            Err(ExecutorError::Disconnected { slot: 1 })
        ));
    }

    #[test]
    fn test_kernel_error_is_reported() {
        let kernel = |_: &ScenarioConfig, _: u32| -> Result<KernelOutput, KernelError> {
            Err(KernelError("boom".to_string()))
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::spawn(1, Arc::new(kernel), tx).unwrap();
        pool.dispatch(0, request("r", 5)).unwrap();
        let event = rx.blocking_recv().unwrap();
        assert_eq!(
            event.reply,
            ExecutorReply::Error(ExecutorError::Kernel {
                slot: 0,
                raid_id: "r".to_string(),
                message: "boom".to_string(),
            })
        );
    }

    #[test]
    fn test_kernel_panic_is_caught() {
        let kernel = |_: &ScenarioConfig, _: u32| -> Result<KernelOutput, KernelError> {
            panic!("kernel exploded")
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::spawn(1, Arc::new(kernel), tx).unwrap();
        pool.dispatch(0, request("r", 5)).unwrap();
        match rx.blocking_recv().unwrap().reply {
            ExecutorReply::Error(ExecutorError::Panicked { message, .. }) => {
                assert_eq!(message, "kernel exploded");
            }
            other => panic!("unexpected reply {other:?}"),
        }

        // The executor survives and takes the next task
        pool.mark_idle(0);
        pool.dispatch(0, request("r", 5)).unwrap();
        assert!(rx.blocking_recv().is_some());
    }

    #[test]
    fn test_wrong_iteration_count_is_invalid() {
        let kernel = |_: &ScenarioConfig, n: u32| -> Result<KernelOutput, KernelError> {
            Ok(KernelOutput::Batch(PartialResult {
                iteration_count: n + 1,
                ..Default::default()
            }))
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::spawn(1, Arc::new(kernel), tx).unwrap();
        pool.dispatch(0, request("r", 5)).unwrap();
        assert!(matches!(
            rx.blocking_recv().unwrap().reply,
            ExecutorReply::Error(ExecutorError::InvalidResult { .. })
        ));
    }
}
