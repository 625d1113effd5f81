//! End-to-end tests for batch orchestration.
//!
//! Subsystems covered:
//! - Chunking and pool sizing as seen from a running batch
//! - Single-iteration batches
//! - Multi-scenario comparison output
//! - Abort-on-first-error and slot release on every exit path
//! - Progress reporting and the non-blocking start path

use raidsim::messages::StartRequest;
use raidsim::{
    AgentResult, BatchCallbacks, BatchConfig, BatchError, BatchState, ExecutorError, FinalResult,
    KernelError, KernelOutput, MergeContractViolation, Orchestrator, PartialResult, Progress,
    RunTask, ScenarioConfig, SimulationKernel, SyntheticKernel,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// =============================================================================
// Helpers
// =============================================================================

#[derive(Debug, Clone)]
enum Event {
    Progress(Progress),
    Success(Box<FinalResult>),
    Error(BatchError),
}

type EventLog = Arc<Mutex<Vec<Event>>>;

fn recording_callbacks() -> (BatchCallbacks, EventLog) {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let (on_success, on_error, on_progress) = (log.clone(), log.clone(), log.clone());
    let callbacks = BatchCallbacks::new(
        move |result| on_success.lock().unwrap().push(Event::Success(Box::new(result))),
        move |err| on_error.lock().unwrap().push(Event::Error(err)),
    )
    .with_progress(move |p| on_progress.lock().unwrap().push(Event::Progress(p)));
    (callbacks, log)
}

fn config(threads: usize, iterations: u32) -> BatchConfig {
    BatchConfig {
        thread_budget: threads,
        iterations,
        track_timeline: true,
    }
}

fn final_result(log: &EventLog) -> FinalResult {
    let events = log.lock().unwrap();
    events
        .iter()
        .find_map(|e| match e {
            Event::Success(r) => Some((**r).clone()),
            _ => None,
        })
        .expect("batch did not succeed")
}

fn errors(log: &EventLog) -> Vec<BatchError> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            Event::Error(err) => Some(err.clone()),
            _ => None,
        })
        .collect()
}

fn fixed_result(iterations: u32, agents: usize, dps: f64) -> PartialResult {
    PartialResult {
        iteration_count: iterations,
        dps,
        min_dps: dps,
        max_dps: dps,
        ignite_dps: dps / 10.0,
        per_agent: vec![
            AgentResult {
                dps: dps / agents as f64,
                ..Default::default()
            };
            agents
        ],
        ..Default::default()
    }
}

// =============================================================================
// Spec scenarios
// =============================================================================

#[test]
fn test_two_chunks_on_two_workers() {
    let (callbacks, log) = recording_callbacks();
    let orchestrator = Orchestrator::new(
        config(4, 100),
        vec![ScenarioConfig::new("main", "Main").active().with_seed(11)],
        Arc::new(SyntheticKernel),
        callbacks,
    )
    .unwrap();

    let summary = orchestrator.start().join();
    assert_eq!(summary.state, BatchState::Completed);
    assert_eq!(summary.slots, 2);
    assert_eq!(summary.tasks, 2);
    assert_eq!(summary.slots_terminated, 2);

    let result = final_result(&log);
    assert_eq!(result.result.iteration_count, 100);
    assert_eq!(result.iterations, 100);
    assert_eq!(result.result.histogram.values().sum::<u64>(), 100);
    assert!(result.result.stat_weights.is_some());
}

#[test]
fn test_single_iteration_batch() {
    let (callbacks, log) = recording_callbacks();
    let orchestrator = Orchestrator::new(
        config(2, 1),
        vec![ScenarioConfig::new("main", "Main").active()],
        Arc::new(SyntheticKernel),
        callbacks,
    )
    .unwrap();

    let summary = orchestrator.start().join();
    assert_eq!(summary.state, BatchState::Completed);
    assert_eq!(summary.slots, 1);
    assert_eq!(summary.tasks, 1);

    let events = log.lock().unwrap().clone();
    assert_eq!(events.len(), 2, "one progress update then success");
    assert!(matches!(events[0], Event::Progress(Progress { iterations: 1, .. })));
    match &events[1] {
        Event::Success(result) => {
            assert_eq!(result.iterations, 1);
            assert_eq!(result.result.iteration_count, 1);
            assert_eq!(result.result.min_dps, result.result.max_dps);
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn test_active_and_comparison_scenarios() {
    let active = ScenarioConfig::new("active", "Active").active().with_seed(500);
    let comparison = ScenarioConfig::new("cmp", "Comparison").with_seed(900);

    let (callbacks, log) = recording_callbacks();
    let orchestrator = Orchestrator::new(
        config(4, 50),
        vec![active.clone(), comparison],
        Arc::new(SyntheticKernel),
        callbacks,
    )
    .unwrap();

    let summary = orchestrator.start().join();
    assert_eq!(summary.state, BatchState::Completed);
    // One 50-iteration chunk per scenario
    assert_eq!(summary.tasks, 2);

    let result = final_result(&log);
    assert_eq!(result.comparison_data.len(), 2);
    let active_entries: Vec<_> = result.comparison_data.iter().filter(|c| c.is_active).collect();
    assert_eq!(active_entries.len(), 1);
    assert_eq!(active_entries[0].raid_id, "active");
    assert!((active_entries[0].avg_dps - result.result.dps).abs() < 1e-9);

    // The top-level result is exactly the active scenario's aggregate
    let task = RunTask {
        scenario: 0,
        iteration_count: 50,
        run_index: 0,
        started: true,
    };
    let request = StartRequest::for_task(&active, &task, true);
    let expected = request
        .accept(0, SyntheticKernel.run(&request.config, 50).unwrap())
        .unwrap();
    assert_eq!(result.result, expected);

    // Comparison scenarios carry no stat weights
    let cmp = result.comparison_data.iter().find(|c| c.raid_id == "cmp").unwrap();
    assert!(!cmp.dps_over_time.is_empty());
    assert_eq!(cmp.peak_dps, cmp.dps_over_time[cmp.time_to_peak]);
}

// =============================================================================
// Failure handling
// =============================================================================

#[test]
fn test_executor_error_aborts_batch() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let kernel = move |_: &ScenarioConfig, n: u32| -> Result<KernelOutput, KernelError> {
        if counter.fetch_add(1, Ordering::SeqCst) == 2 {
            return Err(KernelError("out of mana".to_string()));
        }
        Ok(KernelOutput::Batch(fixed_result(n, 2, 1000.0)))
    };

    let (callbacks, log) = recording_callbacks();
    // 50 chunks, so the failure always lands with work still queued
    let orchestrator = Orchestrator::new(
        config(2, 10_000),
        vec![ScenarioConfig::new("main", "Main").active()],
        Arc::new(kernel),
        callbacks,
    )
    .unwrap();

    let summary = orchestrator.start().join();
    assert_eq!(summary.state, BatchState::Failed);
    assert_eq!(summary.slots_terminated, summary.slots);
    assert!(summary.tasks_started < summary.tasks);

    let errs = errors(&log);
    assert_eq!(errs.len(), 1);
    assert!(matches!(
        &errs[0],
        BatchError::Executor(ExecutorError::Kernel { message, .. }) if message == "out of mana"
    ));

    let events = log.lock().unwrap();
    assert!(matches!(events.last(), Some(Event::Error(_))), "nothing after the error");
    assert!(!events.iter().any(|e| matches!(e, Event::Success(_))));
}

#[test]
fn test_kernel_panic_fails_batch() {
    let kernel = |config: &ScenarioConfig, n: u32| -> Result<KernelOutput, KernelError> {
        if config.raid_id == "cursed" {
            panic!("index out of range");
        }
        Ok(KernelOutput::Batch(fixed_result(n, 1, 500.0)))
    };

    let (callbacks, log) = recording_callbacks();
    let orchestrator = Orchestrator::new(
        config(4, 100),
        vec![
            ScenarioConfig::new("fine", "Fine").active(),
            ScenarioConfig::new("cursed", "Cursed"),
        ],
        Arc::new(kernel),
        callbacks,
    )
    .unwrap();

    let summary = orchestrator.start().join();
    assert_eq!(summary.state, BatchState::Failed);
    assert_eq!(summary.slots_terminated, summary.slots);
    let errs = errors(&log);
    assert_eq!(errs.len(), 1);
    assert!(matches!(
        errs[0],
        BatchError::Executor(ExecutorError::Panicked { .. })
    ));
}

#[test]
fn test_unstable_agent_list_is_a_contract_violation() {
    let kernel = |config: &ScenarioConfig, n: u32| -> Result<KernelOutput, KernelError> {
        // The second chunk of a scenario reports an extra agent
        let agents = if config.rng_seed == 0 { 2 } else { 3 };
        Ok(KernelOutput::Batch(fixed_result(n, agents, 800.0)))
    };

    let (callbacks, log) = recording_callbacks();
    // One executor, two chunks of 200, merged in order
    let orchestrator = Orchestrator::new(
        config(1, 400),
        vec![ScenarioConfig::new("main", "Main").active()],
        Arc::new(kernel),
        callbacks,
    )
    .unwrap();

    let summary = orchestrator.start().join();
    assert_eq!(summary.state, BatchState::Failed);
    assert_eq!(
        errors(&log),
        vec![BatchError::Merge(MergeContractViolation::AgentCountMismatch {
            raid_id: "main".to_string(),
            expected: 2,
            got: 3,
        })]
    );
}

// =============================================================================
// Progress and completion
// =============================================================================

#[test]
fn test_progress_is_monotonic_and_ends_at_target() {
    let (callbacks, log) = recording_callbacks();
    let orchestrator = Orchestrator::new(
        config(3, 1000),
        vec![
            ScenarioConfig::new("a", "A").active().with_seed(1),
            ScenarioConfig::new("b", "B").with_seed(2),
            ScenarioConfig::new("c", "C").with_seed(3),
        ],
        Arc::new(SyntheticKernel),
        callbacks,
    )
    .unwrap();
    orchestrator.start().join();

    let events = log.lock().unwrap();
    let progress: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            Event::Progress(p) => Some(p.iterations),
            _ => None,
        })
        .collect();

    // 1000 iterations at C = 200: five chunks for each of three scenarios
    assert_eq!(progress.len(), 15);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last(), Some(&1000));
    assert!(matches!(events.last(), Some(Event::Success(_))));

    drop(events);
    let result = final_result(&log);
    for entry in &result.comparison_data {
        assert!(entry.avg_dps > 0.0);
    }
}

#[test]
fn test_single_worker_batches_are_reproducible() {
    let run = || {
        let (callbacks, log) = recording_callbacks();
        Orchestrator::new(
            config(1, 450),
            vec![
                ScenarioConfig::new("a", "A").active().with_seed(1234),
                ScenarioConfig::new("b", "B").with_seed(4321),
            ],
            Arc::new(SyntheticKernel),
            callbacks,
        )
        .unwrap()
        .start()
        .join();
        final_result(&log)
    };

    let first = run();
    let second = run();
    assert_eq!(first.result, second.result);
    assert_eq!(first.comparison_data, second.comparison_data);
}

#[test]
fn test_timeline_can_be_disabled() {
    let (callbacks, log) = recording_callbacks();
    let mut batch = config(2, 120);
    batch.track_timeline = false;
    Orchestrator::new(
        batch,
        vec![ScenarioConfig::new("a", "A").active()],
        Arc::new(SyntheticKernel),
        callbacks,
    )
    .unwrap()
    .start()
    .join();

    let result = final_result(&log);
    assert!(result.result.dps_timeline.is_empty());
    let entry = &result.comparison_data[0];
    assert_eq!(entry.peak_dps, entry.avg_dps);
    assert_eq!(entry.time_to_peak, 0);
}

#[tokio::test]
async fn test_start_returns_before_completion() {
    let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
    let gate = Mutex::new(gate_rx);
    let kernel = move |_: &ScenarioConfig, n: u32| -> Result<KernelOutput, KernelError> {
        // Hold the only executor until the test opens the gate
        let _ = gate.lock().unwrap().recv();
        Ok(KernelOutput::Batch(fixed_result(n, 1, 700.0)))
    };

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let callbacks = BatchCallbacks::new(
        move |result| {
            let _ = done_tx.send(result.result.iteration_count);
        },
        |err| panic!("unexpected error {err}"),
    );
    let orchestrator = Orchestrator::new(
        config(1, 10),
        vec![ScenarioConfig::new("a", "A").active()],
        Arc::new(kernel),
        callbacks,
    )
    .unwrap();

    let mut handle = orchestrator.start();
    assert_eq!(handle.state(), BatchState::Running);
    assert!(!handle.is_finished());

    gate_tx.send(()).unwrap();
    assert_eq!(done_rx.await.unwrap(), 10);
    assert_eq!(handle.finished().await, BatchState::Completed);
    assert!(handle.is_finished());
}
