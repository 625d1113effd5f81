//! Incremental, iteration-weighted merging of partial results.
//!
//! Nothing here ever sees raw trials: every statistic is merged from
//! already-summarised chunks, so each rule has to be order-independent.

use crate::error::MergeContractViolation;
use crate::result::{AgentResult, AggregatedResult, Histogram, PartialResult};
use crate::scenario::ScenarioConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn weighted_mean(a: f64, a_n: f64, b: f64, b_n: f64) -> f64 {
    (a * a_n + b * b_n) / (a_n + b_n)
}

fn merge_histogram(into: &mut Histogram, from: &Histogram) {
    for (bucket, count) in from {
        *into.entry(*bucket).or_insert(0) += count;
    }
}

/// Fold `partial` into `existing`, returning the new aggregate.
///
/// Stat-weight sums are only carried for the active scenario.
pub fn merge(
    raid_id: &str,
    existing: Option<&AggregatedResult>,
    partial: &PartialResult,
    is_active: bool,
) -> Result<AggregatedResult, MergeContractViolation> {
    if partial.iteration_count == 0 {
        return Err(MergeContractViolation::ZeroIterations {
            raid_id: raid_id.to_string(),
        });
    }

    let Some(existing) = existing else {
        let mut first = partial.clone();
        if !is_active {
            first.stat_weights = None;
        }
        return Ok(first);
    };

    if existing.per_agent.len() != partial.per_agent.len() {
        return Err(MergeContractViolation::AgentCountMismatch {
            raid_id: raid_id.to_string(),
            expected: existing.per_agent.len(),
            got: partial.per_agent.len(),
        });
    }

    let a_n = f64::from(existing.iteration_count);
    let b_n = f64::from(partial.iteration_count);

    let mut histogram = existing.histogram.clone();
    merge_histogram(&mut histogram, &partial.histogram);
    let mut ignite_histogram = existing.ignite_histogram.clone();
    merge_histogram(&mut ignite_histogram, &partial.ignite_histogram);

    let per_agent = existing
        .per_agent
        .iter()
        .zip(&partial.per_agent)
        .map(|(a, b)| AgentResult {
            name: a.name.clone(),
            dps: weighted_mean(a.dps, a_n, b.dps, b_n),
            ignite_dps: weighted_mean(a.ignite_dps, a_n, b.ignite_dps, b_n),
        })
        .collect();

    let mut dps_timeline: Vec<f64> = existing
        .dps_timeline
        .iter()
        .zip(&partial.dps_timeline)
        .map(|(a, b)| weighted_mean(*a, a_n, *b, b_n))
        .collect();
    if existing.dps_timeline.len() > partial.dps_timeline.len() {
        dps_timeline.extend_from_slice(&existing.dps_timeline[partial.dps_timeline.len()..]);
    } else {
        dps_timeline.extend_from_slice(&partial.dps_timeline[existing.dps_timeline.len()..]);
    }

    let stat_weights = if is_active {
        match (existing.stat_weights, partial.stat_weights) {
            (Some(mut acc), Some(w)) => {
                acc.accumulate(&w);
                Some(acc)
            }
            (acc, w) => acc.or(w),
        }
    } else {
        None
    };

    Ok(AggregatedResult {
        iteration_count: existing.iteration_count.saturating_add(partial.iteration_count),
        dps: weighted_mean(existing.dps, a_n, partial.dps, b_n),
        min_dps: existing.min_dps.min(partial.min_dps),
        max_dps: existing.max_dps.max(partial.max_dps),
        ignite_dps: weighted_mean(existing.ignite_dps, a_n, partial.ignite_dps, b_n),
        histogram,
        ignite_histogram,
        per_agent,
        dps_timeline,
        stat_weights,
    })
}

/// Peak of a dps timeline and the first index reaching it.
///
/// Falls back to the mean dps at index 0 when no timeline was tracked.
pub fn peak(result: &AggregatedResult) -> (f64, usize) {
    let mut best: Option<(f64, usize)> = None;
    for (idx, &v) in result.dps_timeline.iter().enumerate() {
        match best {
            Some((peak, _)) if v <= peak => {}
            _ => best = Some((v, idx)),
        }
    }
    best.unwrap_or((result.dps, 0))
}

/// Progress snapshot emitted after every merge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Merged iterations per scenario, rounded down
    pub iterations: u32,
    /// Mean of the per-scenario dps merged so far
    pub dps: f64,
}

/// One scenario's line in the cross-scenario comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub raid_id: String,
    pub raid_name: String,
    pub is_active: bool,
    pub dps_over_time: Vec<f64>,
    pub avg_dps: f64,
    pub peak_dps: f64,
    /// Timeline index at which `peak_dps` is first reached
    pub time_to_peak: usize,
    pub per_agent: Vec<AgentResult>,
}

/// Payload delivered on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    /// Aggregate of the active scenario
    #[serde(flatten)]
    pub result: AggregatedResult,
    pub comparison_data: Vec<ComparisonEntry>,
    /// Wall-clock seconds
    pub time: f64,
    /// Requested iterations per scenario
    pub iterations: u32,
}

#[derive(Debug, Clone)]
struct ScenarioEntry {
    raid_id: String,
    raid_name: String,
    is_active: bool,
}

/// Per-scenario running aggregates for one batch.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    target: u32,
    scenarios: Vec<ScenarioEntry>,
    results: HashMap<String, AggregatedResult>,
    merged_iterations: u64,
}

impl ResultAggregator {
    pub fn new(scenarios: &[ScenarioConfig], target: u32) -> Self {
        Self {
            target,
            scenarios: scenarios
                .iter()
                .map(|s| ScenarioEntry {
                    raid_id: s.raid_id.clone(),
                    raid_name: s.raid_name.clone(),
                    is_active: s.is_active,
                })
                .collect(),
            results: HashMap::with_capacity(scenarios.len()),
            merged_iterations: 0,
        }
    }

    /// Merge a partial result into its scenario's aggregate.
    pub fn merge(
        &mut self,
        raid_id: &str,
        partial: &PartialResult,
    ) -> Result<&AggregatedResult, MergeContractViolation> {
        let is_active = self
            .scenarios
            .iter()
            .find(|s| s.raid_id == raid_id)
            .map(|s| s.is_active)
            .ok_or_else(|| MergeContractViolation::UnknownRaid {
                raid_id: raid_id.to_string(),
            })?;

        let merged = merge(raid_id, self.results.get(raid_id), partial, is_active)?;
        if merged.iteration_count > self.target {
            return Err(MergeContractViolation::IterationOverflow {
                raid_id: raid_id.to_string(),
                target: self.target,
                merged: merged.iteration_count,
            });
        }

        self.merged_iterations += u64::from(partial.iteration_count);
        let slot = self.results.entry(raid_id.to_string()).or_default();
        *slot = merged;
        Ok(&*slot)
    }

    pub fn get(&self, raid_id: &str) -> Option<&AggregatedResult> {
        self.results.get(raid_id)
    }

    /// Iterations merged across all scenarios.
    pub fn merged_iterations(&self) -> u64 {
        self.merged_iterations
    }

    pub fn is_complete(&self) -> bool {
        self.merged_iterations == u64::from(self.target) * self.scenarios.len() as u64
    }

    pub fn progress(&self) -> Progress {
        let scenario_count = self.scenarios.len().max(1) as u64;
        let iterations = (self.merged_iterations / scenario_count) as u32;
        let dps = if self.results.is_empty() {
            0.0
        } else {
            self.results.values().map(|r| r.dps).sum::<f64>() / self.results.len() as f64
        };
        Progress { iterations, dps }
    }

    /// Freeze the aggregates into the final comparison payload.
    pub fn compile(mut self, elapsed: Duration) -> FinalResult {
        let comparison_data = self
            .scenarios
            .iter()
            .map(|s| {
                let result = self.results.get(&s.raid_id).cloned().unwrap_or_default();
                let (peak_dps, time_to_peak) = peak(&result);
                ComparisonEntry {
                    raid_id: s.raid_id.clone(),
                    raid_name: s.raid_name.clone(),
                    is_active: s.is_active,
                    avg_dps: result.dps,
                    peak_dps,
                    time_to_peak,
                    per_agent: result.per_agent,
                    dps_over_time: result.dps_timeline,
                }
            })
            .collect();

        // No active scenario falls back to the first one
        let active_id = self
            .scenarios
            .iter()
            .find(|s| s.is_active)
            .or_else(|| self.scenarios.first())
            .map(|s| s.raid_id.clone())
            .unwrap_or_default();
        let result = self.results.remove(&active_id).unwrap_or_default();

        FinalResult {
            result,
            comparison_data,
            time: elapsed.as_secs_f64(),
            iterations: self.target,
        }
    }
}
