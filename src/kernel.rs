//! Seam to the simulation kernel.
//!
//! The kernel is a pure function of `(config, iterations)`: identical
//! configs, including `rng_seed`, give identical output. One iteration
//! yields a single [`Sample`]; more yield a pre-aggregated batch.

use crate::constants::{
    DEFAULT_AGENTS, DEFAULT_BASE_DPS, DEFAULT_DPS_SPREAD, DEFAULT_DURATION_SECONDS, IGNITE_SHARE,
    TIMELINE_DELTA_T,
};
use crate::result::{histogram_bucket, AgentResult, PartialResult, Sample, StatWeights};
use crate::scenario::ScenarioConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct KernelError(pub String);

#[derive(Debug, Clone, PartialEq)]
pub enum KernelOutput {
    Single(Sample),
    Batch(PartialResult),
}

pub trait SimulationKernel: Send + Sync {
    fn run(&self, config: &ScenarioConfig, iterations: u32) -> Result<KernelOutput, KernelError>;
}

impl<F> SimulationKernel for F
where
    F: Fn(&ScenarioConfig, u32) -> Result<KernelOutput, KernelError> + Send + Sync,
{
    fn run(&self, config: &ScenarioConfig, iterations: u32) -> Result<KernelOutput, KernelError> {
        self(config, iterations)
    }
}

fn default_agents() -> usize {
    DEFAULT_AGENTS
}
fn default_base_dps() -> f64 {
    DEFAULT_BASE_DPS
}
fn default_spread() -> f64 {
    DEFAULT_DPS_SPREAD
}
fn default_duration() -> f64 {
    DEFAULT_DURATION_SECONDS
}

/// Parameters read from `ScenarioConfig::params` by [`SyntheticKernel`].
#[derive(Debug, Clone, Deserialize)]
pub struct SyntheticParams {
    #[serde(default = "default_agents")]
    pub agents: usize,
    #[serde(default = "default_base_dps")]
    pub base_dps: f64,
    #[serde(default = "default_spread")]
    pub spread: f64,
    #[serde(default = "default_duration")]
    pub duration: f64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            agents: DEFAULT_AGENTS,
            base_dps: DEFAULT_BASE_DPS,
            spread: DEFAULT_DPS_SPREAD,
            duration: DEFAULT_DURATION_SECONDS,
        }
    }
}

impl SyntheticParams {
    pub fn from_config(config: &ScenarioConfig) -> Result<Self, KernelError> {
        let params: Self = if config.params.is_null() {
            Self::default()
        } else {
            serde_json::from_value(config.params.clone())
                .map_err(|e| KernelError(format!("bad params for {}: {}", config.raid_id, e)))?
        };

        if params.agents == 0 {
            return Err(KernelError("agents must be at least 1".to_string()));
        }
        if !params.duration.is_finite() || params.duration <= 0.0 {
            return Err(KernelError(format!("invalid duration {}", params.duration)));
        }
        if !(0.0..1.0).contains(&params.spread) {
            return Err(KernelError(format!("spread must be in [0, 1), got {}", params.spread)));
        }
        Ok(params)
    }
}

/// Deterministic stand-in for the combat kernel.
///
/// Each agent deals `base_dps` jittered by `spread`, a fixed share of it
/// as ignite, and damage ramps up over the encounter so the cumulative
/// dps timeline has a visible peak.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticKernel;

impl SyntheticKernel {
    fn trial(params: &SyntheticParams, rng: &mut ChaCha8Rng) -> Sample {
        let mut per_agent = Vec::with_capacity(params.agents);
        for i in 0..params.agents {
            let dps = params.base_dps * (1.0 + params.spread * rng.gen_range(-1.0..=1.0));
            let ignite_dps = dps * IGNITE_SHARE * rng.gen_range(0.5..=1.5);
            per_agent.push(AgentResult {
                name: format!("Mage {}", i + 1),
                dps,
                ignite_dps,
            });
        }

        let dps: f64 = per_agent.iter().map(|a| a.dps).sum();
        let ignite_dps: f64 = per_agent.iter().map(|a| a.ignite_dps).sum();

        // Cumulative dps at each step, starting at t = 0
        let steps = (params.duration / TIMELINE_DELTA_T).ceil() as usize;
        let ramp = params.duration / 4.0;
        let mut dps_timeline = Vec::with_capacity(steps + 1);
        dps_timeline.push(0.0);
        for step in 1..=steps {
            let t = step as f64 * TIMELINE_DELTA_T;
            let build_up = 1.0 - (-t / ramp).exp();
            let fade = 1.0 - 0.1 * (t / params.duration);
            dps_timeline.push(dps * build_up * fade * 1.1);
        }

        let stat_weights = StatWeights {
            dps_sp: dps * 0.012,
            dps_crit: dps * 0.009,
            dps_hit: dps * 0.007,
            dps_select: 0.0,
            dps90_sp: dps * 0.011,
            dps90_crit: dps * 0.010,
            dps90_hit: dps * 0.006,
            dps90_select: 0.0,
        };

        Sample {
            dps,
            ignite_dps,
            per_agent,
            dps_timeline,
            stat_weights: Some(stat_weights),
        }
    }
}

impl SimulationKernel for SyntheticKernel {
    fn run(&self, config: &ScenarioConfig, iterations: u32) -> Result<KernelOutput, KernelError> {
        if iterations == 0 {
            return Err(KernelError("iterations must be positive".to_string()));
        }
        let params = SyntheticParams::from_config(config)?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.rng_seed);

        if iterations == 1 {
            return Ok(KernelOutput::Single(Self::trial(&params, &mut rng)));
        }

        let mut result = PartialResult {
            iteration_count: iterations,
            min_dps: f64::INFINITY,
            max_dps: f64::NEG_INFINITY,
            ..Default::default()
        };
        let mut weights = StatWeights::default();

        for idx in 0..iterations {
            let sample = Self::trial(&params, &mut rng);

            result.dps += sample.dps;
            result.ignite_dps += sample.ignite_dps;
            result.min_dps = result.min_dps.min(sample.dps);
            result.max_dps = result.max_dps.max(sample.dps);
            *result.histogram.entry(histogram_bucket(sample.dps)).or_insert(0) += 1;
            *result
                .ignite_histogram
                .entry(histogram_bucket(sample.ignite_dps))
                .or_insert(0) += 1;

            if idx == 0 {
                result.per_agent = sample.per_agent;
                result.dps_timeline = sample.dps_timeline;
            } else {
                for (acc, agent) in result.per_agent.iter_mut().zip(&sample.per_agent) {
                    acc.dps += agent.dps;
                    acc.ignite_dps += agent.ignite_dps;
                }
                for (acc, v) in result.dps_timeline.iter_mut().zip(&sample.dps_timeline) {
                    *acc += v;
                }
            }
            if let Some(w) = sample.stat_weights {
                weights.accumulate(&w);
            }
        }

        let n = f64::from(iterations);
        result.dps /= n;
        result.ignite_dps /= n;
        for agent in &mut result.per_agent {
            agent.dps /= n;
            agent.ignite_dps /= n;
        }
        for v in &mut result.dps_timeline {
            *v /= n;
        }
        result.stat_weights = Some(weights);

        Ok(KernelOutput::Batch(result))
    }
}
