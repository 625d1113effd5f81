//! Result shapes produced by executors and accumulated by the aggregator.

use crate::constants::HISTOGRAM_BIN_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sparse histogram: lower bucket edge (dps) → trial count.
pub type Histogram = BTreeMap<u32, u64>;

/// Histograms as JSON objects keyed by the bucket edge as a string.
///
/// Keeps the keys readable when the map is buffered, as it is under
/// `#[serde(flatten)]`.
mod histogram_keys {
    use super::Histogram;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(histogram: &Histogram, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(histogram.iter().map(|(bucket, count)| (bucket.to_string(), count)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Histogram, D::Error> {
        BTreeMap::<String, u64>::deserialize(deserializer)?
            .into_iter()
            .map(|(bucket, count)| {
                bucket
                    .parse::<u32>()
                    .map(|bucket| (bucket, count))
                    .map_err(|_| D::Error::custom(format!("invalid histogram bucket {:?}", bucket)))
            })
            .collect()
    }
}

/// Per-agent damage figures, averaged over the trials of a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    #[serde(default)]
    pub name: String,
    pub dps: f64,
    pub ignite_dps: f64,
}

/// Stat-weight partial sums. Only produced for the active scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatWeights {
    pub dps_sp: f64,
    pub dps_crit: f64,
    pub dps_hit: f64,
    pub dps_select: f64,
    pub dps90_sp: f64,
    pub dps90_crit: f64,
    pub dps90_hit: f64,
    pub dps90_select: f64,
}

impl StatWeights {
    /// Sums are additive across chunks.
    pub fn accumulate(&mut self, other: &StatWeights) {
        self.dps_sp += other.dps_sp;
        self.dps_crit += other.dps_crit;
        self.dps_hit += other.dps_hit;
        self.dps_select += other.dps_select;
        self.dps90_sp += other.dps90_sp;
        self.dps90_crit += other.dps90_crit;
        self.dps90_hit += other.dps90_hit;
        self.dps90_select += other.dps90_select;
    }
}

/// A batch of trials summarised into weighted statistics.
///
/// The same shape serves as one executor's partial result and as the
/// running per-scenario aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimResult {
    pub iteration_count: u32,
    pub dps: f64,
    pub min_dps: f64,
    pub max_dps: f64,
    pub ignite_dps: f64,
    #[serde(default, with = "histogram_keys")]
    pub histogram: Histogram,
    #[serde(default, with = "histogram_keys")]
    pub ignite_histogram: Histogram,
    #[serde(default)]
    pub per_agent: Vec<AgentResult>,
    /// Mean cumulative dps per timeline bucket
    #[serde(default)]
    pub dps_timeline: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_weights: Option<StatWeights>,
}

/// One executor's output for one run task.
pub type PartialResult = SimResult;

/// Running merge of every partial result seen for one scenario.
pub type AggregatedResult = SimResult;

/// A single trial, as returned by the kernel for one-iteration runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub dps: f64,
    pub ignite_dps: f64,
    #[serde(default)]
    pub per_agent: Vec<AgentResult>,
    #[serde(default)]
    pub dps_timeline: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_weights: Option<StatWeights>,
}

/// Lower edge of the histogram bucket holding `dps`.
pub fn histogram_bucket(dps: f64) -> u32 {
    if !dps.is_finite() || dps <= 0.0 {
        return 0;
    }
    ((dps / HISTOGRAM_BIN_SIZE).floor() * HISTOGRAM_BIN_SIZE) as u32
}

impl From<Sample> for SimResult {
    fn from(sample: Sample) -> Self {
        let mut histogram = Histogram::new();
        histogram.insert(histogram_bucket(sample.dps), 1);
        let mut ignite_histogram = Histogram::new();
        ignite_histogram.insert(histogram_bucket(sample.ignite_dps), 1);

        Self {
            iteration_count: 1,
            dps: sample.dps,
            min_dps: sample.dps,
            max_dps: sample.dps,
            ignite_dps: sample.ignite_dps,
            histogram,
            ignite_histogram,
            per_agent: sample.per_agent,
            dps_timeline: sample.dps_timeline,
            stat_weights: sample.stat_weights,
        }
    }
}
