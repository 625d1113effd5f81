//! Batch report generation.

use crate::aggregate::FinalResult;
use crate::constants::{HISTOGRAM_BIN_SIZE, TIMELINE_DELTA_T};

const BAR_WIDTH: f64 = 40.0;

/// Text and JSON views of a finished batch.
pub struct BatchReport<'a> {
    result: &'a FinalResult,
}

impl<'a> BatchReport<'a> {
    pub fn new(result: &'a FinalResult) -> Self {
        Self { result }
    }

    /// Generate a text report.
    pub fn to_text(&self) -> String {
        let r = self.result;
        let mut report = String::new();

        report.push_str("═══════════════════════════════════════════════════════════════\n");
        report.push_str("                      RAID SIM REPORT\n");
        report.push_str("═══════════════════════════════════════════════════════════════\n\n");

        report.push_str(&format!(
            "Iterations: {} per scenario, {} scenario(s), {:.2}s\n\n",
            r.iterations,
            r.comparison_data.len(),
            r.time
        ));

        report.push_str("── ACTIVE SCENARIO ──────────────────────────────────────────────\n");
        report.push_str(&format!("  Avg DPS:        {:.1}\n", r.result.dps));
        report.push_str(&format!("  Min DPS:        {:.1}\n", r.result.min_dps));
        report.push_str(&format!("  Max DPS:        {:.1}\n", r.result.max_dps));
        report.push_str(&format!("  Ignite DPS:     {:.1}\n\n", r.result.ignite_dps));

        if !r.result.per_agent.is_empty() {
            report.push_str("── PER AGENT ────────────────────────────────────────────────────\n");
            for (i, agent) in r.result.per_agent.iter().enumerate() {
                let name = if agent.name.is_empty() {
                    format!("#{}", i + 1)
                } else {
                    agent.name.clone()
                };
                report.push_str(&format!(
                    "  {:<14} {:>8.1} dps   {:>8.1} ignite\n",
                    name, agent.dps, agent.ignite_dps
                ));
            }
            report.push('\n');
        }

        if let Some(w) = r.result.stat_weights {
            let n = f64::from(r.result.iteration_count.max(1));
            report.push_str("── STAT WEIGHTS (per iteration) ─────────────────────────────────\n");
            report.push_str(&format!(
                "  SP {:>8.3}   Crit {:>8.3}   Hit {:>8.3}\n",
                w.dps_sp / n,
                w.dps_crit / n,
                w.dps_hit / n
            ));
            report.push_str(&format!(
                "  90th: SP {:>8.3}   Crit {:>8.3}   Hit {:>8.3}\n\n",
                w.dps90_sp / n,
                w.dps90_crit / n,
                w.dps90_hit / n
            ));
        }

        report.push_str("── COMPARISON ───────────────────────────────────────────────────\n");
        report.push_str("  Scenario                  Avg DPS   Peak DPS   Peak At\n");
        report.push_str("  ────────                  ───────   ────────   ───────\n");
        for entry in &r.comparison_data {
            let marker = if entry.is_active { "*" } else { " " };
            let label = if entry.raid_name.is_empty() {
                &entry.raid_id
            } else {
                &entry.raid_name
            };
            let peak_at = if entry.dps_over_time.is_empty() {
                "-".to_string()
            } else {
                format!("{:.2}s", entry.time_to_peak as f64 * TIMELINE_DELTA_T)
            };
            report.push_str(&format!(
                " {}{:<24} {:>8.1}   {:>8.1}   {:>7}\n",
                marker, label, entry.avg_dps, entry.peak_dps, peak_at
            ));
        }
        report.push('\n');

        report.push_str("── DPS DISTRIBUTION ─────────────────────────────────────────────\n");
        let peak_count = r.result.histogram.values().copied().max().unwrap_or(0);
        for (bucket, count) in &r.result.histogram {
            let bar_len = if peak_count > 0 {
                ((*count as f64 / peak_count as f64) * BAR_WIDTH).round() as usize
            } else {
                0
            };
            report.push_str(&format!(
                "  {:>5}-{:<5} {:>6} {}\n",
                bucket,
                *bucket as f64 + HISTOGRAM_BIN_SIZE,
                count,
                "█".repeat(bar_len)
            ));
        }

        report.push_str("\n═══════════════════════════════════════════════════════════════\n");

        report
    }

    /// Generate a JSON report for further analysis.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self.result).unwrap_or_else(|_| "{}".to_string())
    }
}
