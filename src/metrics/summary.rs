use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::results::Phase;

use super::metrics_set::MetricsSet;
use super::percentiles::{finite, floor_denominator, round2};
use super::stream::StreamAnalytics;

/// Per-stage roll-up of every action's metrics set plus the workers'
/// binned streams, reconciled against the authoritative counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetricsSummary {
    pub stage: String,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub actions_per_second: f64,
    /// Mean seconds per action for each phase, weighted by action count.
    pub phase_means: BTreeMap<Phase, f64>,
    pub streamed_completed: Vec<u64>,
    pub streamed_succeeded: Vec<u64>,
    pub streamed_failed: Vec<u64>,
    pub streamed_batch_timings: Vec<f64>,
    pub streamed_completion_rates: Vec<f64>,
}

impl StageMetricsSummary {
    pub fn new(
        stage: impl Into<String>,
        metrics_sets: &[MetricsSet],
        streams: &[StreamAnalytics],
    ) -> Result<Self> {
        let stage = stage.into();

        // ── Counters ────────────────────────────────────────────
        let mut total = 0u64;
        let mut succeeded = 0u64;
        let mut failed = 0u64;
        let mut actions_per_second = 0.0;
        let mut weighted: BTreeMap<Phase, f64> = BTreeMap::new();

        for set in metrics_sets {
            let common = &set.common_stats;
            total += common.total;
            succeeded += common.succeeded;
            failed += common.failed;
            actions_per_second += common.actions_per_second;

            for (phase, group) in &set.groups {
                *weighted.entry(*phase).or_insert(0.0) += group.stats.mean * common.total as f64;
            }
        }

        if total != succeeded + failed {
            return Err(ReportError::InvariantViolation(format!(
                "stage '{stage}' counts do not add up: total={total}, succeeded={succeeded}, failed={failed}"
            )));
        }

        let denominator = floor_denominator(total as f64);
        let phase_means = weighted
            .into_iter()
            .map(|(phase, sum)| (phase, finite(sum / denominator)))
            .collect();

        // ── Binned streams ──────────────────────────────────────
        let mut streamed_completed = sum_bins(streams.iter().map(|s| &s.completed_counts));
        let mut streamed_succeeded = sum_bins(streams.iter().map(|s| &s.succeeded_counts));
        let mut streamed_failed = sum_bins(streams.iter().map(|s| &s.failed_counts));
        let streamed_batch_timings = sum_timings(streams.iter().map(|s| &s.batch_timings));

        reconcile_bins(&mut streamed_completed, total)?;
        reconcile_bins(&mut streamed_succeeded, succeeded)?;
        reconcile_bins(&mut streamed_failed, failed)?;

        let streamed_completion_rates = streamed_completed
            .iter()
            .enumerate()
            .map(|(i, &completed)| {
                let elapsed = streamed_batch_timings.get(i).copied().unwrap_or(0.0);
                finite(completed as f64 / floor_denominator(elapsed))
            })
            .collect();

        Ok(Self {
            stage,
            total,
            succeeded,
            failed,
            actions_per_second: round2(finite(actions_per_second)),
            phase_means,
            streamed_completed,
            streamed_succeeded,
            streamed_failed,
            streamed_batch_timings,
            streamed_completion_rates,
        })
    }
}

/// Pad every series to the longest and sum position-wise.
fn sum_bins<'a>(series: impl Iterator<Item = &'a Vec<u64>>) -> Vec<u64> {
    let mut bins: Vec<u64> = Vec::new();
    for stream in series {
        if stream.len() > bins.len() {
            bins.resize(stream.len(), 0);
        }
        for (bin, &count) in bins.iter_mut().zip(stream) {
            *bin += count;
        }
    }
    bins
}

fn sum_timings<'a>(series: impl Iterator<Item = &'a Vec<f64>>) -> Vec<f64> {
    let mut bins: Vec<f64> = Vec::new();
    for stream in series {
        if stream.len() > bins.len() {
            bins.resize(stream.len(), 0.0);
        }
        for (bin, &elapsed) in bins.iter_mut().zip(stream) {
            *bin += elapsed;
        }
    }
    bins
}

/// Bring `Σ bins` down to `authoritative` without any bin going negative.
///
/// The excess is split into `excess / n` per bin plus `excess % n`. The
/// per-bin share is taken front to back; whatever a bin could not give is
/// carried to the next. The remainder and the final carry are then taken
/// from the last bin, walking backwards while a bin runs dry. A sum already
/// at or below `authoritative` is left unchanged.
pub fn reconcile_bins(bins: &mut [u64], authoritative: u64) -> Result<()> {
    let sum: u64 = bins.iter().sum();
    if sum <= authoritative || bins.is_empty() {
        return Ok(());
    }

    let excess = sum - authoritative;
    let n = bins.len() as u64;
    let per_bin = excess / n;
    let remainder = excess % n;

    let mut carry = 0u64;
    for bin in bins.iter_mut() {
        let wanted = per_bin + carry;
        let taken = wanted.min(*bin);
        *bin -= taken;
        carry = wanted - taken;
    }

    let mut outstanding = remainder + carry;
    for bin in bins.iter_mut().rev() {
        if outstanding == 0 {
            break;
        }
        let taken = outstanding.min(*bin);
        *bin -= taken;
        outstanding -= taken;
    }

    if outstanding > 0 {
        return Err(ReportError::InvariantViolation(format!(
            "cannot remove {outstanding} more from exhausted stream bins"
        )));
    }
    Ok(())
}
