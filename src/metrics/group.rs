use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ReportError, Result};
use crate::results::{Phase, ProcessedResult, RawResult};
use crate::tag::Tag;

use super::estimators::PhaseEstimators;
use super::percentiles::StatSummary;

/// Per-action online accumulator.
///
/// One ingest worker owns a group while its stage runs, calling [`add`] for
/// every result. At stage end the group is frozen: [`calculate_partial_group_stats`]
/// and [`calculate_quantiles`] fill `groups`, and groups from different
/// workers are combined with [`merge`].
///
/// [`add`]: ProcessedResultsGroup::add
/// [`calculate_partial_group_stats`]: ProcessedResultsGroup::calculate_partial_group_stats
/// [`calculate_quantiles`]: ProcessedResultsGroup::calculate_quantiles
/// [`merge`]: ProcessedResultsGroup::merge
#[derive(Debug, Clone)]
pub struct ProcessedResultsGroup {
    pub name: String,
    pub stage: String,
    pub source: String,
    pub tags: BTreeSet<Tag>,

    // Counters
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub errors: BTreeMap<String, u64>,

    /// Raw per-phase samples (only strictly positive timings are kept).
    pub timings: BTreeMap<Phase, Vec<f64>>,
    /// Per-phase statistics, filled once the group is frozen.
    pub groups: BTreeMap<Phase, StatSummary>,

    estimators: BTreeMap<Phase, PhaseEstimators>,
    results: Vec<ProcessedResult>,
}

impl ProcessedResultsGroup {
    pub fn new(name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage: stage.into(),
            source: String::new(),
            tags: BTreeSet::new(),
            total: 0,
            succeeded: 0,
            failed: 0,
            errors: BTreeMap::new(),
            timings: BTreeMap::new(),
            groups: BTreeMap::new(),
            estimators: BTreeMap::new(),
            results: Vec::new(),
        }
    }

    /// Normalise `raw`, stamp it with `stage_name` and fold it in.
    pub fn add(&mut self, raw: RawResult, stage_name: &str) -> Result<()> {
        let result = ProcessedResult::from_raw(raw, stage_name)?;
        self.ingest(result)
    }

    /// Fold an already-normalised result in.
    pub fn ingest(&mut self, result: ProcessedResult) -> Result<()> {
        if result.name() != self.name {
            return Err(ReportError::InvalidInput(format!(
                "result for action '{}' routed to group '{}'",
                result.name(),
                self.name
            )));
        }

        if self.source.is_empty() {
            self.source = result.header.source.clone();
        }
        self.tags.extend(result.header.tags.iter().cloned());

        // ── Counters ────────────────────────────────────────────
        self.total += 1;
        match &result.header.error {
            None => self.succeeded += 1,
            Some(message) => {
                self.failed += 1;
                *self.errors.entry(message.clone()).or_insert(0) += 1;
            }
        }

        // ── Phase samples ───────────────────────────────────────
        for (phase, value) in result.header.timings.iter() {
            if value > 0.0 {
                self.timings.entry(phase).or_default().push(value);
            }
        }

        self.results.push(result);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn results(&self) -> &[ProcessedResult] {
        &self.results
    }

    pub fn take_results(&mut self) -> Vec<ProcessedResult> {
        std::mem::take(&mut self.results)
    }

    /// Median, mean, variance, stdev, minimum and maximum per phase. Each
    /// phase's point estimates are also fed to its streaming estimators.
    /// Phases without samples are summarised as `[0]`.
    pub fn calculate_partial_group_stats(&mut self) {
        for phase in Phase::ALL {
            let samples = self.timings.get(&phase).map(Vec::as_slice).unwrap_or(&[]);
            let stats = self.groups.entry(phase).or_default();
            stats.apply_moments(samples);
            self.estimators.entry(phase).or_default().update(stats);
        }
    }

    /// Fixed quantile family per phase, interpolated over the raw samples.
    pub fn calculate_quantiles(&mut self) {
        for phase in Phase::ALL {
            let samples = self.timings.get(&phase).map(Vec::as_slice).unwrap_or(&[]);
            self.groups.entry(phase).or_default().fill_quantiles(samples);
        }
    }

    /// Combine `other` into `self`.
    ///
    /// Counts, errors, samples, results and tags are unioned. For a phase
    /// both groups summarised, extremes combine exactly while median, mean,
    /// variance and stdev come from feeding `other`'s point estimates into
    /// this group's estimators, so they depend on merge order. A phase only
    /// `other` sampled is adopted as-is, estimators included; a phase `other`
    /// never sampled leaves this group untouched. Merging with
    /// a group that saw no results is the identity.
    pub fn merge(&mut self, mut other: ProcessedResultsGroup) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = ProcessedResultsGroup {
                name: std::mem::take(&mut self.name),
                stage: std::mem::take(&mut self.stage),
                ..other
            };
            return;
        }

        if self.source.is_empty() {
            self.source = std::mem::take(&mut other.source);
        }
        self.tags.append(&mut other.tags);

        self.total += other.total;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        for (message, count) in other.errors {
            *self.errors.entry(message).or_insert(0) += count;
        }

        // a phase summarised from no samples only holds the `[0]` stand-in
        let ours_sampled = sampled_phases(&self.timings);
        let theirs_sampled = sampled_phases(&other.timings);

        for (phase, samples) in other.timings {
            self.timings.entry(phase).or_default().extend(samples);
        }

        for (phase, theirs) in other.groups {
            if !theirs_sampled.contains(&phase) {
                continue;
            }
            match self.groups.get_mut(&phase) {
                Some(ours) if ours_sampled.contains(&phase) => {
                    ours.minimum = ours.minimum.min(theirs.minimum);
                    ours.maximum = ours.maximum.max(theirs.maximum);

                    let estimators = self.estimators.entry(phase).or_default();
                    estimators.update(&theirs);
                    estimators.apply(ours);
                }
                _ => {
                    self.groups.insert(phase, theirs);
                    let adopted = other.estimators.remove(&phase).unwrap_or_default();
                    self.estimators.insert(phase, adopted);
                }
            }
        }

        self.results.append(&mut other.results);
    }
}

fn sampled_phases(timings: &BTreeMap<Phase, Vec<f64>>) -> BTreeSet<Phase> {
    timings
        .iter()
        .filter(|(_, samples)| !samples.is_empty())
        .map(|(&phase, _)| phase)
        .collect()
}
