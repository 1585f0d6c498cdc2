use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

use super::percentiles::{finite, floor_denominator, quantile_labels, round2, StatSummary};
use super::records::StreamRecord;

// ─── Worker side ─────────────────────────────────────────────────

/// Counts a worker observed during one stream interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSample {
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Total timings of the actions completed in the interval.
    #[serde(default)]
    pub timings: Vec<f64>,
}

/// One worker's interval series. All sequences share the same index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamAnalytics {
    pub completion_rates: Vec<f64>,
    pub completed_counts: Vec<u64>,
    pub succeeded_counts: Vec<u64>,
    pub failed_counts: Vec<u64>,
    pub batch_timings: Vec<f64>,
    pub timings: Vec<Vec<f64>>,
}

impl StreamAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one interval. `batch_elapsed` is the interval length in seconds.
    pub fn add(&mut self, sample: &StreamSample, batch_elapsed: f64) -> Result<()> {
        if !batch_elapsed.is_finite() || batch_elapsed <= 0.0 {
            return Err(ReportError::InvalidInput(format!(
                "stream interval must have a positive duration (got {batch_elapsed})"
            )));
        }

        self.completion_rates.push(sample.completed as f64 / batch_elapsed);
        self.completed_counts.push(sample.completed);
        self.succeeded_counts.push(sample.succeeded);
        self.failed_counts.push(sample.failed);
        self.batch_timings.push(batch_elapsed);
        self.timings.push(sample.timings.clone());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.completed_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed_counts.is_empty()
    }
}

// ─── Stage side ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamGroup {
    Completed,
    Succeeded,
    Failed,
    BatchTime,
    CompletionRate,
}

impl StreamGroup {
    pub const ALL: [StreamGroup; 5] = [
        Self::Completed,
        Self::Succeeded,
        Self::Failed,
        Self::BatchTime,
        Self::CompletionRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::BatchTime => "batch_time",
            Self::CompletionRate => "completion_rate",
        }
    }
}

impl fmt::Display for StreamGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every worker's stream of one stage, concatenated and summarised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStreamsSet {
    pub stage: String,
    pub groups: BTreeMap<StreamGroup, StatSummary>,
    pub actions_per_second: f64,
    pub actions_per_second_succeeded: f64,
    pub actions_per_second_failed: f64,
    pub quantiles: Vec<String>,
}

impl StageStreamsSet {
    /// Summarise every worker's intervals per group. Stream APS divides each
    /// group's median by the median batch time, which only falls back to 1
    /// when it is not positive; a positive median below 1 s is used as-is.
    pub fn new(stage: impl Into<String>, streams: &[StreamAnalytics]) -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(
            StreamGroup::Completed,
            StatSummary::from_samples(&concat_counts(streams.iter().map(|s| &s.completed_counts))),
        );
        groups.insert(
            StreamGroup::Succeeded,
            StatSummary::from_samples(&concat_counts(streams.iter().map(|s| &s.succeeded_counts))),
        );
        groups.insert(
            StreamGroup::Failed,
            StatSummary::from_samples(&concat_counts(streams.iter().map(|s| &s.failed_counts))),
        );
        groups.insert(
            StreamGroup::BatchTime,
            StatSummary::from_samples(&concat(streams.iter().map(|s| &s.batch_timings))),
        );
        groups.insert(
            StreamGroup::CompletionRate,
            StatSummary::from_samples(&concat(streams.iter().map(|s| &s.completion_rates))),
        );
        for stats in groups.values_mut() {
            *stats = stats.sanitized();
        }

        let batch_time = floor_denominator(groups[&StreamGroup::BatchTime].median);
        let rate = |group: StreamGroup| finite(round2(groups[&group].median / batch_time));

        Self {
            stage: stage.into(),
            actions_per_second: rate(StreamGroup::Completed),
            actions_per_second_succeeded: rate(StreamGroup::Succeeded),
            actions_per_second_failed: rate(StreamGroup::Failed),
            groups,
            quantiles: quantile_labels(),
        }
    }

    pub fn name(&self) -> String {
        format!("{}_streams", self.stage)
    }

    pub fn group(&self, group: StreamGroup) -> Option<&StatSummary> {
        self.groups.get(&group)
    }

    /// Flat view keyed `<stat>_<group>`, e.g. `median_completed`.
    pub fn record(&self) -> BTreeMap<String, f64> {
        let mut record = BTreeMap::new();
        for (group, stats) in &self.groups {
            for (field, value) in stats.fields() {
                record.insert(format!("{field}_{group}"), value);
            }
        }
        record.insert("actions_per_second".into(), self.actions_per_second);
        record.insert(
            "actions_per_second_succeeded".into(),
            self.actions_per_second_succeeded,
        );
        record.insert("actions_per_second_failed".into(), self.actions_per_second_failed);
        record
    }

    pub fn stream_records(&self) -> Vec<StreamRecord> {
        let name = self.name();
        self.groups
            .iter()
            .map(|(group, stats)| StreamRecord {
                name: name.clone(),
                stage: self.stage.clone(),
                group: group.to_string(),
                stats: *stats,
            })
            .collect()
    }
}

fn concat_counts<'a>(series: impl Iterator<Item = &'a Vec<u64>>) -> Vec<f64> {
    series.flatten().map(|&c| c as f64).collect()
}

fn concat<'a>(series: impl Iterator<Item = &'a Vec<f64>>) -> Vec<f64> {
    series.flatten().copied().collect()
}
