use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::percentiles::{quantile_label, StatSummary};
use super::records::SystemMetricsRecord;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorGroup {
    Cpu,
    Memory,
}

impl MonitorGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for MonitorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw samples from one CPU or memory monitor during one stage.
/// Memory samples are in bytes, CPU samples in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSeries {
    pub stage: String,
    pub name: String,
    pub group: MonitorGroup,
    #[serde(default)]
    pub samples: Vec<f64>,
    /// Whether per-VU memory should be derived from this monitor.
    #[serde(default)]
    pub visibility: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetricsGroup {
    pub stage: Option<String>,
    pub name: String,
    pub group: MonitorGroup,
    pub stats: StatSummary,
}

impl SystemMetricsGroup {
    pub fn new(stage: Option<String>, name: impl Into<String>, group: MonitorGroup, samples: &[f64]) -> Self {
        Self {
            stage,
            name: name.into(),
            group,
            stats: StatSummary::from_samples(samples).sanitized(),
        }
    }

    pub fn record(&self) -> SystemMetricsRecord {
        SystemMetricsRecord {
            stage: self.stage.clone(),
            name: self.name.clone(),
            group: self.group.to_string(),
            mean: self.stats.mean,
            median: self.stats.median,
            max: self.stats.maximum,
            min: self.stats.minimum,
            stdev: self.stats.stdev,
            variance: self.stats.variance,
            quantiles: self
                .stats
                .quantiles()
                .into_iter()
                .map(|(q, value)| (quantile_label(q), value))
                .collect(),
        }
    }
}

/// CPU and memory statistics per stage, per session, and memory per VU.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetricsSet {
    pub stages: Vec<SystemMetricsGroup>,
    pub session: Vec<SystemMetricsGroup>,
    pub mb_per_vu: Vec<SystemMetricsGroup>,
}

type SeriesKey = (String, MonitorGroup);

impl SystemMetricsSet {
    /// `batch_sizes` maps execute stages to their VU count; only those
    /// stages get per-VU memory.
    pub fn new(series: &[MonitorSeries], batch_sizes: &BTreeMap<String, u64>) -> Self {
        // first-seen order keeps stages in execution order
        let mut per_stage: Vec<(String, SeriesKey, Vec<f64>)> = Vec::new();
        let mut per_session: Vec<(SeriesKey, Vec<f64>)> = Vec::new();
        let mut mb_per_vu = Vec::new();

        for monitor in series {
            let key = (monitor.name.clone(), monitor.group);

            match per_stage
                .iter_mut()
                .find(|(stage, k, _)| *stage == monitor.stage && *k == key)
            {
                Some((_, _, samples)) => samples.extend_from_slice(&monitor.samples),
                None => per_stage.push((monitor.stage.clone(), key.clone(), monitor.samples.clone())),
            }

            match per_session.iter_mut().find(|(k, _)| *k == key) {
                Some((_, samples)) => samples.extend_from_slice(&monitor.samples),
                None => per_session.push((key, monitor.samples.clone())),
            }

            if monitor.group == MonitorGroup::Memory && monitor.visibility {
                if let Some(&batch_size) = batch_sizes.get(&monitor.stage).filter(|&&b| b > 0) {
                    let divisor = BYTES_PER_MB * batch_size as f64;
                    let samples: Vec<f64> = monitor.samples.iter().map(|v| v / divisor).collect();
                    mb_per_vu.push(SystemMetricsGroup::new(
                        Some(monitor.stage.clone()),
                        format!("{}_mb_per_vu", monitor.name),
                        MonitorGroup::Memory,
                        &samples,
                    ));
                }
            }
        }

        Self {
            stages: per_stage
                .into_iter()
                .map(|(stage, (name, group), samples)| {
                    SystemMetricsGroup::new(Some(stage), name, group, &samples)
                })
                .collect(),
            session: per_session
                .into_iter()
                .map(|((name, group), samples)| SystemMetricsGroup::new(None, name, group, &samples))
                .collect(),
            mb_per_vu,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty() && self.session.is_empty() && self.mb_per_vu.is_empty()
    }

    /// Per-stage records followed by the per-VU memory records.
    pub fn stage_records(&self) -> Vec<SystemMetricsRecord> {
        self.stages
            .iter()
            .chain(&self.mb_per_vu)
            .map(SystemMetricsGroup::record)
            .collect()
    }

    pub fn session_records(&self) -> Vec<SystemMetricsRecord> {
        self.session.iter().map(SystemMetricsGroup::record).collect()
    }
}
