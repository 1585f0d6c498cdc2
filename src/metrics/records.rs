//! Flat records handed to reporters. Each one serialises to a single JSON
//! object with no nesting, so file, list and channel backends can store
//! them as rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::metrics_set::MetricValue;
use super::percentiles::StatSummary;

/// Per-phase statistics of one action: `group` is the phase name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub name: String,
    pub stage: String,
    pub group: String,
    #[serde(flatten)]
    pub stats: StatSummary,
    /// Custom metrics declared against this phase.
    #[serde(flatten)]
    pub custom: BTreeMap<String, MetricValue>,
}

/// Counters and throughput of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedMetricsRecord {
    pub name: String,
    pub stage: String,
    pub group: String,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub actions_per_second: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMetricsRecord {
    pub name: String,
    pub stage: String,
    pub group: String,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, MetricValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub name: String,
    pub stage: String,
    pub error_message: String,
    pub error_count: u64,
}

/// One stream stat group of a stage; `name` is `<stage>_streams`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub name: String,
    pub stage: String,
    pub group: String,
    #[serde(flatten)]
    pub stats: StatSummary,
}

/// CPU or memory monitor statistics. `stage` is absent on session records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetricsRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub name: String,
    pub group: String,
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub min: f64,
    pub stdev: f64,
    pub variance: f64,
    #[serde(flatten)]
    pub quantiles: BTreeMap<String, f64>,
}
