use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::results::Phase;
use crate::tag::Tag;

use super::group::ProcessedResultsGroup;
use super::percentiles::{finite, quantile_labels, round2, StatSummary};
use super::records::{CustomMetricsRecord, ErrorRecord, MetricsRecord, SharedMetricsRecord};

const CUSTOM_GROUP: &str = "custom";
const COMMON_GROUP: &str = "common";

/// Identity keys of every flat record a custom metric is written into.
const RECORD_KEYS: [&str; 3] = ["name", "stage", "group"];

// ─── Custom metrics ──────────────────────────────────────────────

/// How a backend should interpret a custom metric's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    Count,
    Rate,
    Distribution,
    Sample,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Count => "COUNT",
            Self::Rate => "RATE",
            Self::Distribution => "DISTRIBUTION",
            Self::Sample => "SAMPLE",
        };
        f.write_str(name)
    }
}

/// Integers stay integers on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Integer(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    fn sanitized(self) -> Self {
        match self {
            Self::Float(v) => Self::Float(finite(v)),
            integer => integer,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

fn default_custom_group() -> String {
    CUSTOM_GROUP.to_string()
}

/// A user-declared scalar attached to a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMetric {
    pub name: String,
    #[serde(default)]
    pub short_name: String,
    pub value: MetricValue,
    /// `custom`, or a phase name to attach the metric to that phase's record.
    #[serde(default = "default_custom_group")]
    pub group: String,
    pub metric_type: MetricType,
}

impl CustomMetric {
    pub fn new(name: impl Into<String>, value: impl Into<MetricValue>, metric_type: MetricType) -> Self {
        let name = name.into();
        Self {
            short_name: name.clone(),
            name,
            value: value.into(),
            group: default_custom_group(),
            metric_type,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Custom metrics share a flat record with its identity keys and the
    /// phase statistics, so their names must not shadow either.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ReportError::InvalidInput("custom metric has an empty name".into()));
        }
        let reserved = RECORD_KEYS.contains(&self.name.as_str())
            || StatSummary::default()
                .fields()
                .iter()
                .any(|(field, _)| *field == self.name);
        if reserved {
            return Err(ReportError::InvalidInput(format!(
                "custom metric '{}' collides with a built-in record field",
                self.name
            )));
        }
        Ok(())
    }

    /// COUNT metrics carrying a whole float become integers; non-finite
    /// floats become 0; an empty short name falls back to the name.
    pub fn normalized(mut self) -> Self {
        if let (MetricType::Count, MetricValue::Float(v)) = (self.metric_type, self.value) {
            if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                self.value = MetricValue::Integer(v as i64);
            }
        }
        self.value = self.value.sanitized();
        if self.short_name.is_empty() {
            self.short_name = self.name.clone();
        }
        self
    }
}

// ─── Common stats ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub actions_per_second: f64,
}

/// `round(total / elapsed, 2)`. A stage that took no time cannot have a rate.
pub fn actions_per_second(total: u64, elapsed: f64) -> Result<f64> {
    if !elapsed.is_finite() || elapsed <= 0.0 {
        return Err(ReportError::InvariantViolation(format!(
            "stage elapsed time must be positive to derive a rate (got {elapsed})"
        )));
    }
    Ok(round2(total as f64 / elapsed))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub message: String,
    pub count: u64,
}

// ─── Metrics group / set ─────────────────────────────────────────

/// Final statistics for one phase of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsGroup {
    pub phase: Phase,
    pub stats: StatSummary,
    #[serde(default)]
    pub custom: BTreeMap<String, MetricValue>,
}

impl MetricsGroup {
    pub fn record(&self, name: &str, stage: &str) -> MetricsRecord {
        MetricsRecord {
            name: name.to_string(),
            stage: stage.to_string(),
            group: self.phase.to_string(),
            stats: self.stats,
            custom: self.custom.clone(),
        }
    }
}

/// The uniform, immutable model emitted for one action of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSet {
    pub name: String,
    pub source: String,
    pub stage: String,
    pub common_stats: CommonStats,
    pub groups: BTreeMap<Phase, MetricsGroup>,
    pub custom_metrics: BTreeMap<String, CustomMetric>,
    pub errors: Vec<ErrorCount>,
    pub tags: Vec<Tag>,
    pub quantiles: Vec<String>,
}

impl MetricsSet {
    /// Build from a frozen group. `elapsed` is the stage's wall time in
    /// seconds; `custom` holds the metrics declared for the stage.
    pub fn from_group(
        group: &ProcessedResultsGroup,
        elapsed: f64,
        custom: &[CustomMetric],
    ) -> Result<Self> {
        let common_stats = CommonStats {
            total: group.total,
            succeeded: group.succeeded,
            failed: group.failed,
            actions_per_second: actions_per_second(group.total, elapsed)?,
        };

        let custom_metrics = custom
            .iter()
            .cloned()
            .map(|metric| {
                let metric = metric.normalized();
                metric.validate()?;
                Ok((metric.name.clone(), metric))
            })
            .collect::<Result<BTreeMap<String, CustomMetric>>>()?;

        let groups = Phase::ALL
            .into_iter()
            .map(|phase| {
                let stats = group
                    .groups
                    .get(&phase)
                    .copied()
                    .unwrap_or_default()
                    .sanitized();
                let custom = custom_metrics
                    .values()
                    .filter(|metric| metric.group == phase.as_str())
                    .map(|metric| (metric.name.clone(), metric.value))
                    .collect();
                (phase, MetricsGroup { phase, stats, custom })
            })
            .collect();

        let errors = group
            .errors
            .iter()
            .map(|(message, &count)| ErrorCount {
                message: message.clone(),
                count,
            })
            .collect();

        Ok(Self {
            name: group.name.clone(),
            source: group.source.clone(),
            stage: group.stage.clone(),
            common_stats,
            groups,
            custom_metrics,
            errors,
            tags: group.tags.iter().cloned().collect(),
            quantiles: quantile_labels(),
        })
    }

    pub fn group(&self, phase: Phase) -> Option<&MetricsGroup> {
        self.groups.get(&phase)
    }

    // ── Records ─────────────────────────────────────────────────

    pub fn metrics_records(&self) -> Vec<MetricsRecord> {
        self.groups
            .values()
            .map(|group| group.record(&self.name, &self.stage))
            .collect()
    }

    pub fn shared_record(&self) -> SharedMetricsRecord {
        SharedMetricsRecord {
            name: self.name.clone(),
            stage: self.stage.clone(),
            group: COMMON_GROUP.to_string(),
            total: self.common_stats.total,
            succeeded: self.common_stats.succeeded,
            failed: self.common_stats.failed,
            actions_per_second: finite(self.common_stats.actions_per_second),
        }
    }

    /// `None` when the stage declared no custom metrics.
    pub fn custom_record(&self) -> Option<CustomMetricsRecord> {
        if self.custom_metrics.is_empty() {
            return None;
        }
        Some(CustomMetricsRecord {
            name: self.name.clone(),
            stage: self.stage.clone(),
            group: CUSTOM_GROUP.to_string(),
            metrics: self
                .custom_metrics
                .values()
                .map(|metric| (metric.name.clone(), metric.value))
                .collect(),
        })
    }

    pub fn error_records(&self) -> Vec<ErrorRecord> {
        self.errors
            .iter()
            .map(|error| ErrorRecord {
                name: self.name.clone(),
                stage: self.stage.clone(),
                error_message: error.message.clone(),
                error_count: error.count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{EngineType, RawResult, Timings};

    fn frozen_group(totals: &[f64], errors: &[&str]) -> ProcessedResultsGroup {
        let mut group = ProcessedResultsGroup::new("get_users", "execute");
        for &total in totals {
            let raw = RawResult {
                name: Some("get_users".into()),
                engine: Some(EngineType::Http),
                timings: Timings {
                    total,
                    ..Timings::default()
                },
                tags: vec![Tag::new("service", "users")],
                ..RawResult::default()
            };
            group.add(raw, "execute").unwrap();
        }
        for &message in errors {
            let raw = RawResult {
                name: Some("get_users".into()),
                engine: Some(EngineType::Http),
                error: Some(message.into()),
                ..RawResult::default()
            };
            group.add(raw, "execute").unwrap();
        }
        group.calculate_partial_group_stats();
        group.calculate_quantiles();
        group
    }

    #[test]
    fn test_single_action_metrics() {
        let group = frozen_group(&[0.10, 0.20, 0.30], &[]);
        let set = MetricsSet::from_group(&group, 1.0, &[]).unwrap();

        assert_eq!(set.common_stats.total, 3);
        assert_eq!(set.common_stats.succeeded, 3);
        assert_eq!(set.common_stats.failed, 0);
        assert_eq!(set.quantiles.len(), 13);
        assert_eq!(set.tags, vec![Tag::new("service", "users")]);

        let records = set.metrics_records();
        assert_eq!(records.len(), Phase::ALL.len());
        let total = records.iter().find(|r| r.group == "total").unwrap();
        assert!((total.stats.mean - 0.20).abs() < 1e-9);
        assert!((total.stats.median - 0.20).abs() < 1e-9);
        assert!((total.stats.minimum - 0.10).abs() < 1e-9);
        assert!((total.stats.maximum - 0.30).abs() < 1e-9);
        assert!((total.stats.quantile_50th - 0.20).abs() < 1e-9);
        assert!((total.stats.quantile_10th - 0.12).abs() < 1e-9);
        assert!((total.stats.quantile_90th - 0.28).abs() < 1e-9);
    }

    #[test]
    fn test_actions_per_second() {
        assert_eq!(actions_per_second(500, 10.0).unwrap(), 50.0);
        assert_eq!(actions_per_second(10, 3.0).unwrap(), 3.33);
        assert!(matches!(
            actions_per_second(500, 0.0),
            Err(ReportError::InvariantViolation(_))
        ));
        assert!(actions_per_second(500, f64::NAN).is_err());

        let group = frozen_group(&[0.1], &[]);
        assert!(MetricsSet::from_group(&group, 0.0, &[]).is_err());
    }

    #[test]
    fn test_error_records_are_ordered() {
        let group = frozen_group(&[0.1], &["timeout", "refused", "timeout"]);
        let set = MetricsSet::from_group(&group, 2.0, &[]).unwrap();

        let records = set.error_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].error_message, "refused");
        assert_eq!(records[1].error_message, "timeout");
        assert_eq!(records[1].error_count, 2);

        let shared = set.shared_record();
        assert_eq!(shared.group, "common");
        assert_eq!(shared.total, 4);
        assert_eq!(shared.failed, 3);
        assert_eq!(shared.actions_per_second, 2.0);
    }

    #[test]
    fn test_count_metric_stays_integer() {
        let group = frozen_group(&[0.1], &[]);
        let custom = [
            CustomMetric::new("cache_hits", 7.0, MetricType::Count),
            CustomMetric::new("hit_rate", 0.5, MetricType::Rate),
            CustomMetric::new("ttfb", 0.02, MetricType::Sample).with_group("waiting"),
        ];
        let set = MetricsSet::from_group(&group, 1.0, &custom).unwrap();

        let record = set.custom_record().unwrap();
        assert_eq!(record.group, "custom");
        assert_eq!(record.metrics["cache_hits"], MetricValue::Integer(7));

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"cache_hits\":7,") || json.contains("\"cache_hits\":7}"));
        assert!(json.contains("\"hit_rate\":0.5"));

        let waiting = set.group(Phase::Waiting).unwrap();
        assert_eq!(waiting.custom["ttfb"], MetricValue::Float(0.02));
        assert!(set.group(Phase::Total).unwrap().custom.is_empty());
    }

    #[test]
    fn test_custom_metric_cannot_shadow_record_fields() {
        let group = frozen_group(&[0.1, 0.3], &[]);
        for name in ["mean", "median", "quantile_90th", "minimum", "name", "stage", "group", " "] {
            let custom = [CustomMetric::new(name, 7_i64, MetricType::Count).with_group("total")];
            let err = MetricsSet::from_group(&group, 1.0, &custom).unwrap_err();
            assert!(matches!(err, ReportError::InvalidInput(_)), "{name}");
        }

        // a free name still lands beside the phase statistics and decodes back
        let custom = [CustomMetric::new("retries", 7_i64, MetricType::Count).with_group("total")];
        let set = MetricsSet::from_group(&group, 1.0, &custom).unwrap();
        let record = set.group(Phase::Total).unwrap().record(&set.name, &set.stage);
        let json = serde_json::to_string(&record).unwrap();
        let decoded: MetricsRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.custom, record.custom);
        assert_eq!(decoded.custom["retries"], MetricValue::Integer(7));
        assert!((decoded.stats.mean - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_no_custom_record_without_declarations() {
        let group = frozen_group(&[0.1], &[]);
        let set = MetricsSet::from_group(&group, 1.0, &[]).unwrap();
        assert!(set.custom_record().is_none());
    }

    #[test]
    fn test_metrics_set_round_trip() {
        let group = frozen_group(&[0.1, 0.4], &["boom"]);
        let set = MetricsSet::from_group(
            &group,
            4.0,
            &[CustomMetric::new("bytes", 1024_i64, MetricType::Count)],
        )
        .unwrap();
        let decoded: MetricsSet =
            serde_json::from_str(&serde_json::to_string(&set).unwrap()).unwrap();
        assert_eq!(decoded, set);
    }
}
