//! Uniform reporter contract and the canonical dispatch sequence.

pub mod file;
pub mod redis;
pub mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ReportError, Result};
use crate::experiments::ExperimentMetricsCollection;
use crate::metrics::{MetricsSet, StageStreamsSet, SystemMetricsSet};
use crate::results::ProcessedResult;

pub use self::file::FileReporter;
pub use self::redis::RedisReporter;
pub use self::registry::{ReporterFactory, ReporterRegistry, DEFAULT_REPORTER};

/// Upper bound on the best-effort close after a failed or cancelled dispatch.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Capabilities ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Events,
    Common,
    Metrics,
    Custom,
    Errors,
    Streams,
    Experiments,
    Variants,
    Mutations,
    SessionSystemMetrics,
    StageSystemMetrics,
}

impl Capability {
    /// Canonical submission order.
    pub const ALL: [Capability; 11] = [
        Self::Events,
        Self::Common,
        Self::Metrics,
        Self::Custom,
        Self::Errors,
        Self::Streams,
        Self::Experiments,
        Self::Variants,
        Self::Mutations,
        Self::SessionSystemMetrics,
        Self::StageSystemMetrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "submit_events",
            Self::Common => "submit_common",
            Self::Metrics => "submit_metrics",
            Self::Custom => "submit_custom",
            Self::Errors => "submit_errors",
            Self::Streams => "submit_streams",
            Self::Experiments => "submit_experiments",
            Self::Variants => "submit_variants",
            Self::Mutations => "submit_mutations",
            Self::SessionSystemMetrics => "submit_session_system_metrics",
            Self::StageSystemMetrics => "submit_stage_system_metrics",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Payload ─────────────────────────────────────────────────────

/// Immutable snapshot of everything a session produced.
#[derive(Debug, Clone, Default)]
pub struct ReportPayload {
    pub events: Vec<ProcessedResult>,
    pub metrics_sets: Vec<MetricsSet>,
    /// Keyed by stage name.
    pub streams: BTreeMap<String, StageStreamsSet>,
    pub experiments: ExperimentMetricsCollection,
    pub system_metrics: SystemMetricsSet,
}

impl ReportPayload {
    /// Whether there is anything to submit for `capability`.
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Events => !self.events.is_empty(),
            Capability::Common | Capability::Metrics => !self.metrics_sets.is_empty(),
            Capability::Custom => self
                .metrics_sets
                .iter()
                .any(|set| !set.custom_metrics.is_empty()),
            Capability::Errors => self.metrics_sets.iter().any(|set| !set.errors.is_empty()),
            Capability::Streams => !self.streams.is_empty(),
            Capability::Experiments | Capability::Variants => !self.experiments.is_empty(),
            Capability::Mutations => self
                .experiments
                .experiments
                .iter()
                .any(|experiment| !experiment.mutations.is_empty()),
            Capability::SessionSystemMetrics => !self.system_metrics.session.is_empty(),
            Capability::StageSystemMetrics => {
                !self.system_metrics.stages.is_empty() || !self.system_metrics.mb_per_vu.is_empty()
            }
        }
    }
}

// ─── Record projection ───────────────────────────────────────────

/// Flat rows for each payload category, shared by the bundled backends.
pub(crate) mod rows {
    use std::collections::BTreeMap;

    use crate::metrics::{
        CustomMetricsRecord, ErrorRecord, MetricsRecord, MetricsSet, SharedMetricsRecord,
        StageStreamsSet, StreamRecord,
    };

    pub fn shared(sets: &[MetricsSet]) -> Vec<SharedMetricsRecord> {
        sets.iter().map(MetricsSet::shared_record).collect()
    }

    pub fn metrics(sets: &[MetricsSet]) -> Vec<MetricsRecord> {
        sets.iter().flat_map(MetricsSet::metrics_records).collect()
    }

    pub fn custom(sets: &[MetricsSet]) -> Vec<CustomMetricsRecord> {
        sets.iter().filter_map(MetricsSet::custom_record).collect()
    }

    pub fn errors(sets: &[MetricsSet]) -> Vec<ErrorRecord> {
        sets.iter().flat_map(MetricsSet::error_records).collect()
    }

    pub fn streams(streams: &BTreeMap<String, StageStreamsSet>) -> Vec<StreamRecord> {
        streams
            .values()
            .flat_map(StageStreamsSet::stream_records)
            .collect()
    }
}

// ─── Reporter ────────────────────────────────────────────────────

/// A results backend. Inputs are borrowed snapshots and must not be kept
/// past the call. Capabilities a backend does not override refuse with
/// `BackendUnsupported`.
#[async_trait]
pub trait Reporter: Send {
    fn reporter_type(&self) -> &str;

    /// Static set of capabilities; dispatch skips everything else.
    fn capabilities(&self) -> &'static [Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn unsupported(&self, capability: Capability) -> ReportError {
        ReportError::BackendUnsupported {
            reporter: self.reporter_type().to_string(),
            capability,
        }
    }

    async fn connect(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    async fn submit_events(&mut self, _events: &[ProcessedResult]) -> Result<()> {
        Err(self.unsupported(Capability::Events))
    }

    async fn submit_common(&mut self, _metrics_sets: &[MetricsSet]) -> Result<()> {
        Err(self.unsupported(Capability::Common))
    }

    async fn submit_metrics(&mut self, _metrics_sets: &[MetricsSet]) -> Result<()> {
        Err(self.unsupported(Capability::Metrics))
    }

    async fn submit_custom(&mut self, _metrics_sets: &[MetricsSet]) -> Result<()> {
        Err(self.unsupported(Capability::Custom))
    }

    async fn submit_errors(&mut self, _metrics_sets: &[MetricsSet]) -> Result<()> {
        Err(self.unsupported(Capability::Errors))
    }

    async fn submit_streams(&mut self, _streams: &BTreeMap<String, StageStreamsSet>) -> Result<()> {
        Err(self.unsupported(Capability::Streams))
    }

    async fn submit_experiments(&mut self, _experiments: &ExperimentMetricsCollection) -> Result<()> {
        Err(self.unsupported(Capability::Experiments))
    }

    async fn submit_variants(&mut self, _experiments: &ExperimentMetricsCollection) -> Result<()> {
        Err(self.unsupported(Capability::Variants))
    }

    async fn submit_mutations(&mut self, _experiments: &ExperimentMetricsCollection) -> Result<()> {
        Err(self.unsupported(Capability::Mutations))
    }

    async fn submit_session_system_metrics(&mut self, _system: &SystemMetricsSet) -> Result<()> {
        Err(self.unsupported(Capability::SessionSystemMetrics))
    }

    async fn submit_stage_system_metrics(&mut self, _system: &SystemMetricsSet) -> Result<()> {
        Err(self.unsupported(Capability::StageSystemMetrics))
    }
}

// ─── Dispatch ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub submitted: Vec<Capability>,
    pub skipped: Vec<Capability>,
}

async fn cancellable<F>(cancel: &CancellationToken, step: &str, future: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReportError::Cancelled(format!("{step} abandoned"))),
        result = future => result,
    }
}

async fn submit(
    reporter: &mut dyn Reporter,
    payload: &ReportPayload,
    capability: Capability,
) -> Result<()> {
    match capability {
        Capability::Events => reporter.submit_events(&payload.events).await,
        Capability::Common => reporter.submit_common(&payload.metrics_sets).await,
        Capability::Metrics => reporter.submit_metrics(&payload.metrics_sets).await,
        Capability::Custom => reporter.submit_custom(&payload.metrics_sets).await,
        Capability::Errors => reporter.submit_errors(&payload.metrics_sets).await,
        Capability::Streams => reporter.submit_streams(&payload.streams).await,
        Capability::Experiments => reporter.submit_experiments(&payload.experiments).await,
        Capability::Variants => reporter.submit_variants(&payload.experiments).await,
        Capability::Mutations => reporter.submit_mutations(&payload.experiments).await,
        Capability::SessionSystemMetrics => {
            reporter
                .submit_session_system_metrics(&payload.system_metrics)
                .await
        }
        Capability::StageSystemMetrics => {
            reporter
                .submit_stage_system_metrics(&payload.system_metrics)
                .await
        }
    }
}

/// Close after a failed run; the original error wins.
async fn close_quietly(reporter: &mut dyn Reporter) {
    match tokio::time::timeout(CLOSE_TIMEOUT, reporter.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(reporter = reporter.reporter_type(), "close failed: {e}"),
        Err(_) => warn!(reporter = reporter.reporter_type(), "close timed out"),
    }
}

/// Submit `payload` in canonical order: connect, every capability in
/// [`Capability::ALL`] order, close.
///
/// Empty payload parts and undeclared capabilities are skipped. A backend
/// refusing a capability is logged and skipped. Any other error, or `cancel`
/// firing, stops the run; close is still attempted and the error returned.
pub async fn dispatch(
    reporter: &mut dyn Reporter,
    payload: &ReportPayload,
    cancel: &CancellationToken,
) -> Result<DispatchReport> {
    let mut report = DispatchReport::default();
    let reporter_type = reporter.reporter_type().to_string();

    cancellable(cancel, "connect", reporter.connect()).await?;
    debug!(reporter = %reporter_type, "connected");

    for capability in Capability::ALL {
        if !payload.has(capability) {
            report.skipped.push(capability);
            continue;
        }
        if !reporter.supports(capability) {
            debug!(reporter = %reporter_type, %capability, "capability not declared, skipping");
            report.skipped.push(capability);
            continue;
        }

        let outcome = cancellable(
            cancel,
            capability.as_str(),
            submit(reporter, payload, capability),
        )
        .await;

        match outcome {
            Ok(()) => report.submitted.push(capability),
            Err(e) if e.is_unsupported() => {
                warn!(reporter = %reporter_type, %capability, "backend refused capability");
                report.skipped.push(capability);
            }
            Err(e) => {
                close_quietly(reporter).await;
                return Err(e);
            }
        }
    }

    cancellable(cancel, "close", reporter.close()).await?;
    info!(
        reporter = %reporter_type,
        submitted = report.submitted.len(),
        skipped = report.skipped.len(),
        "dispatch complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{CustomMetric, MetricType, ProcessedResultsGroup};
    use crate::results::{EngineType, RawResult, Timings};

    /// Records every call it receives.
    struct Recorder {
        calls: Vec<String>,
        capabilities: &'static [Capability],
        fail_on: Option<Capability>,
        refuse: Option<Capability>,
    }

    impl Recorder {
        fn new(capabilities: &'static [Capability]) -> Self {
            Self {
                calls: Vec::new(),
                capabilities,
                fail_on: None,
                refuse: None,
            }
        }

        fn record(&mut self, capability: Capability) -> Result<()> {
            if self.refuse == Some(capability) {
                return Err(self.unsupported(capability));
            }
            self.calls.push(capability.to_string());
            if self.fail_on == Some(capability) {
                return Err(ReportError::BackendTransient {
                    backend: "recorder".into(),
                    message: "boom".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Reporter for Recorder {
        fn reporter_type(&self) -> &str {
            "recorder"
        }

        fn capabilities(&self) -> &'static [Capability] {
            self.capabilities
        }

        async fn connect(&mut self) -> Result<()> {
            self.calls.push("connect".into());
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.calls.push("close".into());
            Ok(())
        }

        async fn submit_events(&mut self, _events: &[ProcessedResult]) -> Result<()> {
            self.record(Capability::Events)
        }

        async fn submit_common(&mut self, _sets: &[MetricsSet]) -> Result<()> {
            self.record(Capability::Common)
        }

        async fn submit_metrics(&mut self, _sets: &[MetricsSet]) -> Result<()> {
            self.record(Capability::Metrics)
        }

        async fn submit_custom(&mut self, _sets: &[MetricsSet]) -> Result<()> {
            self.record(Capability::Custom)
        }

        async fn submit_errors(&mut self, _sets: &[MetricsSet]) -> Result<()> {
            self.record(Capability::Errors)
        }

        async fn submit_streams(&mut self, _streams: &BTreeMap<String, StageStreamsSet>) -> Result<()> {
            self.record(Capability::Streams)
        }
    }

    fn payload() -> ReportPayload {
        let mut group = ProcessedResultsGroup::new("login", "execute");
        for error in [None, Some("boom")] {
            let raw = RawResult {
                name: Some("login".into()),
                engine: Some(EngineType::Http),
                error: error.map(str::to_string),
                timings: Timings {
                    total: 0.2,
                    ..Timings::default()
                },
                ..RawResult::default()
            };
            group.add(raw, "execute").unwrap();
        }
        group.calculate_partial_group_stats();
        group.calculate_quantiles();

        let custom = [CustomMetric::new("retries", 3_i64, MetricType::Count)];
        let set = MetricsSet::from_group(&group, 1.0, &custom).unwrap();
        let mut streams = BTreeMap::new();
        streams.insert("execute".to_string(), StageStreamsSet::new("execute", &[]));

        ReportPayload {
            events: group.take_results(),
            metrics_sets: vec![set],
            streams,
            ..ReportPayload::default()
        }
    }

    #[tokio::test]
    async fn test_dispatch_runs_canonical_order() {
        let mut reporter = Recorder::new(&Capability::ALL);
        let report = dispatch(&mut reporter, &payload(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            reporter.calls,
            vec![
                "connect",
                "submit_events",
                "submit_common",
                "submit_metrics",
                "submit_custom",
                "submit_errors",
                "submit_streams",
                "close"
            ]
        );
        assert_eq!(report.submitted.len(), 6);
        // no experiments or system metrics in the payload
        assert!(report.skipped.contains(&Capability::Experiments));
        assert!(report.skipped.contains(&Capability::StageSystemMetrics));
    }

    #[tokio::test]
    async fn test_dispatch_skips_undeclared_and_refused() {
        let mut reporter = Recorder::new(&[Capability::Common, Capability::Metrics]);
        reporter.refuse = Some(Capability::Metrics);

        let report = dispatch(&mut reporter, &payload(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reporter.calls, vec!["connect", "submit_common", "close"]);
        assert_eq!(report.submitted, vec![Capability::Common]);
        assert!(report.skipped.contains(&Capability::Metrics));
        assert!(report.skipped.contains(&Capability::Events));
    }

    #[tokio::test]
    async fn test_dispatch_stops_on_backend_error_but_closes() {
        let mut reporter = Recorder::new(&Capability::ALL);
        reporter.fail_on = Some(Capability::Metrics);

        let err = dispatch(&mut reporter, &payload(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::BackendTransient { .. }));
        assert_eq!(reporter.calls.last().map(String::as_str), Some("close"));
        assert!(!reporter.calls.iter().any(|c| c == "submit_custom"));
    }

    #[tokio::test]
    async fn test_dispatch_honours_cancellation() {
        let mut reporter = Recorder::new(&Capability::ALL);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = dispatch(&mut reporter, &payload(), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(reporter.calls.is_empty());
    }

    #[tokio::test]
    async fn test_default_methods_refuse() {
        let mut reporter = Recorder::new(&Capability::ALL);
        let err = reporter
            .submit_variants(&ExperimentMetricsCollection::default())
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(
            err.to_string(),
            "Reporter 'recorder' does not support submit_variants"
        );
    }

    #[test]
    fn test_payload_parts() {
        let payload = payload();
        assert!(payload.has(Capability::Events));
        assert!(payload.has(Capability::Custom));
        assert!(payload.has(Capability::Errors));
        assert!(!payload.has(Capability::Mutations));
        assert!(!ReportPayload::default().has(Capability::Common));
    }
}
