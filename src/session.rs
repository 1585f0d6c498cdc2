//! Stage aggregation and the session orchestrator that turns stored stage
//! output into a [`ReportPayload`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::connectors::{Connector, StageType, WorkerResults};
use crate::error::Result;
use crate::experiments::{ExperimentMetricsCollection, VariantOutcome};
use crate::metrics::{
    CustomMetric, MetricsSet, MonitorSeries, ProcessedResultsGroup, StageMetricsSummary,
    StageStreamsSet, StreamAnalytics, SystemMetricsSet,
};
use crate::reporting::ReportPayload;
use crate::results::{ProcessedResult, RawResult};

// ─── Stage aggregator ────────────────────────────────────────────

/// Owns every action group of one stage (for one worker until merged).
/// The stage → groups index lives here; groups know nothing of their stage
/// beyond its name.
#[derive(Debug, Clone)]
pub struct StageAggregator {
    stage: String,
    groups: BTreeMap<String, ProcessedResultsGroup>,
}

impl StageAggregator {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            groups: BTreeMap::new(),
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> impl Iterator<Item = &ProcessedResultsGroup> {
        self.groups.values()
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut ProcessedResultsGroup> {
        self.groups.get_mut(name)
    }

    /// Route one raw result to its action's group.
    pub fn ingest(&mut self, raw: RawResult) -> Result<()> {
        let result = ProcessedResult::from_raw(raw, &self.stage)?;
        let group = self
            .groups
            .entry(result.name().to_string())
            .or_insert_with(|| ProcessedResultsGroup::new(result.name(), &self.stage));
        group.ingest(result)
    }

    /// Freeze every group: partial stats and quantiles.
    pub fn finish_partial(&mut self) {
        for group in self.groups.values_mut() {
            group.calculate_partial_group_stats();
            group.calculate_quantiles();
        }
    }

    pub fn merge(&mut self, other: StageAggregator) {
        for (name, group) in other.groups {
            match self.groups.entry(name) {
                Entry::Vacant(slot) => {
                    slot.insert(group);
                }
                Entry::Occupied(mut slot) => slot.get_mut().merge(group),
            }
        }
    }

    /// Final metrics sets plus the events they were built from. Quantiles
    /// are recomputed over the merged samples first.
    pub fn into_parts(
        self,
        elapsed: f64,
        custom: &[CustomMetric],
    ) -> Result<(Vec<MetricsSet>, Vec<ProcessedResult>)> {
        let mut metrics_sets = Vec::with_capacity(self.groups.len());
        let mut events = Vec::new();

        for (_, mut group) in self.groups {
            group.calculate_quantiles();
            metrics_sets.push(MetricsSet::from_group(&group, elapsed, custom)?);
            events.append(&mut group.take_results());
        }
        Ok((metrics_sets, events))
    }
}

/// Aggregate one worker's results and stream into a frozen aggregator.
fn aggregate_worker(stage: &str, worker: WorkerResults) -> Result<(StageAggregator, StreamAnalytics)> {
    let mut aggregator = StageAggregator::new(stage);
    for raw in worker.results {
        aggregator.ingest(raw)?;
    }
    aggregator.finish_partial();

    let mut stream = StreamAnalytics::new();
    for batch in &worker.streams {
        stream.add(&batch.sample, batch.batch_elapsed)?;
    }
    debug!(stage, worker = worker.worker, intervals = stream.len(), "worker aggregated");
    Ok((aggregator, stream))
}

// ─── Session ─────────────────────────────────────────────────────

/// Everything a session produced: the payload for reporters and the
/// per-stage summaries.
#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub payload: ReportPayload,
    pub summaries: Vec<StageMetricsSummary>,
}

pub struct Session;

impl Session {
    /// Load every stage through `connector`, aggregate it, and assemble the
    /// payload. The connector is connected and closed here.
    pub async fn collect(connector: &mut dyn Connector) -> Result<SessionReport> {
        connector.connect().await?;
        let outcome = Self::collect_stages(connector).await;
        let closed = connector.close().await;
        let report = outcome?;
        closed?;
        Ok(report)
    }

    async fn collect_stages(connector: &mut dyn Connector) -> Result<SessionReport> {
        let mut report = SessionReport::default();
        let mut outcomes = Vec::new();
        let mut monitors: Vec<MonitorSeries> = Vec::new();
        let mut batch_sizes = BTreeMap::new();

        for stage in connector.list_stages().await? {
            let summary = connector.load_execute_stage_summary(&stage).await?;
            let hooks = connector.load_actions(&stage).await?;
            let workers = connector.load_results(&stage).await?;

            // ── Per-worker partials, merged at the stage boundary ──
            let mut merged = StageAggregator::new(&stage);
            let mut streams = Vec::with_capacity(workers.len());
            for worker in workers {
                let (aggregator, stream) = aggregate_worker(&stage, worker)?;
                merged.merge(aggregator);
                if !stream.is_empty() {
                    streams.push(stream);
                }
            }

            for hook in &hooks {
                if let Some(group) = merged.group_mut(&hook.name) {
                    group.tags.extend(hook.tags.iter().cloned());
                }
            }

            let (metrics_sets, events) = if merged.is_empty() {
                (Vec::new(), Vec::new())
            } else {
                merged.into_parts(summary.total_elapsed, &summary.custom_metrics)?
            };

            if !streams.is_empty() {
                report
                    .payload
                    .streams
                    .insert(stage.clone(), StageStreamsSet::new(&stage, &streams));
            }

            let stage_summary = StageMetricsSummary::new(&stage, &metrics_sets, &streams)?;
            info!(
                stage = %stage,
                actions = metrics_sets.len(),
                total = stage_summary.total,
                succeeded = stage_summary.succeeded,
                failed = stage_summary.failed,
                aps = stage_summary.actions_per_second,
                "stage aggregated"
            );

            if let Some(assignment) = summary.experiment {
                outcomes.push((
                    assignment.experiment,
                    VariantOutcome::from_summary(assignment.variant, &stage_summary),
                ));
            }

            match (summary.stage_type, summary.batch_size) {
                (StageType::Execute, Some(batch_size)) => {
                    batch_sizes.insert(stage.clone(), batch_size);
                }
                (StageType::Execute, None) if !summary.monitors.is_empty() => {
                    warn!(stage = %stage, "execute stage has monitors but no batch size");
                }
                _ => {}
            }
            monitors.extend(summary.monitors);

            report.payload.metrics_sets.extend(metrics_sets);
            report.payload.events.extend(events);
            report.summaries.push(stage_summary);
        }

        report.payload.experiments = ExperimentMetricsCollection::from_outcomes(outcomes);
        report.payload.system_metrics = SystemMetricsSet::new(&monitors, &batch_sizes);
        Ok(report)
    }
}
