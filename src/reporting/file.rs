use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{rows, Capability, Reporter};
use crate::config::{FileReporterConfig, WritePolicy};
use crate::error::Result;
use crate::experiments::ExperimentMetricsCollection;
use crate::metrics::{MetricsSet, StageStreamsSet, SystemMetricsSet};
use crate::pool::WorkerPool;
use crate::results::ProcessedResult;

pub const REPORTER_TYPE: &str = "json";

/// Local JSON output: one file per payload category under `directory`.
/// The default backend.
pub struct FileReporter {
    config: FileReporterConfig,
    pool: WorkerPool,
}

impl FileReporter {
    pub fn new(config: FileReporterConfig, pool: WorkerPool) -> Self {
        Self { config, pool }
    }

    pub fn path(&self, category: &str) -> PathBuf {
        self.config.directory.join(format!("{category}.json"))
    }

    async fn write<T: Serialize>(&self, category: &str, records: &[T]) -> Result<()> {
        let path = self.path(category);
        let policy = self.config.policy;

        let bytes = match policy {
            WritePolicy::Overwrite => serde_json::to_vec_pretty(records)?,
            WritePolicy::Append => {
                let mut lines = Vec::new();
                for record in records {
                    serde_json::to_writer(&mut lines, record)?;
                    lines.push(b'\n');
                }
                lines
            }
        };

        debug!(path = %path.display(), records = records.len(), ?policy, "writing");
        self.pool
            .run(move || {
                match policy {
                    WritePolicy::Overwrite => fs::write(&path, &bytes)?,
                    WritePolicy::Append => OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)?
                        .write_all(&bytes)?,
                }
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl Reporter for FileReporter {
    fn reporter_type(&self) -> &str {
        REPORTER_TYPE
    }

    fn capabilities(&self) -> &'static [Capability] {
        &Capability::ALL
    }

    async fn connect(&mut self) -> Result<()> {
        let directory = self.config.directory.clone();
        info!(directory = %directory.display(), "json reporter ready");
        self.pool
            .run(move || {
                fs::create_dir_all(&directory)?;
                Ok(())
            })
            .await
    }

    async fn close(&mut self) -> Result<()> {
        debug!(directory = %self.config.directory.display(), "json reporter closed");
        Ok(())
    }

    async fn submit_events(&mut self, events: &[ProcessedResult]) -> Result<()> {
        self.write("events", events).await
    }

    async fn submit_common(&mut self, metrics_sets: &[MetricsSet]) -> Result<()> {
        self.write("shared", &rows::shared(metrics_sets)).await
    }

    async fn submit_metrics(&mut self, metrics_sets: &[MetricsSet]) -> Result<()> {
        self.write("metrics", &rows::metrics(metrics_sets)).await
    }

    async fn submit_custom(&mut self, metrics_sets: &[MetricsSet]) -> Result<()> {
        self.write("custom", &rows::custom(metrics_sets)).await
    }

    async fn submit_errors(&mut self, metrics_sets: &[MetricsSet]) -> Result<()> {
        self.write("errors", &rows::errors(metrics_sets)).await
    }

    async fn submit_streams(&mut self, streams: &BTreeMap<String, StageStreamsSet>) -> Result<()> {
        self.write("streams", &rows::streams(streams)).await
    }

    async fn submit_experiments(&mut self, experiments: &ExperimentMetricsCollection) -> Result<()> {
        self.write("experiments", &experiments.experiment_summaries())
            .await
    }

    async fn submit_variants(&mut self, experiments: &ExperimentMetricsCollection) -> Result<()> {
        self.write("variants", &experiments.variant_summaries()).await
    }

    async fn submit_mutations(&mut self, experiments: &ExperimentMetricsCollection) -> Result<()> {
        self.write("mutations", &experiments.mutation_summaries())
            .await
    }

    async fn submit_session_system_metrics(&mut self, system: &SystemMetricsSet) -> Result<()> {
        self.write("session_system_metrics", &system.session_records())
            .await
    }

    async fn submit_stage_system_metrics(&mut self, system: &SystemMetricsSet) -> Result<()> {
        self.write("stage_system_metrics", &system.stage_records())
            .await
    }
}
