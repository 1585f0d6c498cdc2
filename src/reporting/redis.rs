use std::collections::BTreeMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::Serialize;
use tracing::{debug, info};

use super::{rows, Capability, Reporter};
use crate::config::{RedisChannelType, RedisReporterConfig};
use crate::error::{ReportError, Result};
use crate::experiments::ExperimentMetricsCollection;
use crate::metrics::{MetricsSet, StageStreamsSet, SystemMetricsSet};
use crate::results::ProcessedResult;

pub const REPORTER_TYPE: &str = "redis";

/// Pushes each payload category as JSON strings to `<prefix>:<category>`,
/// either onto a list (`RPUSH`) or a pub/sub channel (`PUBLISH`).
///
/// `ConnectionManager` reconnects on its own, so one is opened per reporter
/// at `connect` and dropped at `close`.
pub struct RedisReporter {
    config: RedisReporterConfig,
    connection: Option<ConnectionManager>,
}

impl RedisReporter {
    pub fn new(config: RedisReporterConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    pub fn key(&self, category: &str) -> String {
        format!("{}:{}", self.config.prefix, category)
    }

    async fn push<T: Serialize + Sync>(&mut self, category: &str, records: &[T]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let key = self.key(category);
        let payloads = records
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let connection = self.connection.as_mut().ok_or_else(|| ReportError::BackendTransient {
            backend: REPORTER_TYPE.into(),
            message: "not connected".into(),
        })?;

        // One round-trip per category
        let mut pipe = redis::pipe();
        match self.config.channel_type {
            RedisChannelType::List => {
                pipe.cmd("RPUSH").arg(&key).arg(&payloads).ignore();
            }
            RedisChannelType::Channel => {
                for payload in &payloads {
                    pipe.cmd("PUBLISH").arg(&key).arg(payload).ignore();
                }
            }
        }
        let _: () = pipe.query_async(connection).await?;

        debug!(%key, records = payloads.len(), "pushed to redis");
        Ok(())
    }
}

#[async_trait]
impl Reporter for RedisReporter {
    fn reporter_type(&self) -> &str {
        REPORTER_TYPE
    }

    fn capabilities(&self) -> &'static [Capability] {
        &Capability::ALL
    }

    async fn connect(&mut self) -> Result<()> {
        let client = redis::Client::open(self.config.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        info!(url = %self.config.url, channel_type = ?self.config.channel_type, "redis reporter connected");
        self.connection = Some(manager);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.connection.take().is_some() {
            debug!("redis reporter closed");
        }
        Ok(())
    }

    async fn submit_events(&mut self, events: &[ProcessedResult]) -> Result<()> {
        self.push("events", events).await
    }

    async fn submit_common(&mut self, metrics_sets: &[MetricsSet]) -> Result<()> {
        self.push("shared", &rows::shared(metrics_sets)).await
    }

    async fn submit_metrics(&mut self, metrics_sets: &[MetricsSet]) -> Result<()> {
        self.push("metrics", &rows::metrics(metrics_sets)).await
    }

    async fn submit_custom(&mut self, metrics_sets: &[MetricsSet]) -> Result<()> {
        self.push("custom", &rows::custom(metrics_sets)).await
    }

    async fn submit_errors(&mut self, metrics_sets: &[MetricsSet]) -> Result<()> {
        self.push("errors", &rows::errors(metrics_sets)).await
    }

    async fn submit_streams(&mut self, streams: &BTreeMap<String, StageStreamsSet>) -> Result<()> {
        self.push("streams", &rows::streams(streams)).await
    }

    async fn submit_experiments(&mut self, experiments: &ExperimentMetricsCollection) -> Result<()> {
        self.push("experiments", &experiments.experiment_summaries())
            .await
    }

    async fn submit_variants(&mut self, experiments: &ExperimentMetricsCollection) -> Result<()> {
        self.push("variants", &experiments.variant_summaries()).await
    }

    async fn submit_mutations(&mut self, experiments: &ExperimentMetricsCollection) -> Result<()> {
        self.push("mutations", &experiments.mutation_summaries())
            .await
    }

    async fn submit_session_system_metrics(&mut self, system: &SystemMetricsSet) -> Result<()> {
        self.push("session_system_metrics", &system.session_records())
            .await
    }

    async fn submit_stage_system_metrics(&mut self, system: &SystemMetricsSet) -> Result<()> {
        self.push("stage_system_metrics", &system.stage_records())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ErrorRecord, StatSummary};

    fn config() -> RedisReporterConfig {
        RedisReporterConfig {
            url: "redis://127.0.0.1:6379/".into(),
            prefix: "nightly".into(),
            channel_type: RedisChannelType::List,
        }
    }

    #[test]
    fn test_keys_use_prefix() {
        let reporter = RedisReporter::new(config());
        assert_eq!(reporter.key("metrics"), "nightly:metrics");
        assert_eq!(reporter.capabilities().len(), Capability::ALL.len());
    }

    #[tokio::test]
    async fn test_submit_before_connect_is_transient() {
        let mut reporter = RedisReporter::new(config());
        let rows = vec![ErrorRecord {
            name: "login".into(),
            stage: "execute".into(),
            error_message: "timeout".into(),
            error_count: 1,
        }];

        let err = reporter.push("errors", &rows).await.unwrap_err();
        assert!(matches!(err, ReportError::BackendTransient { .. }));

        // nothing to send never needs a connection
        let none: Vec<StatSummary> = Vec::new();
        reporter.push("streams", &none).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_url_fails_on_connect() {
        let mut reporter = RedisReporter::new(RedisReporterConfig {
            url: "not a redis url".into(),
            ..config()
        });
        let err = reporter.connect().await.unwrap_err();
        assert!(matches!(err, ReportError::BackendTransient { .. }));
        reporter.close().await.unwrap();
    }
}
