//! Uniform connector contract: loading previously stored actions, results
//! and stage summaries back into the engine.

pub mod file;
pub mod parser;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ConnectorConfig;
use crate::error::Result;
use crate::experiments::VariantAssignment;
use crate::metrics::{CustomMetric, MonitorSeries, StreamSample};
use crate::pool::WorkerPool;
use crate::results::RawResult;

pub use self::file::{FileConnector, StoredSession, StoredStage};
pub use self::parser::{ActionHook, ActionSpec, Parser};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageType {
    Setup,
    Warmup,
    #[default]
    Execute,
    Teardown,
}

/// One stream interval as a worker recorded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamBatch {
    #[serde(flatten)]
    pub sample: StreamSample,
    /// Interval length in seconds.
    pub batch_elapsed: f64,
}

/// Everything one worker produced during a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerResults {
    pub worker: u32,
    #[serde(default)]
    pub results: Vec<RawResult>,
    #[serde(default)]
    pub streams: Vec<StreamBatch>,
}

/// Stage-level facts needed to turn results into metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteStageSummary {
    pub stage: String,
    #[serde(default)]
    pub stage_type: StageType,
    /// Stage wall time in seconds.
    pub total_elapsed: f64,
    /// VU count of an execute stage.
    #[serde(default)]
    pub batch_size: Option<u64>,
    #[serde(default)]
    pub custom_metrics: Vec<CustomMetric>,
    #[serde(default)]
    pub monitors: Vec<MonitorSeries>,
    #[serde(default)]
    pub experiment: Option<VariantAssignment>,
}

#[async_trait]
pub trait Connector: Send {
    fn connector_type(&self) -> &str;

    async fn connect(&mut self) -> Result<()>;

    /// Stage names in execution order.
    async fn list_stages(&mut self) -> Result<Vec<String>>;

    async fn load_actions(&mut self, stage: &str) -> Result<Vec<ActionHook>>;

    async fn load_data(&mut self, stage: &str) -> Result<Vec<serde_json::Value>>;

    async fn load_results(&mut self, stage: &str) -> Result<Vec<WorkerResults>>;

    async fn load_execute_stage_summary(&mut self, stage: &str) -> Result<ExecuteStageSummary>;

    async fn close(&mut self) -> Result<()>;
}

/// Build the connector for `config.connector_type`; unknown tags fall back
/// to the JSON file connector.
pub fn create_connector(config: &ConnectorConfig, pool: &WorkerPool) -> Box<dyn Connector> {
    if config.connector_type != file::CONNECTOR_TYPE {
        warn!(
            connector = %config.connector_type,
            fallback = file::CONNECTOR_TYPE,
            "unknown connector type"
        );
    }
    Box::new(FileConnector::new(config.json.clone(), pool.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_results_from_json() {
        let worker: WorkerResults = serde_json::from_str(
            r#"{
                "worker": 1,
                "results": [{"name": "login", "type": "http", "timings": {"total": 0.2}}],
                "streams": [{"completed": 3, "succeeded": 2, "failed": 1, "batch_elapsed": 1.0}]
            }"#,
        )
        .unwrap();

        assert_eq!(worker.results.len(), 1);
        assert_eq!(worker.streams[0].sample.failed, 1);
        assert!(worker.streams[0].sample.timings.is_empty());
    }

    #[test]
    fn test_stage_summary_defaults() {
        let summary: ExecuteStageSummary =
            serde_json::from_str(r#"{"stage": "execute", "total_elapsed": 10.0}"#).unwrap();
        assert_eq!(summary.stage_type, StageType::Execute);
        assert!(summary.batch_size.is_none());
        assert!(summary.custom_metrics.is_empty());
        assert!(summary.experiment.is_none());
    }

    #[test]
    fn test_unknown_connector_falls_back() {
        let config = ConnectorConfig {
            connector_type: "snowflake".into(),
            ..ConnectorConfig::default()
        };
        let connector = create_connector(&config, &WorkerPool::new(1));
        assert_eq!(connector.connector_type(), file::CONNECTOR_TYPE);
    }
}
