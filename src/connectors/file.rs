use std::fs;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{ActionHook, Connector, ExecuteStageSummary, Parser, WorkerResults};
use crate::config::FileConnectorConfig;
use crate::error::{ReportError, Result};
use crate::pool::WorkerPool;

pub const CONNECTOR_TYPE: &str = "json";

/// A whole recorded session: stages in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(default)]
    pub stages: Vec<StoredStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredStage {
    pub summary: ExecuteStageSummary,
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub workers: Vec<WorkerResults>,
}

/// Reads one JSON session document, loaded once at `connect` through the
/// blocking pool.
pub struct FileConnector {
    config: FileConnectorConfig,
    pool: WorkerPool,
    parser: Parser,
    session: Option<StoredSession>,
}

impl FileConnector {
    pub fn new(config: FileConnectorConfig, pool: WorkerPool) -> Self {
        Self {
            config,
            pool,
            parser: Parser::new(),
            session: None,
        }
    }

    fn stage(&self, name: &str) -> Result<&StoredStage> {
        let session = self.session.as_ref().ok_or_else(|| ReportError::BackendTransient {
            backend: CONNECTOR_TYPE.into(),
            message: "not connected".into(),
        })?;

        session
            .stages
            .iter()
            .find(|stage| stage.summary.stage == name)
            .ok_or_else(|| ReportError::InvalidInput(format!("no stored stage named '{name}'")))
    }
}

#[async_trait]
impl Connector for FileConnector {
    fn connector_type(&self) -> &str {
        CONNECTOR_TYPE
    }

    async fn connect(&mut self) -> Result<()> {
        let path = self.config.path.clone();
        debug!(path = %path.display(), "loading stored session");

        let session = self
            .pool
            .run(move || {
                let contents = fs::read_to_string(&path)?;
                Ok(serde_json::from_str::<StoredSession>(&contents)?)
            })
            .await?;

        info!(
            path = %self.config.path.display(),
            stages = session.stages.len(),
            "stored session loaded"
        );
        self.session = Some(session);
        Ok(())
    }

    async fn list_stages(&mut self) -> Result<Vec<String>> {
        let session = self.session.as_ref().ok_or_else(|| ReportError::BackendTransient {
            backend: CONNECTOR_TYPE.into(),
            message: "not connected".into(),
        })?;
        Ok(session
            .stages
            .iter()
            .map(|stage| stage.summary.stage.clone())
            .collect())
    }

    async fn load_actions(&mut self, stage: &str) -> Result<Vec<ActionHook>> {
        let stored = self.stage(stage)?;
        self.parser.parse_all(&stored.actions)
    }

    async fn load_data(&mut self, stage: &str) -> Result<Vec<Value>> {
        Ok(self.stage(stage)?.data.clone())
    }

    async fn load_results(&mut self, stage: &str) -> Result<Vec<WorkerResults>> {
        Ok(self.stage(stage)?.workers.clone())
    }

    async fn load_execute_stage_summary(&mut self, stage: &str) -> Result<ExecuteStageSummary> {
        Ok(self.stage(stage)?.summary.clone())
    }

    async fn close(&mut self) -> Result<()> {
        self.session = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SESSION: &str = r#"{
        "stages": [
            {
                "summary": {"stage": "setup", "stage_type": "setup", "total_elapsed": 1.0},
                "data": [{"user": "alice"}]
            },
            {
                "summary": {"stage": "execute", "total_elapsed": 10.0, "batch_size": 50},
                "actions": [{"name": "login", "engine": "http", "url": "http://api.local/login", "method": "POST"}],
                "workers": [
                    {"worker": 0, "results": [{"name": "login", "type": "http", "timings": {"total": 0.1}}]}
                ]
            }
        ]
    }"#;

    fn session_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SESSION.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_loads_stages_in_order() {
        let file = session_file();
        let mut connector = FileConnector::new(
            FileConnectorConfig {
                path: file.path().to_path_buf(),
            },
            WorkerPool::new(1),
        );
        connector.connect().await.unwrap();

        assert_eq!(connector.list_stages().await.unwrap(), vec!["setup", "execute"]);

        let summary = connector.load_execute_stage_summary("execute").await.unwrap();
        assert_eq!(summary.batch_size, Some(50));
        assert_eq!(summary.total_elapsed, 10.0);

        let actions = connector.load_actions("execute").await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name, "login");

        let workers = connector.load_results("execute").await.unwrap();
        assert_eq!(workers[0].results.len(), 1);

        assert_eq!(connector.load_data("setup").await.unwrap().len(), 1);
        assert!(connector.load_results("teardown").await.is_err());

        connector.close().await.unwrap();
        assert!(connector.list_stages().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut connector = FileConnector::new(
            FileConnectorConfig {
                path: dir.path().join("missing.json"),
            },
            WorkerPool::new(1),
        );
        assert!(matches!(connector.connect().await, Err(ReportError::Io(_))));
    }
}
