use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReportError, Result};
use crate::results::{Body, EngineType};
use crate::tag::Tag;

// ─── Action specs ────────────────────────────────────────────────

fn default_method() -> String {
    "GET".into()
}

fn default_weight() -> f64 {
    1.0
}

/// HTTP, HTTP/2, gRPC and WebSocket requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpAction {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub data: Option<Body>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlAction {
    pub url: String,
    pub query: String,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdpAction {
    pub url: String,
    #[serde(default)]
    pub data: Option<Body>,
    #[serde(default)]
    pub wait_for_response: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaywrightAction {
    pub command: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskAction {
    /// Identifier of the callable the task runs.
    #[serde(default)]
    pub source: Option<String>,
}

/// Engine-family payload of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum ActionSpec {
    Http(HttpAction),
    Graphql(GraphqlAction),
    Udp(UdpAction),
    Playwright(PlaywrightAction),
    Task(TaskAction),
}

/// A stored action, typed by its engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionHook {
    pub name: String,
    pub engine: EngineType,
    pub order: u32,
    pub weight: f64,
    pub tags: Vec<Tag>,
    pub action: ActionSpec,
}

// ─── Parser ──────────────────────────────────────────────────────

/// Fields common to every stored action record.
#[derive(Deserialize)]
struct HookHeader {
    #[serde(default)]
    order: u32,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default)]
    tags: Vec<Tag>,
}

/// Turns generic JSON action records into [`ActionHook`]s, keyed on the
/// record's `engine` discriminator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, record: &Value) -> Result<ActionHook> {
        let object = record
            .as_object()
            .ok_or_else(|| ReportError::InvalidInput("action record must be a JSON object".into()))?;

        let name = object
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ReportError::InvalidInput("action record is missing its name".into()))?
            .to_string();

        let engine: EngineType = object
            .get("engine")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ReportError::InvalidInput(format!("action '{name}' is missing its engine"))
            })?
            .parse()?;

        let header: HookHeader = decode(&name, record)?;

        let action = match engine {
            EngineType::Http | EngineType::Http2 | EngineType::Grpc | EngineType::Websocket => {
                ActionSpec::Http(decode(&name, record)?)
            }
            EngineType::Graphql | EngineType::Graphqlh2 => ActionSpec::Graphql(decode(&name, record)?),
            EngineType::Udp => ActionSpec::Udp(decode(&name, record)?),
            EngineType::Playwright => ActionSpec::Playwright(decode(&name, record)?),
            EngineType::Task => ActionSpec::Task(decode(&name, record)?),
        };

        Ok(ActionHook {
            name,
            engine,
            order: header.order,
            weight: header.weight,
            tags: header.tags,
            action,
        })
    }

    /// Parse every record, ordered by `order` (stable for ties).
    pub fn parse_all(&self, records: &[Value]) -> Result<Vec<ActionHook>> {
        let mut hooks = records
            .iter()
            .map(|record| self.parse(record))
            .collect::<Result<Vec<_>>>()?;
        hooks.sort_by_key(|hook| hook.order);
        Ok(hooks)
    }
}

fn decode<T: DeserializeOwned>(name: &str, record: &Value) -> Result<T> {
    T::deserialize(record)
        .map_err(|e| ReportError::InvalidInput(format!("action '{name}' is malformed: {e}")))
}
