mod body;
pub mod http;
pub mod playwright;
pub mod task;
pub mod udp;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ReportError, Result};
use crate::tag::Tag;

pub use body::Body;
pub use http::HttpResult;
pub use playwright::PlaywrightResult;
pub use task::TaskResult;
pub use udp::UdpResult;

// ─── Discriminators ──────────────────────────────────────────────

/// The engine that produced a result. Closed set; drives the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Http,
    Http2,
    Graphql,
    Graphqlh2,
    Grpc,
    Websocket,
    Udp,
    Playwright,
    Task,
}

impl EngineType {
    pub const ALL: [EngineType; 9] = [
        Self::Http,
        Self::Http2,
        Self::Graphql,
        Self::Graphqlh2,
        Self::Grpc,
        Self::Websocket,
        Self::Udp,
        Self::Playwright,
        Self::Task,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Http2 => "http2",
            Self::Graphql => "graphql",
            Self::Graphqlh2 => "graphqlh2",
            Self::Grpc => "grpc",
            Self::Websocket => "websocket",
            Self::Udp => "udp",
            Self::Playwright => "playwright",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = ReportError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|engine| engine.as_str() == wanted)
            .ok_or_else(|| ReportError::InvalidInput(format!("unknown engine type '{s}'")))
    }
}

/// Timing phase of a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Total,
    Waiting,
    Connecting,
    Writing,
    Reading,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Self::Total,
        Self::Waiting,
        Self::Connecting,
        Self::Writing,
        Self::Reading,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::Waiting => "waiting",
            Self::Connecting => "connecting",
            Self::Writing => "writing",
            Self::Reading => "reading",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Timings ─────────────────────────────────────────────────────

/// Per-phase wall time in seconds. Phases an engine does not measure stay 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub waiting: f64,
    #[serde(default)]
    pub connecting: f64,
    #[serde(default)]
    pub writing: f64,
    #[serde(default)]
    pub reading: f64,
}

impl Timings {
    pub fn get(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Total => self.total,
            Phase::Waiting => self.waiting,
            Phase::Connecting => self.connecting,
            Phase::Writing => self.writing,
            Phase::Reading => self.reading,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, f64)> + '_ {
        Phase::ALL.into_iter().map(move |phase| (phase, self.get(phase)))
    }

    /// Sum of the four sub-phases; ≈ `total` when an engine reports all of them.
    pub fn phase_sum(&self) -> f64 {
        self.waiting + self.connecting + self.writing + self.reading
    }

    fn validate(&self) -> Result<()> {
        for (phase, value) in self.iter() {
            if !value.is_finite() || value < 0.0 {
                return Err(ReportError::InvalidInput(format!(
                    "{phase} timing must be a finite, non-negative number (got {value})"
                )));
            }
        }
        Ok(())
    }
}

// ─── Raw input ───────────────────────────────────────────────────

/// A result exactly as a load-generating stage emits it. Every field is
/// optional here; [`ProcessedResult::from_raw`] decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub event_id: Option<Uuid>,
    pub action_id: Option<String>,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub engine: Option<EngineType>,
    pub error: Option<String>,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub timestamp: Option<DateTime<Utc>>,

    // Request/response engines
    pub url: Option<String>,
    pub ip_addr: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub params: Option<String>,
    pub hostname: Option<String>,
    pub status: Option<u16>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub data: Option<Body>,

    // Browser automation
    pub command: Option<String>,
    pub selector: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub frame: Option<u32>,
}

// ─── Processed results ───────────────────────────────────────────

/// Identity, outcome and timing common to every engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultHeader {
    pub event_id: Uuid,
    pub action_id: String,
    pub name: String,
    pub short_name: String,
    pub stage: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Identifiers of the checks that ran; resolved against a check registry
    /// by whoever needs the callables.
    #[serde(default)]
    pub checks: Vec<String>,
    pub timings: Timings,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub timestamp: DateTime<Utc>,
}

/// Engine-specific part of a processed result, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResultDetail {
    Http(HttpResult),
    Http2(HttpResult),
    Graphql(HttpResult),
    Graphqlh2(HttpResult),
    Grpc(HttpResult),
    Websocket(HttpResult),
    Udp(UdpResult),
    Playwright(PlaywrightResult),
    Task(TaskResult),
}

impl ResultDetail {
    /// Factory keyed on the engine discriminator.
    fn from_raw(engine: EngineType, raw: &mut RawResult) -> Self {
        match engine {
            EngineType::Http => Self::Http(HttpResult::from_raw(raw)),
            EngineType::Http2 => Self::Http2(HttpResult::from_raw(raw)),
            EngineType::Graphql => Self::Graphql(HttpResult::from_raw(raw)),
            EngineType::Graphqlh2 => Self::Graphqlh2(HttpResult::from_raw(raw)),
            EngineType::Grpc => Self::Grpc(HttpResult::from_raw(raw)),
            EngineType::Websocket => Self::Websocket(HttpResult::from_raw(raw)),
            EngineType::Udp => Self::Udp(UdpResult::from_raw(raw)),
            EngineType::Playwright => Self::Playwright(PlaywrightResult::from_raw(raw)),
            EngineType::Task => Self::Task(TaskResult::from_raw(raw)),
        }
    }

    pub fn engine(&self) -> EngineType {
        match self {
            Self::Http(_) => EngineType::Http,
            Self::Http2(_) => EngineType::Http2,
            Self::Graphql(_) => EngineType::Graphql,
            Self::Graphqlh2(_) => EngineType::Graphqlh2,
            Self::Grpc(_) => EngineType::Grpc,
            Self::Websocket(_) => EngineType::Websocket,
            Self::Udp(_) => EngineType::Udp,
            Self::Playwright(_) => EngineType::Playwright,
            Self::Task(_) => EngineType::Task,
        }
    }

    pub fn as_http(&self) -> Option<&HttpResult> {
        match self {
            Self::Http(r)
            | Self::Http2(r)
            | Self::Graphql(r)
            | Self::Graphqlh2(r)
            | Self::Grpc(r)
            | Self::Websocket(r) => Some(r),
            _ => None,
        }
    }
}

/// A typed, post-execution record. Serialises flat: header fields, the
/// `type` discriminator and the engine-specific fields side by side. This
/// is also the event record handed to reporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedResult {
    #[serde(flatten)]
    pub header: ResultHeader,
    #[serde(flatten)]
    pub detail: ResultDetail,
}

impl ProcessedResult {
    /// Normalises a raw result and stamps it with `stage`.
    ///
    /// `type` and a non-empty `name` are required; anything else that is
    /// missing is defaulted. Negative or non-finite timings are rejected.
    pub fn from_raw(mut raw: RawResult, stage: &str) -> Result<Self> {
        let engine = raw
            .engine
            .ok_or_else(|| ReportError::InvalidInput("result is missing its engine type".into()))?;

        let name = raw
            .name
            .take()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                ReportError::InvalidInput(format!("{engine} result is missing an action name"))
            })?;

        raw.timings.validate()?;

        let source = raw
            .source
            .take()
            .or_else(|| raw.hostname.clone().filter(|h| !h.is_empty()))
            .unwrap_or_else(|| engine.to_string());

        let header = ResultHeader {
            event_id: raw.event_id.unwrap_or_else(Uuid::new_v4),
            action_id: raw.action_id.take().unwrap_or_else(|| name.clone()),
            short_name: raw.short_name.take().unwrap_or_else(|| name.clone()),
            name,
            stage: stage.to_owned(),
            source,
            error: raw.error.take(),
            checks: std::mem::take(&mut raw.checks),
            timings: raw.timings,
            tags: std::mem::take(&mut raw.tags),
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
        };

        let detail = ResultDetail::from_raw(engine, &mut raw);

        Ok(Self { header, detail })
    }

    pub fn engine(&self) -> EngineType {
        self.detail.engine()
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn stage(&self) -> &str {
        &self.header.stage
    }

    /// A result succeeded iff it carries no error.
    pub fn success(&self) -> bool {
        self.header.error.is_none()
    }

    /// Total elapsed seconds.
    pub fn time(&self) -> f64 {
        self.header.timings.total
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
