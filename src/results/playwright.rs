use serde::{Deserialize, Serialize};

use super::RawResult;

/// One browser automation command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaywrightResult {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u32>,
}

impl PlaywrightResult {
    pub(crate) fn from_raw(raw: &mut RawResult) -> Self {
        Self {
            url: raw.url.take().unwrap_or_default(),
            command: raw.command.take().unwrap_or_default(),
            selector: raw.selector.take(),
            x: raw.x,
            y: raw.y,
            frame: raw.frame,
        }
    }
}
