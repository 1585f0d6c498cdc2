use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Body, RawResult};

/// Fields shared by every request/response engine: HTTP, HTTP/2, GraphQL
/// (over either), gRPC and WebSocket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpResult {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_addr: Option<String>,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub params: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Body>,
}

impl HttpResult {
    pub(crate) fn from_raw(raw: &mut RawResult) -> Self {
        Self {
            url: raw.url.take().unwrap_or_default(),
            ip_addr: raw.ip_addr.take(),
            method: raw
                .method
                .take()
                .map(|m| m.to_uppercase())
                .unwrap_or_else(|| "GET".into()),
            path: raw.path.take().unwrap_or_default(),
            params: raw.params.take().unwrap_or_default(),
            hostname: raw.hostname.take().unwrap_or_default(),
            status: raw.status,
            headers: std::mem::take(&mut raw.headers),
            data: raw.data.take(),
        }
    }

    /// `true` for 1xx–3xx, `false` for 4xx/5xx or when no status arrived.
    pub fn status_ok(&self) -> bool {
        matches!(self.status, Some(code) if code < 400)
    }
}
