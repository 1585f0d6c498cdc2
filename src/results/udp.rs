use serde::{Deserialize, Serialize};

use super::{Body, RawResult};

/// Datagram exchange. Like the HTTP family but without method or headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UdpResult {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_addr: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub params: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Body>,
}

impl UdpResult {
    pub(crate) fn from_raw(raw: &mut RawResult) -> Self {
        Self {
            url: raw.url.take().unwrap_or_default(),
            ip_addr: raw.ip_addr.take(),
            path: raw.path.take().unwrap_or_default(),
            params: raw.params.take().unwrap_or_default(),
            hostname: raw.hostname.take().unwrap_or_default(),
            status: raw.status,
            data: raw.data.take(),
        }
    }
}
