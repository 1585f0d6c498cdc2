use serde::{Deserialize, Serialize};

use super::{Body, RawResult};

/// A local unit of work: only start/end timing and whatever it returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Body>,
}

impl TaskResult {
    pub(crate) fn from_raw(raw: &mut RawResult) -> Self {
        Self {
            data: raw.data.take(),
        }
    }
}
