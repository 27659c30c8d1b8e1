use crate::output::SessionMetrics;
use crate::queue::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};

/// One entry on the work queue
///
/// Serialized as a tagged JSON object so consumers never guess the kind
/// from the payload:
///
/// ```json
/// {"kind":"job_id","value":"abc123"}
/// {"kind":"summary","value":{"proxy_errors":2.0}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueueEnvelope {
    /// A job whose description still has to be fetched
    JobId(String),

    /// Counters posted by a finished worker
    Summary(SessionMetrics),
}

impl QueueEnvelope {
    pub fn encode(&self) -> QueueResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> QueueResult<Self> {
        serde_json::from_str(payload).map_err(|source| QueueError::Decode {
            payload: payload.chars().take(80).collect(),
            source,
        })
    }
}
