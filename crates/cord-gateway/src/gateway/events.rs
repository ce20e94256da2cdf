//! Dispatched event type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An application event republished by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEvent {
    /// Event name, e.g. `MESSAGE_CREATE`.
    #[serde(rename = "event")]
    pub name: String,
    /// Sequence number assigned by the server.
    pub seq: Option<u64>,
    /// Opaque event body.
    pub data: Value,
}
