//! Gateway frame definitions.
//!
//! Every frame is a JSON object `{op, d, s, t}`. Inbound frames are decoded
//! into [`InboundMessage`]; the three frames a client ever sends are modelled
//! by [`OutboundMessage`] and always serialize as `{op, d}`.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::ProtoError;
use crate::opcode::Opcode;

/// Frames received from the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Application event.
    Dispatch {
        /// Event name (`t`). Empty when the server omitted it.
        event: String,
        /// Opaque event body (`d`).
        data: Value,
        /// Sequence number (`s`).
        seq: Option<u64>,
    },
    /// Server asks for an immediate heartbeat.
    Heartbeat,
    /// Server asks the client to drop the socket and resume elsewhere.
    Reconnect,
    /// Session rejected; `resumable` tells whether a resume may succeed.
    InvalidSession {
        /// Truthiness of `d`.
        resumable: bool,
    },
    /// Greeting with the heartbeat interval in milliseconds.
    ///
    /// `None` when the field is missing, not a number, or zero. Negative
    /// values are kept so that clamping can raise them to the floor.
    Hello {
        /// Requested interval, truncated toward zero.
        heartbeat_interval: Option<i64>,
    },
    /// Acknowledgement of the last heartbeat.
    HeartbeatAck,
    /// Opcode this client does not handle.
    Unknown {
        /// Raw opcode value.
        op: u64,
    },
}

impl InboundMessage {
    /// Decode a parsed JSON frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not an object or carries no
    /// integer `op` field.
    pub fn from_value(mut value: Value) -> Result<Self, ProtoError> {
        let Some(object) = value.as_object_mut() else {
            return Err(ProtoError::Decoding("frame is not a JSON object".to_string()));
        };
        let op = object
            .get("op")
            .and_then(Value::as_u64)
            .ok_or(ProtoError::MissingField("op"))?;
        let data = object.remove("d").unwrap_or(Value::Null);

        let inbound = Opcode::try_from(op).ok().filter(|code| code.is_inbound());
        let message = match inbound {
            Some(Opcode::Dispatch) => Self::Dispatch {
                event: object
                    .get("t")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                data,
                seq: object.get("s").and_then(Value::as_u64),
            },
            Some(Opcode::Heartbeat) => Self::Heartbeat,
            Some(Opcode::Reconnect) => Self::Reconnect,
            Some(Opcode::InvalidSession) => Self::InvalidSession {
                resumable: is_truthy(&data),
            },
            Some(Opcode::Hello) => Self::Hello {
                heartbeat_interval: data
                    .get("heartbeat_interval")
                    .and_then(Value::as_f64)
                    .map(|ms| ms.trunc() as i64)
                    .filter(|ms| *ms != 0),
            },
            Some(Opcode::HeartbeatAck) => Self::HeartbeatAck,
            _ => Self::Unknown { op },
        };
        Ok(message)
    }
}

/// Loose truthiness of a payload: `null`, `false`, `0`, `NaN` and `""`
/// are false, everything else (including empty arrays and objects) is true.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Client platform fields sent with IDENTIFY.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    /// Host operating system.
    pub os: String,
    /// Client library name.
    pub browser: String,
    /// Client device name.
    pub device: String,
}

impl ConnectionProperties {
    /// Properties for the current host, naming the client `agent`.
    #[must_use]
    pub fn for_agent(agent: &str) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: agent.to_string(),
            device: agent.to_string(),
        }
    }
}

/// Initial presence sent with IDENTIFY.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    /// Idle-since timestamp.
    pub since: Option<u64>,
    /// Activity.
    pub game: Option<Value>,
    /// Status string.
    pub status: String,
    /// Whether the client is away.
    pub afk: bool,
}

impl Default for Presence {
    fn default() -> Self {
        Self {
            since: None,
            game: None,
            status: "online".to_string(),
            afk: false,
        }
    }
}

/// IDENTIFY body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identify {
    /// Bot credential.
    pub token: String,
    /// Client platform fields.
    pub properties: ConnectionProperties,
    /// Initial presence.
    pub presence: Presence,
}

/// RESUME body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resume {
    /// Bot credential.
    pub token: String,
    /// Session to resume.
    pub session_id: String,
    /// Last sequence number received.
    pub seq: Option<u64>,
}

/// Frames sent to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Liveness ping carrying the last sequence number seen.
    Heartbeat {
        /// Last sequence, `None` before the session is ready.
        seq: Option<u64>,
    },
    /// Start a new session.
    Identify(Identify),
    /// Resume a previous session.
    Resume(Resume),
}

impl OutboundMessage {
    /// Build a heartbeat.
    #[must_use]
    pub const fn heartbeat(seq: Option<u64>) -> Self {
        Self::Heartbeat { seq }
    }

    /// Build an IDENTIFY with default presence.
    #[must_use]
    pub fn identify(token: impl Into<String>, agent: &str) -> Self {
        Self::Identify(Identify {
            token: token.into(),
            properties: ConnectionProperties::for_agent(agent),
            presence: Presence::default(),
        })
    }

    /// Build a RESUME.
    #[must_use]
    pub fn resume(token: impl Into<String>, session_id: impl Into<String>, seq: Option<u64>) -> Self {
        Self::Resume(Resume {
            token: token.into(),
            session_id: session_id.into(),
            seq,
        })
    }

    /// Opcode of this frame.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Heartbeat { .. } => Opcode::Heartbeat,
            Self::Identify(_) => Opcode::Identify,
            Self::Resume(_) => Opcode::Resume,
        }
    }
}

impl Serialize for OutboundMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut frame = serializer.serialize_struct("OutboundMessage", 2)?;
        frame.serialize_field("op", &self.opcode().code())?;
        match self {
            Self::Heartbeat { seq } => frame.serialize_field("d", seq)?,
            Self::Identify(identify) => frame.serialize_field("d", identify)?,
            Self::Resume(resume) => frame.serialize_field("d", resume)?,
        }
        frame.end()
    }
}
