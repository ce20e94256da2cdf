//! # cord-proto
//!
//! Frame definitions for the gateway's JSON protocol: the opcode table,
//! decoding of inbound frames and encoding of outbound ones.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod messages;
pub mod opcode;

pub use error::ProtoError;
pub use messages::{ConnectionProperties, Identify, InboundMessage, OutboundMessage, Presence, Resume};
pub use opcode::Opcode;
