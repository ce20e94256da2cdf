//! cord-gateway - resumable gateway session client
//!
//! Connects to a realtime gateway over a websocket, authenticates with
//! IDENTIFY or RESUME, keeps the connection alive with heartbeats and
//! republishes DISPATCH events in order across reconnects.
//!
//! ```no_run
//! use cord_gateway::{Client, ClientConfig};
//!
//! # async fn run() -> Result<(), cord_gateway::GatewayError> {
//! let client = Client::new(ClientConfig::new("token"))?;
//! let mut session = client.gateway().await?;
//! while let Some(event) = session.next_event().await {
//!     println!("{} {:?}", event.name, event.seq);
//! }
//! session.finished().await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod socket;

pub use client::Client;
pub use config::ClientConfig;
pub use error::GatewayError;
pub use gateway::{
    open_session, DispatchEvent, GatewaySession, HeartbeatPolicy, ReconnectPolicy, SessionOptions,
    SessionState,
};
pub use socket::{Socket, SocketError};
