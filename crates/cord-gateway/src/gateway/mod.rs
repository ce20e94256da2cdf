//! Gateway session.
//!
//! Runs the gateway protocol on top of a sequence of [`Socket`]s: HELLO,
//! IDENTIFY or RESUME, heartbeats, and resumable reconnection with backoff.
//! Accepted DISPATCH events are republished in server order.
//!
//! [`Socket`]: crate::socket::Socket

mod events;
mod heartbeat;
mod reconnect;
mod session;
mod state;

// Re-export public types
pub use events::DispatchEvent;
pub use heartbeat::{Heartbeat, HeartbeatPolicy};
pub use reconnect::ReconnectPolicy;
pub use session::{open_session, GatewaySession, ResumeState, SessionOptions};
pub use state::{AtomicSessionState, SessionState};
