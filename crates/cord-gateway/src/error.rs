//! Error types for cord-gateway.

use thiserror::Error;

use crate::socket::SocketError;

/// Errors surfaced by the gateway client and session.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Constructor argument rejected before any connection attempt.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport failure. Also the terminal error once reconnects are
    /// exhausted, carrying the last connect failure unchanged.
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// Server answered INVALID_SESSION with a non-resumable flag.
    #[error("session was rejected or expired")]
    SessionRejected,

    /// A reconnect was requested before the session ever became ready.
    #[error("session was never started")]
    NeverStarted,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP request to the API failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// API answered the bootstrap call with something unusable.
    #[error("gateway bootstrap failed: {0}")]
    Bootstrap(String),

    /// The session task stopped without reporting an outcome.
    #[error("session task terminated unexpectedly")]
    Terminated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_rejected_display() {
        assert_eq!(
            GatewayError::SessionRejected.to_string(),
            "session was rejected or expired"
        );
    }

    #[test]
    fn test_never_started_display() {
        assert_eq!(GatewayError::NeverStarted.to_string(), "session was never started");
    }

    #[test]
    fn test_invalid_argument_display() {
        let err = GatewayError::InvalidArgument("timeout out of range".to_string());
        assert_eq!(err.to_string(), "invalid argument: timeout out of range");
    }

    #[test]
    fn test_socket_error_is_transparent() {
        let err: GatewayError = SocketError::Closed {
            code: 4004,
            reason: "Authentication failed.".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "the websocket connection was aborted by the server (4004 Authentication failed.)"
        );
    }

    #[test]
    fn test_terminated_display() {
        assert_eq!(
            GatewayError::Terminated.to_string(),
            "session task terminated unexpectedly"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = GatewayError::Config("invalid token".to_string());
        assert_eq!(err.to_string(), "configuration error: invalid token");
    }
}
