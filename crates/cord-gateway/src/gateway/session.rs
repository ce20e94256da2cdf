//! Gateway session state machine.
//!
//! A session is an actor task that owns the current [`Socket`] together
//! with its heartbeat timer. Every transition happens inside that task, one
//! step at a time; the caller only sees the [`GatewaySession`] handle.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use cord_proto::{InboundMessage, OutboundMessage};
use futures::Stream;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::GatewayError;
use crate::socket::{Socket, CLOSE_GOING_AWAY};

use super::events::DispatchEvent;
use super::heartbeat::{Heartbeat, HeartbeatPolicy};
use super::reconnect::ReconnectPolicy;
use super::state::{AtomicSessionState, SessionState};

/// Name of the dispatch that completes the handshake.
const READY_EVENT: &str = "READY";

/// Largest accepted connect timeout, in milliseconds.
const MAX_TIMEOUT_MS: u64 = 0x7fff_ffff;

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    url: String,
    agent_name: String,
    token: String,
    timeout: Duration,
    heartbeat: HeartbeatPolicy,
    reconnect: ReconnectPolicy,
}

impl SessionOptions {
    /// Options for `url`, identifying as `agent_name` with `token`.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        agent_name: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            agent_name: agent_name.into(),
            token: token.into(),
            timeout: Duration::from_millis(15_000),
            heartbeat: HeartbeatPolicy::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Set the connect timeout. Zero disables it.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the heartbeat interval bounds.
    #[must_use]
    pub const fn with_heartbeat_policy(mut self, policy: HeartbeatPolicy) -> Self {
        self.heartbeat = policy;
        self
    }

    /// Set the reconnect pacing.
    #[must_use]
    pub const fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidArgument`] if the URL is not a
    /// websocket URL, the timeout is out of range, or the heartbeat bounds
    /// are empty or do not contain the default interval.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let url = Url::parse(&self.url)
            .map_err(|e| GatewayError::InvalidArgument(format!("invalid url '{}': {e}", self.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(GatewayError::InvalidArgument(format!(
                "url must use ws:// or wss://, got '{}'",
                url.scheme()
            )));
        }
        if self.timeout.as_millis() > u128::from(MAX_TIMEOUT_MS) {
            return Err(GatewayError::InvalidArgument(format!(
                "timeout must not exceed {MAX_TIMEOUT_MS}ms"
            )));
        }

        let heartbeat = &self.heartbeat;
        if heartbeat.min_interval.is_zero() {
            return Err(GatewayError::InvalidArgument(
                "heartbeat min_interval must be greater than 0".to_string(),
            ));
        }
        if heartbeat.min_interval > heartbeat.max_interval {
            return Err(GatewayError::InvalidArgument(
                "heartbeat min_interval cannot exceed max_interval".to_string(),
            ));
        }
        if heartbeat.default_interval < heartbeat.min_interval
            || heartbeat.default_interval > heartbeat.max_interval
        {
            return Err(GatewayError::InvalidArgument(
                "heartbeat default_interval must lie between min_interval and max_interval"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// What a ready session needs to resume on a new socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeState {
    /// Session identifier issued in READY.
    pub session_id: String,
    /// Last sequence number accepted.
    pub last_seq: Option<u64>,
}

/// Open a session and start connecting in the background.
///
/// Must be called within a tokio runtime.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidArgument`] for malformed arguments; no
/// connection is attempted in that case.
pub fn open_session(
    url: &str,
    agent_name: &str,
    token: &str,
    timeout_ms: u64,
) -> Result<GatewaySession, GatewayError> {
    if timeout_ms > MAX_TIMEOUT_MS {
        return Err(GatewayError::InvalidArgument(format!(
            "timeout must not exceed {MAX_TIMEOUT_MS}ms"
        )));
    }
    GatewaySession::open(
        SessionOptions::new(url, agent_name, token).with_timeout(Duration::from_millis(timeout_ms)),
    )
}

/// Handle to a running gateway session.
///
/// Yields accepted DISPATCH events in server order, then settles once:
/// successfully when closed by the caller, or with the error that ended
/// the session. Dropping the handle closes the session.
#[derive(Debug)]
pub struct GatewaySession {
    events: mpsc::UnboundedReceiver<DispatchEvent>,
    outcome: Option<oneshot::Receiver<Result<(), GatewayError>>>,
    cancel: CancellationToken,
    state: Arc<AtomicSessionState>,
}

impl GatewaySession {
    /// Validate `options` and spawn the session task.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidArgument`] if the options are invalid.
    pub fn open(options: SessionOptions) -> Result<Self, GatewayError> {
        options.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let state = Arc::new(AtomicSessionState::new(SessionState::Connecting));

        let driver = SessionDriver {
            options,
            resume: None,
            last_connect: Instant::now(),
            failures: 0,
            events: events_tx,
            state: Arc::clone(&state),
            cancel: cancel.clone(),
        };

        tokio::spawn(async move {
            let result = driver.run().await;
            match &result {
                Ok(()) => info!("gateway session closed"),
                Err(error) => warn!(%error, "gateway session failed"),
            }
            let _ = outcome_tx.send(result);
        });

        Ok(Self {
            events: events_rx,
            outcome: Some(outcome_rx),
            cancel,
            state,
        })
    }

    /// Current state of the session.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    /// Next dispatched event, or `None` once the session has ended and
    /// every event has been consumed.
    pub async fn next_event(&mut self) -> Option<DispatchEvent> {
        self.events.recv().await
    }

    /// Request shutdown without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session to end.
    ///
    /// Returns `Ok(())` if the outcome was already taken by the stream.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the session, or
    /// [`GatewayError::Terminated`] if the session task died without one.
    pub async fn finished(&mut self) -> Result<(), GatewayError> {
        match self.outcome.take() {
            Some(outcome) => outcome.await.unwrap_or(Err(GatewayError::Terminated)),
            None => Ok(()),
        }
    }

    /// Close the session: stop timers, close the socket with 1001 and wait
    /// for the task to finish.
    ///
    /// # Errors
    ///
    /// Returns an error only if the session had already failed.
    pub async fn close(&mut self) -> Result<(), GatewayError> {
        if !self.state().is_terminal() {
            self.cancel();
        }
        self.finished().await
    }
}

impl Drop for GatewaySession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Stream for GatewaySession {
    type Item = Result<DispatchEvent, GatewayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if let Some(event) = ready!(this.events.poll_recv(cx)) {
            return Poll::Ready(Some(Ok(event)));
        }

        let Some(outcome) = this.outcome.as_mut() else {
            return Poll::Ready(None);
        };
        let result = ready!(Pin::new(outcome).poll(cx));
        this.outcome = None;
        match result {
            Ok(Ok(())) => Poll::Ready(None),
            Ok(Err(error)) => Poll::Ready(Some(Err(error))),
            Err(_) => Poll::Ready(Some(Err(GatewayError::Terminated))),
        }
    }
}

/// Result of one step of the state machine.
#[derive(Debug)]
enum Transition {
    Continue,
    Reconnect(&'static str),
    Fail(GatewayError),
    Cancelled,
}

/// A socket and the heartbeat timer scoped to it.
struct Connection {
    socket: Socket,
    heartbeat: Option<Heartbeat>,
}

impl Connection {
    const fn new(socket: Socket) -> Self {
        Self {
            socket,
            heartbeat: None,
        }
    }

    /// Stop the timer and close the socket. Nothing from this connection
    /// acts on the session afterwards.
    fn discard(&mut self) {
        self.heartbeat = None;
        self.socket.close(CLOSE_GOING_AWAY);
    }
}

struct SessionDriver {
    options: SessionOptions,
    resume: Option<ResumeState>,
    last_connect: Instant,
    failures: u32,
    events: mpsc::UnboundedSender<DispatchEvent>,
    state: Arc<AtomicSessionState>,
    cancel: CancellationToken,
}

impl SessionDriver {
    async fn run(mut self) -> Result<(), GatewayError> {
        self.state.store(SessionState::Connecting);
        let socket = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                self.state.store(SessionState::Closed);
                return Ok(());
            }
            result = Socket::connect(&self.options.url, self.options.timeout) => match result {
                Ok(socket) => socket,
                Err(error) => {
                    self.state.store(SessionState::Failed);
                    return Err(error.into());
                }
            },
        };
        self.last_connect = Instant::now();
        info!(url = %self.options.url, "connected to gateway");

        let mut connection = Connection::new(socket);
        loop {
            match self.drive(&mut connection).await {
                Transition::Continue => {}
                Transition::Cancelled => {
                    connection.discard();
                    self.state.store(SessionState::Closed);
                    return Ok(());
                }
                Transition::Fail(error) => {
                    connection.discard();
                    self.state.store(SessionState::Failed);
                    return Err(error);
                }
                Transition::Reconnect(reason) => {
                    connection.discard();
                    if self.resume.is_none() {
                        warn!(reason, "reconnect requested before the session was ready");
                        self.state.store(SessionState::Failed);
                        return Err(GatewayError::NeverStarted);
                    }
                    info!(reason, "discarding gateway socket");
                    match self.reconnect().await {
                        Ok(Some(socket)) => connection = Connection::new(socket),
                        Ok(None) => {
                            self.state.store(SessionState::Closed);
                            return Ok(());
                        }
                        Err(error) => {
                            self.state.store(SessionState::Failed);
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    /// Run one socket until something forces a transition.
    async fn drive(&mut self, connection: &mut Connection) -> Transition {
        self.state.store(SessionState::AwaitingHello);
        let Connection { socket, heartbeat } = connection;

        loop {
            let transition = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Transition::Cancelled,
                () = next_tick(heartbeat) => self.on_heartbeat_due(socket, heartbeat),
                frame = socket.recv() => match frame {
                    Some(value) => self.on_frame(value, socket, heartbeat),
                    None => self.on_socket_ended(socket).await,
                },
            };
            if !matches!(transition, Transition::Continue) {
                return transition;
            }
        }
    }

    fn on_heartbeat_due(&self, socket: &Socket, heartbeat: &mut Option<Heartbeat>) -> Transition {
        let Some(timer) = heartbeat.as_mut() else {
            return Transition::Continue;
        };
        if !timer.beat() {
            warn!("heartbeat was not acknowledged, connection presumed dead");
            return Transition::Reconnect("heartbeat not acknowledged");
        }
        debug!(seq = ?self.last_seq(), "sending heartbeat");
        socket.send(&OutboundMessage::heartbeat(self.last_seq()));
        Transition::Continue
    }

    fn on_frame(
        &mut self,
        value: Value,
        socket: &Socket,
        heartbeat: &mut Option<Heartbeat>,
    ) -> Transition {
        let message = match InboundMessage::from_value(value) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "ignoring frame");
                return Transition::Continue;
            }
        };

        match message {
            InboundMessage::Hello { heartbeat_interval } => {
                let period = self.options.heartbeat.interval_for(heartbeat_interval);
                *heartbeat = Some(Heartbeat::start(period));
                let handshake = match &self.resume {
                    Some(resume) => {
                        info!(session_id = %resume.session_id, seq = ?resume.last_seq, "resuming session");
                        OutboundMessage::resume(
                            self.options.token.clone(),
                            resume.session_id.clone(),
                            resume.last_seq,
                        )
                    }
                    None => {
                        info!(agent = %self.options.agent_name, "identifying");
                        OutboundMessage::identify(self.options.token.clone(), &self.options.agent_name)
                    }
                };
                self.state.store(SessionState::Active);
                socket.send(&handshake);
                debug!(interval_ms = period.as_millis() as u64, "heartbeat started");
            }
            InboundMessage::Heartbeat => {
                socket.send(&OutboundMessage::heartbeat(self.last_seq()));
            }
            InboundMessage::HeartbeatAck => {
                if let Some(timer) = heartbeat.as_mut() {
                    timer.acknowledge();
                }
            }
            InboundMessage::Reconnect => {
                return Transition::Reconnect("server requested reconnect");
            }
            InboundMessage::InvalidSession { resumable } => {
                if resumable {
                    return Transition::Reconnect("session invalidated, resumable");
                }
                return Transition::Fail(GatewayError::SessionRejected);
            }
            InboundMessage::Dispatch { event, data, seq } => self.on_dispatch(event, data, seq),
            InboundMessage::Unknown { op } => debug!(op, "ignoring unknown opcode"),
        }
        Transition::Continue
    }

    fn on_dispatch(&mut self, event: String, data: Value, seq: Option<u64>) {
        if event == READY_EVENT {
            let session_id = data
                .get("session_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            info!(%session_id, ?seq, "session ready");
            self.resume = Some(ResumeState {
                session_id,
                last_seq: seq,
            });
            return;
        }

        let Some(resume) = self.resume.as_mut() else {
            debug!(%event, "dropping dispatch received before READY");
            return;
        };
        if seq.is_some() {
            resume.last_seq = seq;
        }
        let _ = self.events.send(DispatchEvent {
            name: event,
            seq,
            data,
        });
    }

    async fn on_socket_ended(&self, socket: &Socket) -> Transition {
        match socket.fate().await {
            Err(error) if self.resume.is_none() => Transition::Fail(error.into()),
            Err(error) => {
                warn!(%error, "gateway socket failed");
                Transition::Reconnect("socket failed")
            }
            Ok(()) => Transition::Reconnect("socket closed"),
        }
    }

    /// Open a replacement socket. `Ok(None)` means the caller cancelled.
    async fn reconnect(&mut self) -> Result<Option<Socket>, GatewayError> {
        self.state.store(SessionState::Reconnecting);
        let policy = self.options.reconnect;

        let delay = policy.initial_delay(self.last_connect.elapsed());
        info!(delay_ms = delay.as_millis() as u64, "reconnecting to gateway");
        if !self.sleep_unless_cancelled(delay).await {
            return Ok(None);
        }

        self.failures = 0;
        loop {
            self.state.store(SessionState::Connecting);
            let attempt = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(None),
                result = Socket::connect(&self.options.url, self.options.timeout) => result,
            };

            match attempt {
                Ok(socket) => {
                    self.last_connect = Instant::now();
                    self.failures = 0;
                    info!(url = %self.options.url, "reconnected to gateway");
                    return Ok(Some(socket));
                }
                Err(error) => {
                    self.failures += 1;
                    if !policy.should_retry(self.failures) {
                        warn!(attempts = self.failures, %error, "giving up on reconnect");
                        return Err(error.into());
                    }
                    let delay = policy.delay_for_failure(self.failures);
                    warn!(
                        attempt = self.failures,
                        %error,
                        delay_ms = delay.as_millis() as u64,
                        "reconnect attempt failed"
                    );
                    self.state.store(SessionState::Reconnecting);
                    if !self.sleep_unless_cancelled(delay).await {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Returns `false` if cancelled before `delay` elapsed.
    async fn sleep_unless_cancelled(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn last_seq(&self) -> Option<u64> {
        self.resume.as_ref().and_then(|resume| resume.last_seq)
    }
}

async fn next_tick(heartbeat: &mut Option<Heartbeat>) {
    match heartbeat {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}
