//! Connection state machine: handshake, heartbeat, reconnect.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──socket open──► AwaitingBegin
//!      ▲                                                      │ BEGIN (api >= 1.7.0)
//!      │                                                      ▼
//!      └──────────── socket closed / ping timeout ◄──────── Ready
//! ```
//!
//! The client never speaks first: once the socket is open it waits for the
//! server's `BEGIN` line.  A server announcing an API version below
//! [`ApiVersion::MINIMUM`](satellite_core::ApiVersion::MINIMUM) is marked
//! *unsupported*; the socket is closed without a `Connected` event and the
//! next attempt waits much longer than usual.
//!
//! While a session is open the client sends `PING` every
//! [`ConnectionTimings::ping_interval`].  The connection is only declared
//! dead when **both** too many pings are unanswered **and** nothing at all
//! has been received for [`ConnectionTimings::idle_timeout`].
//!
//! # Generations
//!
//! Every `connect()`/`disconnect()` bumps a generation counter.  A connection
//! loop only touches shared state while its generation is current, so a
//! socket that closes after it was replaced can never clear the state of its
//! successor or schedule a second reconnect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use satellite_core::protocol::codec::split_command;
use satellite_core::protocol::messages::{AddDeviceResult, InboundMessage, OutboundMessage};
use satellite_core::{ApiVersion, Capabilities, GridPos, LineBuffer, RegisterProps};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::transport::{self, TransportReader, TransportWriter};
use super::{ClientError, ClientEvent, ConnectionDetails, ConnectionTimings};
use crate::application::surface_link::SurfaceLink;

/// Where the connection currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    AwaitingBegin,
    Ready,
}

#[derive(Debug, Clone, Copy)]
enum Registration {
    Pending(Instant),
    Registered,
}

/// What the session loop should do after one inbound line.
#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Continue,
    PongReceived,
    Close,
}

struct State {
    details: Option<ConnectionDetails>,
    phase: ConnectionPhase,
    generation: u64,
    /// Cancels the connection loop of the current generation.
    active: Option<CancellationToken>,
    /// Lines queued for the open socket.
    outbound: Option<mpsc::UnboundedSender<String>>,
    capabilities: Option<Capabilities>,
    registrations: HashMap<String, Registration>,
    /// The last `BEGIN` announced an unsupported API version.
    unsupported: bool,
}

pub struct ConnectionManager {
    timings: ConnectionTimings,
    events: mpsc::UnboundedSender<ClientEvent>,
    state: Mutex<State>,
}

impl ConnectionManager {
    /// Creates an idle manager and the receiver for its events.
    pub fn new(timings: ConnectionTimings) -> (Arc<Self>, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            timings,
            events,
            state: Mutex::new(State {
                details: None,
                phase: ConnectionPhase::Disconnected,
                generation: 0,
                active: None,
                outbound: None,
                capabilities: None,
                registrations: HashMap::new(),
                unsupported: false,
            }),
        });
        (manager, rx)
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.lock().phase
    }

    pub fn connection_details(&self) -> Option<ConnectionDetails> {
        self.lock().details.clone()
    }

    /// `true` once the server acknowledged `ADD-DEVICE` for this surface.
    pub fn is_registered(&self, surface_id: &str) -> bool {
        matches!(
            self.lock().registrations.get(surface_id),
            Some(Registration::Registered)
        )
    }

    /// Starts connecting to `details`, replacing any current session.
    ///
    /// Calling it again with the same details while a connection loop is
    /// running does nothing.
    pub fn connect(self: &Arc<Self>, details: ConnectionDetails) {
        let mut state = self.lock();
        if state.active.is_some() && state.details.as_ref() == Some(&details) {
            debug!("already connecting to {details}");
            return;
        }

        let was_ready = Self::teardown(&mut state);
        state.details = Some(details.clone());
        let cancel = CancellationToken::new();
        state.active = Some(cancel.clone());
        let generation = state.generation;
        drop(state);

        if was_ready {
            self.emit(ClientEvent::Disconnected);
        }
        tokio::spawn(Arc::clone(self).connection_loop(generation, details, cancel));
    }

    /// Closes the current session and stops reconnecting.
    pub fn disconnect(&self) {
        let mut state = self.lock();
        if state.active.is_none() {
            return;
        }
        let was_ready = Self::teardown(&mut state);
        state.details = None;
        drop(state);

        info!("disconnected on request");
        if was_ready {
            self.emit(ClientEvent::Disconnected);
        }
    }

    /// Invalidates the current generation.  Returns whether it was `Ready`.
    fn teardown(state: &mut State) -> bool {
        if let Some(cancel) = state.active.take() {
            cancel.cancel();
        }
        state.generation += 1;
        let was_ready = state.phase == ConnectionPhase::Ready;
        Self::reset_session(state);
        state.unsupported = false;
        was_ready
    }

    fn reset_session(state: &mut State) {
        state.phase = ConnectionPhase::Disconnected;
        state.outbound = None;
        state.capabilities = None;
        state.registrations.clear();
    }

    // ── Connection loop ───────────────────────────────────────────────────────

    async fn connection_loop(
        self: Arc<Self>,
        generation: u64,
        details: ConnectionDetails,
        cancel: CancellationToken,
    ) {
        loop {
            if !self.begin_attempt(generation) {
                break;
            }
            info!("connecting to {details}");

            let opened = tokio::select! {
                _ = cancel.cancelled() => break,
                opened = transport::open(&details) => opened,
            };
            match opened {
                Ok((reader, writer)) => {
                    self.run_session(generation, &details, reader, writer, &cancel)
                        .await;
                }
                Err(e) => {
                    warn!("could not connect to {details}: {e}");
                    self.emit(ClientEvent::Error(e.to_string()));
                }
            }

            let Some(delay) = self.session_closed(generation) else {
                break;
            };
            info!("reconnecting to {details} in {delay:?}");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = time::sleep(delay) => {}
            }
        }
        debug!(generation, "connection loop stopped");
    }

    fn begin_attempt(&self, generation: u64) -> bool {
        {
            let mut state = self.lock();
            if state.generation != generation {
                return false;
            }
            state.phase = ConnectionPhase::Connecting;
        }
        self.emit(ClientEvent::Connecting);
        true
    }

    /// Installs the outbound channel for a freshly opened socket.
    fn install_session(&self, generation: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.phase = ConnectionPhase::AwaitingBegin;
        state.outbound = Some(outbound);
        state.registrations.clear();
        state.capabilities = None;
        true
    }

    /// Clears session state after the socket closed.
    ///
    /// Returns the reconnect delay, or `None` if this generation was
    /// superseded in the meantime.
    fn session_closed(&self, generation: u64) -> Option<Duration> {
        let mut state = self.lock();
        if state.generation != generation {
            return None;
        }
        let was_ready = state.phase == ConnectionPhase::Ready;
        Self::reset_session(&mut state);
        let delay = if std::mem::take(&mut state.unsupported) {
            self.timings.unsupported_reconnect_delay
        } else {
            self.timings.reconnect_delay
        };
        drop(state);

        if was_ready {
            info!("session closed");
            self.emit(ClientEvent::Disconnected);
        }
        Some(delay)
    }

    async fn run_session(
        &self,
        generation: u64,
        details: &ConnectionDetails,
        mut reader: TransportReader,
        mut writer: TransportWriter,
        cancel: &CancellationToken,
    ) {
        enum Step {
            Stop,
            Received(Result<Option<Vec<u8>>, ClientError>),
            Send(String),
            Tick,
        }

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
        if !self.install_session(generation, outbound.clone()) {
            writer.close().await;
            return;
        }
        info!("transport open to {details}; awaiting BEGIN");

        let mut buffer = LineBuffer::new();
        let mut unacked: u32 = 0;
        let mut last_received = Instant::now();
        let mut ticker = time::interval_at(
            Instant::now() + self.timings.ping_interval,
            self.timings.ping_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => Step::Stop,
                chunk = reader.read_chunk() => Step::Received(chunk),
                Some(line) = outbound_rx.recv() => Step::Send(line),
                _ = ticker.tick() => Step::Tick,
            };

            match step {
                Step::Stop => break,
                Step::Received(Ok(Some(chunk))) => {
                    last_received = Instant::now();
                    let mut close = false;
                    for line in buffer.push_bytes(&chunk) {
                        match self.handle_line(generation, &line, &outbound) {
                            LineOutcome::Continue => {}
                            LineOutcome::PongReceived => unacked = 0,
                            LineOutcome::Close => {
                                close = true;
                                break;
                            }
                        }
                    }
                    if close {
                        break;
                    }
                }
                Step::Received(Ok(None)) => {
                    info!("server closed the connection");
                    break;
                }
                Step::Received(Err(e)) => {
                    warn!("read error: {e}");
                    self.emit(ClientEvent::Error(e.to_string()));
                    break;
                }
                Step::Send(line) => {
                    if let Err(e) = writer.send_line(&line).await {
                        warn!("write error: {e}");
                        self.emit(ClientEvent::Error(e.to_string()));
                        break;
                    }
                }
                Step::Tick => {
                    if unacked > self.timings.max_unacked_pings
                        && last_received.elapsed() > self.timings.idle_timeout
                    {
                        warn!(unacked, "ping timeout; closing connection");
                        break;
                    }
                    unacked += 1;
                    let ping = OutboundMessage::Ping {
                        payload: timestamp_millis().to_string(),
                    };
                    if let Err(e) = writer.send_line(&ping.to_line()).await {
                        warn!("write error: {e}");
                        break;
                    }
                }
            }
        }

        writer.close().await;
    }

    // ── Inbound dispatch ──────────────────────────────────────────────────────

    fn handle_line(
        &self,
        generation: u64,
        line: &str,
        outbound: &mpsc::UnboundedSender<String>,
    ) -> LineOutcome {
        let message = match InboundMessage::parse(line) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("ignoring unknown command {}", split_command(line).0);
                return LineOutcome::Continue;
            }
            Err(e) => {
                warn!("dropping malformed line: {e}");
                return LineOutcome::Continue;
            }
        };

        match message {
            InboundMessage::Ping { payload } => {
                let _ = outbound.send(OutboundMessage::Pong { payload }.to_line());
            }
            InboundMessage::Pong => return LineOutcome::PongReceived,
            InboundMessage::Begin {
                companion_version,
                api_version,
            } => return self.handle_begin(generation, companion_version, api_version),
            InboundMessage::KeyState(state) => self.emit(ClientEvent::Draw(state)),
            InboundMessage::KeysClear { surface_id } => {
                self.emit(ClientEvent::ClearDeck { surface_id })
            }
            InboundMessage::VariableValue {
                surface_id,
                name,
                value,
            } => self.emit(ClientEvent::VariableValue {
                surface_id,
                name,
                value,
            }),
            InboundMessage::LockedState {
                surface_id,
                locked,
                character_count,
            } => self.emit(ClientEvent::LockedState {
                surface_id,
                locked,
                character_count,
            }),
            InboundMessage::Brightness {
                surface_id,
                percent,
            } => self.emit(ClientEvent::Brightness {
                surface_id,
                percent,
            }),
            InboundMessage::AddDevice { surface_id, result } => {
                self.handle_add_device_result(surface_id, result)
            }
            InboundMessage::RemoveDevice { surface_id } => {
                self.lock().registrations.remove(&surface_id);
                self.emit(ClientEvent::DeviceRemoved { surface_id });
            }
        }
        LineOutcome::Continue
    }

    fn handle_begin(
        &self,
        generation: u64,
        companion_version: Option<String>,
        api_version: Option<ApiVersion>,
    ) -> LineOutcome {
        let negotiated = api_version
            .and_then(|api| Capabilities::negotiate(companion_version.clone(), api));

        let mut state = self.lock();
        if state.generation != generation {
            return LineOutcome::Close;
        }
        match negotiated {
            Some(capabilities) => {
                state.phase = ConnectionPhase::Ready;
                state.capabilities = Some(capabilities.clone());
                drop(state);

                info!(
                    companion = companion_version.as_deref().unwrap_or("unknown"),
                    api = %capabilities.api_version,
                    "session ready"
                );
                self.emit(ClientEvent::Connected(capabilities));
                LineOutcome::Continue
            }
            None => {
                state.unsupported = true;
                drop(state);

                let announced = api_version.map_or_else(|| "none".to_string(), |v| v.to_string());
                warn!(
                    "server API version {announced} is not supported (need {} or newer)",
                    ApiVersion::MINIMUM
                );
                self.emit(ClientEvent::Error(format!(
                    "unsupported server API version {announced}"
                )));
                LineOutcome::Close
            }
        }
    }

    fn handle_add_device_result(&self, surface_id: String, result: AddDeviceResult) {
        match result {
            AddDeviceResult::Ok => {
                self.lock()
                    .registrations
                    .insert(surface_id.clone(), Registration::Registered);
                self.emit(ClientEvent::NewDevice { surface_id });
            }
            AddDeviceResult::Error(message) => {
                self.lock().registrations.remove(&surface_id);
                self.emit(ClientEvent::DeviceErrored {
                    surface_id,
                    message,
                });
            }
        }
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    /// Queues `message` if a session is ready; otherwise drops it.
    fn send(&self, message: OutboundMessage) {
        let outbound = {
            let state = self.lock();
            if state.phase != ConnectionPhase::Ready {
                return;
            }
            state.outbound.clone()
        };
        if let Some(outbound) = outbound {
            let _ = outbound.send(message.to_line());
        }
    }

    fn emit(&self, event: ClientEvent) {
        // No receiver means the daemon is shutting down.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SurfaceLink for ConnectionManager {
    fn add_device(
        &self,
        surface_id: &str,
        product_name: &str,
        props: &RegisterProps,
    ) -> anyhow::Result<()> {
        let mut state = self.lock();
        match state.registrations.get(surface_id) {
            Some(Registration::Registered) => {
                return Err(ClientError::AlreadyRegistered(surface_id.to_string()).into());
            }
            Some(Registration::Pending(since))
                if since.elapsed() < self.timings.registration_timeout =>
            {
                return Err(ClientError::RegistrationPending(surface_id.to_string()).into());
            }
            _ => {}
        }

        if state.phase != ConnectionPhase::Ready {
            debug!(surface = %surface_id, "not connected; registration deferred");
            return Ok(());
        }
        let Some(outbound) = state.outbound.clone() else {
            return Ok(());
        };
        let lock_overlay = state
            .capabilities
            .as_ref()
            .is_some_and(|caps| caps.supports_lock_overlay);
        state
            .registrations
            .insert(surface_id.to_string(), Registration::Pending(Instant::now()));
        drop(state);

        let message = OutboundMessage::AddDevice {
            surface_id: surface_id.to_string(),
            product_name: product_name.to_string(),
            props: props.clone(),
            pincode_lock: lock_overlay && props.supports_pincode(),
        };
        let _ = outbound.send(message.to_line());
        Ok(())
    }

    fn remove_device(&self, surface_id: &str) {
        self.lock().registrations.remove(surface_id);
        self.send(OutboundMessage::RemoveDevice {
            surface_id: surface_id.to_string(),
        });
    }

    fn key_down_xy(&self, surface_id: &str, position: GridPos) {
        self.send(OutboundMessage::KeyPress {
            surface_id: surface_id.to_string(),
            position,
            pressed: true,
        });
    }

    fn key_up_xy(&self, surface_id: &str, position: GridPos) {
        self.send(OutboundMessage::KeyPress {
            surface_id: surface_id.to_string(),
            position,
            pressed: false,
        });
    }

    fn rotate_left_xy(&self, surface_id: &str, position: GridPos) {
        self.send(OutboundMessage::KeyRotate {
            surface_id: surface_id.to_string(),
            position,
            right: false,
        });
    }

    fn rotate_right_xy(&self, surface_id: &str, position: GridPos) {
        self.send(OutboundMessage::KeyRotate {
            surface_id: surface_id.to_string(),
            position,
            right: true,
        });
    }

    fn pincode_key(&self, surface_id: &str, digit: u8) {
        self.send(OutboundMessage::PincodeKey {
            surface_id: surface_id.to_string(),
            digit,
        });
    }

    fn send_variable_value(&self, surface_id: &str, name: &str, value: &str) {
        self.send(OutboundMessage::SetVariableValue {
            surface_id: surface_id.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn capabilities(&self) -> Option<Capabilities> {
        self.lock().capabilities.clone()
    }

    fn host(&self) -> String {
        self.lock()
            .details
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
