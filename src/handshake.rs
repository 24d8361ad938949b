//! Authenticated STARTUP → ACK handshake over the session socket.
//!
//! The agent sends an encrypted `agent startup` control message and polls
//! the socket for an encrypted `agent ack`. Polling is non-blocking; the
//! wait between polls grows by one time unit each time, and from the third
//! empty poll on the startup message is resent after every wait. When the
//! poll budget runs out (or the socket reports a receive error) the
//! coordinator escalates: it rotates to the next server, or with a single
//! server reconnects to it, adds to the global backoff, and starts over.
//!
//! ```text
//! AWAITING_FIRST_SEND ─▶ SENT_AWAITING_ACK ─▶ CONNECTED
//!                              ▲      │
//!                              │      ▼
//!                              └─ ROTATING
//! ```

use std::io::{self, ErrorKind};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::config::AgentIdentity;
use crate::connection::ConnectionManager;
use crate::models::state::AgentRuntimeState;
use crate::pacing::Pacer;
use crate::protocol::control::{self, ControlToken};
use crate::protocol::SessionCipher;
use crate::transport::MAX_DATAGRAM;
use crate::Result;

/// Empty polls tolerated before escalating.
pub const MAX_EMPTY_POLLS: u32 = 5;

/// Empty-poll count from which the startup message is resent.
pub const RESEND_AFTER_POLLS: u32 = 3;

/// Global backoff added after a rotation that moved to another server.
pub const ROTATION_PENALTY: u32 = 5;

/// Multiplier applied to the empty-poll count when rotation stayed put.
pub const RECEIVE_PENALTY_FACTOR: u32 = 3;

/// Datagrams read per [`HandshakeCoordinator::drain_acks`] call.
pub const MAX_DRAIN_PER_TICK: usize = 256;

/// Key id used for every datagram; agents hold exactly one key.
pub const AGENT_KEY_ID: u32 = 0;

/// How the inner receive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckWait {
    Acknowledged,
    Exhausted,
}

/// Drives the handshake and answers keep-alive polls.
pub struct HandshakeCoordinator {
    cipher: Arc<dyn SessionCipher>,
    pacer: Arc<dyn Pacer>,
    startup_audit: Option<(Arc<dyn AuditLogger>, AgentIdentity)>,
}

impl HandshakeCoordinator {
    /// Coordinator sealing messages with `cipher` and sleeping via `pacer`.
    #[must_use]
    pub fn new(cipher: Arc<dyn SessionCipher>, pacer: Arc<dyn Pacer>) -> Self {
        Self {
            cipher,
            pacer,
            startup_audit: None,
        }
    }

    /// Emit an `AgentStarted` record for `identity` after the startup
    /// handshake.
    #[must_use]
    pub fn with_startup_audit(mut self, audit: Arc<dyn AuditLogger>, identity: AgentIdentity) -> Self {
        self.startup_audit = Some((audit, identity));
        self
    }

    /// Block until the active collector acknowledges a startup message.
    ///
    /// Rotates servers and backs off as needed; never gives up. With
    /// `is_startup` the startup audit record is emitted once the ACK
    /// arrives.
    ///
    /// # Errors
    ///
    /// Only propagates fatal errors from the connection manager.
    pub async fn run_handshake(
        &self,
        state: &mut AgentRuntimeState,
        manager: &mut ConnectionManager,
        is_startup: bool,
    ) -> Result<()> {
        let span = info_span!("handshake", startup = is_startup);
        self.handshake_loop(state, manager, is_startup)
            .instrument(span)
            .await
    }

    async fn handshake_loop(
        &self,
        state: &mut AgentRuntimeState,
        manager: &mut ConnectionManager,
        is_startup: bool,
    ) -> Result<()> {
        let startup = self
            .cipher
            .encrypt_for_send(&control::encode(&ControlToken::Startup));

        loop {
            self.send(state, &startup);
            state.counters.receive_attempts = 0;

            if self.await_ack(state, &startup).await == AckWait::Acknowledged {
                self.on_connected(state, is_startup);
                return Ok(());
            }

            self.escalate(state, manager).await?;
        }
    }

    /// Send an encrypted keep-alive on the current socket.
    pub fn send_keepalive(&self, state: &AgentRuntimeState) {
        let message = self
            .cipher
            .encrypt_for_send(&control::encode(&ControlToken::Keepalive));
        self.send(state, &message);
    }

    /// Read queued datagrams, refreshing `last_ack_time` on each ACK.
    ///
    /// Stops after [`MAX_DRAIN_PER_TICK`] datagrams; the rest wait for the
    /// next call. Returns whether at least one ACK was seen.
    pub fn drain_acks(&self, state: &mut AgentRuntimeState) -> bool {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut acked = false;

        for _ in 0..MAX_DRAIN_PER_TICK {
            match poll(state, &mut buf) {
                Ok(Some(0)) => {}
                Ok(Some(len)) => {
                    if self.is_ack(state, &buf[..len]) {
                        state.last_ack_time = Some(Utc::now());
                        acked = true;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(%err, "receive failed while draining replies");
                    break;
                }
            }
        }

        acked
    }

    async fn await_ack(&self, state: &mut AgentRuntimeState, startup: &[u8]) -> AckWait {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            match poll(state, &mut buf) {
                Ok(Some(len)) if len > 0 => {
                    if self.is_ack(state, &buf[..len]) {
                        return AckWait::Acknowledged;
                    }
                    // A chatty collector must not starve the shutdown select.
                    tokio::task::yield_now().await;
                }
                Ok(_) => {
                    state.counters.receive_attempts += 1;
                    let attempts = state.counters.receive_attempts;
                    if attempts > MAX_EMPTY_POLLS {
                        return AckWait::Exhausted;
                    }

                    self.pacer.pause(attempts).await;

                    if attempts >= RESEND_AFTER_POLLS {
                        debug!(attempts, "resending startup message");
                        self.send(state, startup);
                    }
                }
                Err(err) => {
                    warn!(server = %state.active_server().address, %err, "receive from server failed");
                    return AckWait::Exhausted;
                }
            }
        }
    }

    /// Authenticate `datagram` and check for the exact ACK token.
    fn is_ack(&self, state: &AgentRuntimeState, datagram: &[u8]) -> bool {
        match self.cipher.authenticate_and_decrypt(datagram, AGENT_KEY_ID) {
            Ok(plaintext) => match control::parse(&plaintext) {
                Some(ControlToken::Ack) => true,
                Some(token) => {
                    debug!(?token, "ignoring control message");
                    false
                }
                None => {
                    debug!("ignoring message without control header");
                    false
                }
            },
            Err(failure) => {
                warn!(
                    server = %state.active_server().address,
                    %failure,
                    "error processing message from server"
                );
                false
            }
        }
    }

    fn on_connected(&self, state: &mut AgentRuntimeState, is_startup: bool) {
        state.last_ack_time = Some(Utc::now());
        let server = state.active_server();
        info!(server = %server.address, port = %server.port, "connected to server");

        if !is_startup {
            return;
        }

        if let Some((audit, identity)) = &self.startup_audit {
            let entry = AuditEntry::new(
                AuditEventType::AgentStarted,
                control::agent_started_message(&identity.name, &identity.ip),
            )
            .with_server(server.address.clone());

            if let Err(err) = audit.log_entry(entry) {
                warn!(%err, "failed to emit startup audit record");
            }
        }
    }

    async fn escalate(
        &self,
        state: &mut AgentRuntimeState,
        manager: &mut ConnectionManager,
    ) -> Result<()> {
        error!(server = %state.active_server().address, "waiting for server reply");

        let receive_penalty = state
            .counters
            .receive_attempts
            .saturating_mul(RECEIVE_PENALTY_FACTOR);

        if state.servers.has_alternates() {
            let current = state.active_index;
            info!(
                next = %state.servers.next_after(current).address,
                "trying next server in line"
            );

            manager.connect(state, current + 1).await?;

            if state.active_index == current {
                self.pause_then_penalize(state, receive_penalty).await;
            } else {
                state.counters.global_attempts =
                    state.counters.global_attempts.saturating_add(ROTATION_PENALTY);
                self.pacer.pause(state.counters.global_attempts).await;
            }
        } else {
            self.pause_then_penalize(state, receive_penalty).await;
            manager.connect(state, 0).await?;
        }

        Ok(())
    }

    /// Sleep on the current global backoff, then grow it by `penalty`.
    async fn pause_then_penalize(&self, state: &mut AgentRuntimeState, penalty: u32) {
        self.pacer.pause(state.counters.global_attempts).await;
        state.counters.global_attempts = state.counters.global_attempts.saturating_add(penalty);
    }

    fn send(&self, state: &AgentRuntimeState, payload: &[u8]) {
        let Some(socket) = state.socket.as_ref() else {
            warn!("no session socket to send on");
            return;
        };

        if let Err(err) = socket.send(payload) {
            warn!(server = %state.active_server().address, %err, "failed to send message to server");
        }
    }
}

fn poll(state: &AgentRuntimeState, buf: &mut [u8]) -> io::Result<Option<usize>> {
    match state.socket.as_ref() {
        Some(socket) => socket.try_recv(buf),
        None => Err(io::Error::from(ErrorKind::NotConnected)),
    }
}
