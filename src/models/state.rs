//! Process-lifetime agent state shared by the connection manager and the
//! handshake coordinator.

use chrono::{DateTime, Utc};

use crate::models::server::{ServerEndpoint, ServerList};
use crate::transport::SessionSocket;

/// Starting value of `rotation_attempts` for every `connect` call.
pub const INITIAL_ROTATION_ATTEMPTS: u32 = 2;

/// Starting value of `global_attempts`.
pub const INITIAL_GLOBAL_ATTEMPTS: u32 = 1;

/// Retry counters driving every backoff sleep, in time units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffCounters {
    /// Empty polls in the current handshake cycle.
    pub receive_attempts: u32,
    /// Accumulated wraparound penalty within one `connect` call.
    pub rotation_attempts: u32,
    /// Accumulated escalation penalty across handshake retries.
    pub global_attempts: u32,
}

impl Default for BackoffCounters {
    fn default() -> Self {
        Self {
            receive_attempts: 0,
            rotation_attempts: INITIAL_ROTATION_ATTEMPTS,
            global_attempts: INITIAL_GLOBAL_ATTEMPTS,
        }
    }
}

/// Connectivity state owned by the single control flow.
///
/// Holds at most one session socket; the slot is emptied (and the old
/// socket dropped) before a replacement is requested.
pub struct AgentRuntimeState {
    /// Ordered collector list.
    pub servers: ServerList,
    /// Index of the collector the current socket points at.
    pub active_index: usize,
    /// Current session socket, if connected.
    pub socket: Option<SessionSocket>,
    /// When the last ACK arrived.
    pub last_ack_time: Option<DateTime<Utc>>,
    /// Backoff counters.
    pub counters: BackoffCounters,
}

impl AgentRuntimeState {
    /// Fresh state with no socket.
    #[must_use]
    pub fn new(servers: ServerList) -> Self {
        Self {
            servers,
            active_index: 0,
            socket: None,
            last_ack_time: None,
            counters: BackoffCounters::default(),
        }
    }

    /// Endpoint at `active_index`.
    #[must_use]
    pub fn active_server(&self) -> &ServerEndpoint {
        self.servers.at(self.active_index)
    }

    /// Whether a session socket is installed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}
