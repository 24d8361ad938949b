//! Keep-alive supervision after the session is established.

use std::sync::Arc;

use tracing::{debug, info_span, warn, Instrument};

use crate::config::KeepaliveConfig;
use crate::connection::ConnectionManager;
use crate::handshake::HandshakeCoordinator;
use crate::models::state::AgentRuntimeState;
use crate::pacing::Pacer;
use crate::Result;

/// Result of one keep-alive cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveOutcome {
    /// The collector acknowledged during the interval.
    Acknowledged,
    /// No ACK yet, still within the reconnect window.
    Silent,
    /// The reconnect window elapsed and the handshake was re-run.
    Reestablished,
}

/// Sends keep-alives and re-runs the handshake when the collector stops
/// answering.
pub struct KeepaliveSupervisor {
    interval_units: u32,
    reconnect_after_units: u32,
    silent_units: u32,
    pacer: Arc<dyn Pacer>,
}

impl KeepaliveSupervisor {
    /// Supervisor using the configured cadence.
    #[must_use]
    pub fn new(config: &KeepaliveConfig, pacer: Arc<dyn Pacer>) -> Self {
        Self {
            interval_units: config.interval_units,
            reconnect_after_units: config.reconnect_after_units,
            silent_units: 0,
            pacer,
        }
    }

    /// Units elapsed since the last ACK, counted in whole intervals.
    #[must_use]
    pub fn silent_units(&self) -> u32 {
        self.silent_units
    }

    /// Run keep-alive cycles forever.
    ///
    /// # Errors
    ///
    /// Only propagates fatal errors from a re-run handshake.
    pub async fn maintain(
        &mut self,
        state: &mut AgentRuntimeState,
        coordinator: &HandshakeCoordinator,
        manager: &mut ConnectionManager,
    ) -> Result<()> {
        let span = info_span!("keepalive", interval_units = self.interval_units);
        loop {
            self.tick(state, coordinator, manager)
                .instrument(span.clone())
                .await?;
        }
    }

    /// One cycle: send a keep-alive, wait one interval, collect ACKs.
    ///
    /// # Errors
    ///
    /// Only propagates fatal errors from a re-run handshake.
    pub async fn tick(
        &mut self,
        state: &mut AgentRuntimeState,
        coordinator: &HandshakeCoordinator,
        manager: &mut ConnectionManager,
    ) -> Result<KeepaliveOutcome> {
        coordinator.send_keepalive(state);
        self.pacer.pause(self.interval_units).await;

        if coordinator.drain_acks(state) {
            self.silent_units = 0;
            debug!("keep-alive acknowledged");
            return Ok(KeepaliveOutcome::Acknowledged);
        }

        self.silent_units = self.silent_units.saturating_add(self.interval_units);
        if self.silent_units < self.reconnect_after_units {
            return Ok(KeepaliveOutcome::Silent);
        }

        warn!(
            server = %state.active_server().address,
            silent_units = self.silent_units,
            "server unavailable, reconnecting"
        );
        coordinator.run_handshake(state, manager, false).await?;
        self.silent_units = 0;
        Ok(KeepaliveOutcome::Reestablished)
    }
}
