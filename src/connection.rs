//! Server connection manager: ordered rotation with additive backoff.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{error, info, info_span, warn, Instrument};

use crate::models::server::ServerEndpoint;
use crate::models::state::{AgentRuntimeState, INITIAL_ROTATION_ATTEMPTS};
use crate::pacing::Pacer;
use crate::transport::SessionSocket;
use crate::Result;

/// Backoff units added each time rotation wraps past the last server.
pub const WRAPAROUND_PENALTY: u32 = 10;

/// Units to wait before closing the previous socket.
pub const DRAIN_DELAY_UNITS: u32 = 1;

/// Resolve-and-connect strategy.
///
/// An implementation leaves a connected socket in `slot` on success and
/// leaves it empty on any network-class failure (logging the reason).
/// `Err` is reserved for failures that make further attempts meaningless.
pub trait Connector: Send {
    /// Attempt to open a session socket to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Resolver` when the resolver channel is
    /// desynchronized.
    fn resolve_connect<'a>(
        &'a mut self,
        endpoint: &'a ServerEndpoint,
        slot: &'a mut Option<SessionSocket>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Owns the connect strategy and drives rotation over the server list.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    pacer: Arc<dyn Pacer>,
}

impl ConnectionManager {
    /// Manager using `connector` for each attempt and `pacer` for backoff.
    #[must_use]
    pub fn new(connector: Box<dyn Connector>, pacer: Arc<dyn Pacer>) -> Self {
        Self { connector, pacer }
    }

    /// Connect to some configured server, starting at `starting_index`.
    ///
    /// Retries forever: each failure advances to the next server, and each
    /// pass over the whole list adds [`WRAPAROUND_PENALTY`] units to the
    /// sleep before starting over at the first server. On return the state
    /// holds a non-blocking socket and `active_index` names its server.
    ///
    /// # Errors
    ///
    /// Only propagates fatal connector errors (resolver desync).
    pub async fn connect(
        &mut self,
        state: &mut AgentRuntimeState,
        starting_index: usize,
    ) -> Result<()> {
        let mut index = state.servers.normalize(starting_index);
        let multi = state.servers.has_alternates();
        state.counters.rotation_attempts = INITIAL_ROTATION_ATTEMPTS;

        if let Some(previous) = state.socket.take() {
            self.pacer.pause(DRAIN_DELAY_UNITS).await;
            drop(previous);

            if multi {
                let server = state.servers.at(index);
                info!(server = %server.address, port = %server.port, "closing connection to server");
            }
        }

        loop {
            let endpoint = state.servers.at(index).clone();
            let span = info_span!("connect", server = %endpoint.address, port = %endpoint.port);

            async {
                info!("trying to connect to server");
                self.connector
                    .resolve_connect(&endpoint, &mut state.socket)
                    .await
            }
            .instrument(span)
            .await?;

            if let Some(socket) = state.socket.as_ref() {
                match socket.set_nonblocking() {
                    Ok(()) => {
                        state.active_index = index;
                        info!(server = %endpoint.address, port = %endpoint.port, "server socket ready");
                        return Ok(());
                    }
                    Err(err) => {
                        warn!(server = %endpoint.address, %err, "failed to set socket non-blocking");
                        state.socket = None;
                    }
                }
            }

            warn!(server = %endpoint.address, port = %endpoint.port, "unable to connect to server");
            index += 1;

            if state.servers.get(index).is_none() {
                state.counters.rotation_attempts =
                    state.counters.rotation_attempts.saturating_add(WRAPAROUND_PENALTY);

                if multi {
                    error!(
                        backoff_units = state.counters.rotation_attempts,
                        "unable to connect to any server"
                    );
                }

                self.pacer.pause(state.counters.rotation_attempts).await;
                index = 0;
            }
        }
    }
}
