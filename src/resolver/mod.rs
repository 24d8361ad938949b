//! Privilege-separated name resolution.
//!
//! The agent never has to perform a blocking name lookup itself. In
//! delegated mode a helper process (the same binary started with
//! `--resolver-helper`) resolves collector names and reports the address
//! it connected to; the agent then opens its own connected socket to that
//! literal address. Inline mode does the lookup on the control task.
//!
//! Both modes implement [`Connector`](crate::connection::Connector), so
//! the connection manager is written once.

pub mod channel;
pub mod codec;
pub mod delegated;
pub mod helper;
pub mod inline;
pub mod spawner;

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::models::server::ServerEndpoint;
use crate::transport::{SessionSocket, UdpTransport};
use crate::{AppError, Result};

pub use channel::{ResolverChannel, ResolverFrame};
pub use delegated::DelegatedConnector;
pub use inline::InlineConnector;

/// A resolver channel message as seen by the agent.
pub enum ResolverMessage {
    /// Resolution request; only ever valid agent → helper.
    Request(ServerEndpoint),
    /// Resolution succeeded; carries the ready socket.
    ResponseOk(SessionSocket),
    /// Resolution failed.
    ResponseFail {
        /// Server the failure is about.
        server: String,
        /// Failure reason reported by the helper.
        reason: String,
    },
}

impl ResolverMessage {
    /// Materialize a received frame.
    ///
    /// For `response_ok` this opens the agent's own socket connected to the
    /// transferred address. That involves no name lookup; if it fails the
    /// message degrades to `ResponseFail` like any other connect failure.
    #[must_use]
    pub fn from_frame(frame: ResolverFrame) -> Self {
        match frame {
            ResolverFrame::Request { server, port } => Self::Request(ServerEndpoint {
                address: server,
                port: Arc::from(port),
            }),
            ResolverFrame::ResponseOk { server, addr } => match UdpTransport::connect(addr) {
                Ok(socket) => Self::ResponseOk(Box::new(socket)),
                Err(err) => Self::ResponseFail {
                    server,
                    reason: format!("failed to open socket to {addr}: {err}"),
                },
            },
            ResolverFrame::ResponseFail { server, reason } => Self::ResponseFail { server, reason },
        }
    }

    /// Short name of the message kind, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::ResponseOk(_) => "response_ok",
            Self::ResponseFail { .. } => "response_fail",
        }
    }
}

/// Resolver callback: apply one message to the socket slot.
///
/// Never sleeps and never retries; rotation after a failure belongs to the
/// connection manager.
///
/// # Errors
///
/// Returns `AppError::Resolver` for any message the agent should never
/// receive. The caller must treat it as fatal.
pub fn on_resolver_message(
    slot: &mut Option<SessionSocket>,
    message: ResolverMessage,
) -> Result<()> {
    match message {
        ResolverMessage::ResponseOk(socket) => {
            match socket.peer_addr() {
                Ok(peer) => debug!(%peer, "resolver delivered session socket"),
                Err(err) => debug!(%err, "resolver delivered session socket"),
            }
            *slot = Some(socket);
            Ok(())
        }
        ResolverMessage::ResponseFail { server, reason } => {
            warn!(%server, %reason, "name resolution failed for server");
            Ok(())
        }
        ResolverMessage::Request(endpoint) => {
            error!(server = %endpoint, "resolver channel delivered a request to the agent");
            Err(AppError::Resolver(format!(
                "unexpected request message for {endpoint} on agent side of resolver channel"
            )))
        }
    }
}
