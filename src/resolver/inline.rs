//! Inline resolve-and-connect on the agent's own control task.

use std::future::Future;
use std::io::{self, ErrorKind};
use std::pin::Pin;

use tracing::{debug, warn};

use crate::connection::Connector;
use crate::models::server::ServerEndpoint;
use crate::transport::{SessionSocket, Transport, UdpTransport};
use crate::Result;

/// Resolve `endpoint` and connect a datagram socket to the first usable
/// address.
///
/// # Errors
///
/// Returns the lookup error, or the last connect error when no resolved
/// address could be used.
pub async fn open_datagram(endpoint: &ServerEndpoint) -> io::Result<UdpTransport> {
    let port: u16 = endpoint.port.trim().parse().map_err(|_| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid port '{}'", endpoint.port),
        )
    })?;

    let mut last_err = None;
    for addr in tokio::net::lookup_host((endpoint.address.as_str(), port)).await? {
        match UdpTransport::connect(addr) {
            Ok(socket) => {
                debug!(server = %endpoint.address, %addr, "resolved server address");
                return Ok(socket);
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            ErrorKind::NotFound,
            format!("no addresses found for {}", endpoint.address),
        )
    }))
}

/// Connector that resolves in-process.
///
/// Used where no resolver helper is available or when configured with
/// `resolver.mode = "inline"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineConnector;

impl Connector for InlineConnector {
    fn resolve_connect<'a>(
        &'a mut self,
        endpoint: &'a ServerEndpoint,
        slot: &'a mut Option<SessionSocket>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match open_datagram(endpoint).await {
                Ok(socket) => {
                    let socket: SessionSocket = Box::new(socket);
                    if let Ok(peer) = socket.peer_addr() {
                        debug!(%peer, "inline connect succeeded");
                    }
                    *slot = Some(socket);
                }
                Err(err) => {
                    warn!(server = %endpoint.address, %err, "failed to resolve or connect");
                }
            }
            Ok(())
        })
    }
}
