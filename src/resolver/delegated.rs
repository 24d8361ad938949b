//! Delegated resolve-and-connect through the resolver helper.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tracing::debug;

use crate::connection::Connector;
use crate::models::server::ServerEndpoint;
use crate::resolver::channel::{ResolverChannel, ResolverFrame};
use crate::resolver::{on_resolver_message, ResolverMessage};
use crate::transport::SessionSocket;
use crate::{AppError, Result};

/// Connector that sends a request over the resolver channel and suspends
/// until the helper answers.
///
/// Exactly one request is ever outstanding: the response is read before
/// `resolve_connect` returns.
pub struct DelegatedConnector<R, W> {
    channel: ResolverChannel<R, W>,
    // Held so `kill_on_drop` tears the helper down with the connector.
    _helper: Option<Child>,
}

impl<R, W> DelegatedConnector<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Connector over an already established channel.
    pub fn new(channel: ResolverChannel<R, W>) -> Self {
        Self {
            channel,
            _helper: None,
        }
    }

    /// Connector that also owns the helper process behind `channel`.
    pub fn with_helper(channel: ResolverChannel<R, W>, helper: Child) -> Self {
        Self {
            channel,
            _helper: Some(helper),
        }
    }

    async fn exchange(
        &mut self,
        endpoint: &ServerEndpoint,
        slot: &mut Option<SessionSocket>,
    ) -> Result<()> {
        self.channel.send(&ResolverFrame::request(endpoint)).await?;

        let frame = self.channel.recv().await?.ok_or_else(|| {
            AppError::Resolver(format!(
                "resolver channel closed while waiting for {}",
                endpoint.address
            ))
        })?;

        if frame.server() != endpoint.address {
            return Err(AppError::Resolver(format!(
                "response for '{}' while waiting for '{}'",
                frame.server(),
                endpoint.address
            )));
        }

        let message = ResolverMessage::from_frame(frame);
        debug!(kind = message.kind(), server = %endpoint.address, "resolver response received");
        on_resolver_message(slot, message)
    }
}

impl<R, W> Connector for DelegatedConnector<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn resolve_connect<'a>(
        &'a mut self,
        endpoint: &'a ServerEndpoint,
        slot: &'a mut Option<SessionSocket>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.exchange(endpoint, slot))
    }
}
