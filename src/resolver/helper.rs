//! Resolver helper process loop.
//!
//! Runs in the child process started with `--resolver-helper`. Reads
//! requests from stdin and answers each on stdout, one at a time. Exits
//! cleanly when the agent closes the channel.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::models::server::ServerEndpoint;
use crate::resolver::channel::{ResolverChannel, ResolverFrame};
use crate::resolver::inline::open_datagram;
use crate::transport::Transport;
use crate::{AppError, Result};

/// Resolve one request into its response frame.
pub async fn answer(server: String, port: String) -> ResolverFrame {
    let endpoint = ServerEndpoint {
        address: server,
        port: Arc::from(port),
    };

    let outcome = match open_datagram(&endpoint).await {
        Ok(socket) => socket.peer_addr(),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(addr) => ResolverFrame::ResponseOk {
            server: endpoint.address,
            addr,
        },
        Err(err) => {
            warn!(server = %endpoint.address, %err, "helper failed to resolve server");
            ResolverFrame::ResponseFail {
                server: endpoint.address,
                reason: err.to_string(),
            }
        }
    }
}

/// Serve requests until end of stream.
///
/// # Errors
///
/// Returns `AppError::Resolver` if the agent sends anything other than a
/// request, or if the channel breaks mid-frame.
pub async fn serve<R, W>(mut channel: ResolverChannel<R, W>) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    info!("resolver helper ready");

    while let Some(frame) = channel.recv().await? {
        match frame {
            ResolverFrame::Request { server, port } => {
                let reply = answer(server, port).await;
                channel.send(&reply).await?;
            }
            other => {
                return Err(AppError::Resolver(format!(
                    "helper received unexpected frame: {other:?}"
                )));
            }
        }
    }

    info!("resolver channel closed, helper exiting");
    Ok(())
}
