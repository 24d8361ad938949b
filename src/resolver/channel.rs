//! Resolver channel framing.
//!
//! One JSON object per line, tagged by `type`:
//!
//! ```json
//! {"type":"request","server":"collector.example.net","port":"1514"}
//! {"type":"response_ok","server":"collector.example.net","addr":"192.0.2.7:1514"}
//! {"type":"response_fail","server":"collector.example.net","reason":"no such host"}
//! ```
//!
//! `request` flows agent → helper; the two responses flow helper → agent.
//! Anything that does not parse as one of these frames means the two
//! processes disagree about the protocol and is reported as
//! [`AppError::Resolver`].

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::models::server::ServerEndpoint;
use crate::resolver::codec::ResolverCodec;
use crate::{AppError, Result};

/// Wire form of a resolver channel message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolverFrame {
    /// Resolve `server` and set up a datagram socket to it.
    Request {
        /// Configured host name or literal.
        server: String,
        /// Shared collector port.
        port: String,
    },
    /// Resolution and connect succeeded.
    ResponseOk {
        /// Echo of the requested server.
        server: String,
        /// Address the helper connected to.
        addr: SocketAddr,
    },
    /// Resolution or connect failed.
    ResponseFail {
        /// Echo of the requested server.
        server: String,
        /// Human-readable failure reason.
        reason: String,
    },
}

impl ResolverFrame {
    /// Request frame for `endpoint`.
    #[must_use]
    pub fn request(endpoint: &ServerEndpoint) -> Self {
        Self::Request {
            server: endpoint.address.clone(),
            port: endpoint.port.to_string(),
        }
    }

    /// Server name carried by the frame.
    #[must_use]
    pub fn server(&self) -> &str {
        match self {
            Self::Request { server, .. }
            | Self::ResponseOk { server, .. }
            | Self::ResponseFail { server, .. } => server,
        }
    }
}

/// Parse one line into a frame.
///
/// # Errors
///
/// Returns `AppError::Resolver` for malformed JSON or an unknown `type`.
pub fn parse_frame(line: &str) -> Result<ResolverFrame> {
    serde_json::from_str(line)
        .map_err(|err| AppError::Resolver(format!("unrecognized frame {line:?}: {err}")))
}

/// Bidirectional framed endpoint of the resolver channel.
///
/// The agent holds one over the helper's stdout/stdin; the helper holds
/// one over its own stdin/stdout.
pub struct ResolverChannel<R, W> {
    reader: FramedRead<R, ResolverCodec>,
    writer: FramedWrite<W, ResolverCodec>,
}

impl<R, W> ResolverChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a reader/writer pair.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(reader, ResolverCodec::new()),
            writer: FramedWrite::new(writer, ResolverCodec::new()),
        }
    }

    /// Write one frame and flush it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Resolver` if the frame cannot be written; a
    /// channel that cannot carry requests is unusable.
    pub async fn send(&mut self, frame: &ResolverFrame) -> Result<()> {
        let line = serde_json::to_string(frame)
            .map_err(|err| AppError::Resolver(format!("failed to encode frame: {err}")))?;
        self.writer
            .send(line)
            .await
            .map_err(|err| AppError::Resolver(format!("channel write failed: {err}")))?;
        debug!(server = frame.server(), "resolver frame sent");
        Ok(())
    }

    /// Read exactly one frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Resolver` for oversized, truncated, or
    /// unparseable frames, and `AppError::Io` for read failures.
    pub async fn recv(&mut self) -> Result<Option<ResolverFrame>> {
        match self.reader.next().await {
            Some(Ok(line)) => parse_frame(&line).map(Some),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}
