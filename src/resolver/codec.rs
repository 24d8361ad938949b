//! Line codec for the resolver channel.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! runaway or compromised helper cannot make the agent buffer without
//! bound. Each `\n`-terminated UTF-8 line is exactly one frame; a partial
//! line is never handed to the caller.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum frame length accepted on the resolver channel: 64 KiB.
pub const MAX_FRAME_BYTES: usize = 65_536;

/// Newline-delimited frame codec shared by the agent and the helper.
#[derive(Debug)]
pub struct ResolverCodec(LinesCodec);

impl ResolverCodec {
    /// Create a codec with the default [`MAX_FRAME_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_FRAME_BYTES))
    }
}

impl Default for ResolverCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ResolverCodec {
    type Item = String;
    type Error = AppError;

    /// Returns `Ok(None)` while `src` holds no complete line.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Unlike [`LinesCodec::decode_eof`], an unterminated remainder is an
    /// error rather than a final frame.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => Err(AppError::Resolver(format!(
                "truncated frame: {} bytes without terminator at end of stream",
                src.len()
            ))),
        }
    }
}

impl Encoder<String> for ResolverCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => AppError::Resolver(format!(
            "frame too long: exceeded {MAX_FRAME_BYTES} bytes"
        )),
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
