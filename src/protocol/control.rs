//! Control messages exchanged with the collector.
//!
//! A control message is the plaintext `#!-` header followed by a token.
//! Tokens carry their trailing space on the wire, so comparisons are exact
//! string equality, never prefix matches.

/// Prefix identifying a control message.
pub const CONTROL_HEADER: &str = "#!-";

/// Agent → collector: request a session.
pub const STARTUP_TOKEN: &str = "agent startup ";

/// Collector → agent: session accepted.
pub const ACK_TOKEN: &str = "agent ack ";

/// Agent → collector: session still alive.
pub const KEEPALIVE_TOKEN: &str = "agent keepalive ";

/// Queue identifier for locally generated log records.
pub const LOCALFILE_QUEUE: char = '1';

/// Location tag used for agent-generated records.
pub const AGENT_LOCATION: &str = "hostwatch";

/// Decoded control token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlToken {
    /// Session request.
    Startup,
    /// Session accepted.
    Ack,
    /// Keep-alive.
    Keepalive,
    /// Any other recognized-header payload.
    Other(String),
}

impl ControlToken {
    fn as_wire(&self) -> &str {
        match self {
            Self::Startup => STARTUP_TOKEN,
            Self::Ack => ACK_TOKEN,
            Self::Keepalive => KEEPALIVE_TOKEN,
            Self::Other(raw) => raw,
        }
    }
}

/// Render `token` as a complete plaintext control message.
#[must_use]
pub fn encode(token: &ControlToken) -> String {
    format!("{CONTROL_HEADER}{}", token.as_wire())
}

/// Parse a decrypted payload.
///
/// Returns `None` when the header does not match; such messages are
/// ignored by the handshake.
#[must_use]
pub fn parse(plaintext: &str) -> Option<ControlToken> {
    let body = plaintext.strip_prefix(CONTROL_HEADER)?;
    let token = match body {
        STARTUP_TOKEN => ControlToken::Startup,
        ACK_TOKEN => ControlToken::Ack,
        KEEPALIVE_TOKEN => ControlToken::Keepalive,
        other => ControlToken::Other(other.to_owned()),
    };
    Some(token)
}

/// Whether `plaintext` is exactly the ACK control message.
#[must_use]
pub fn is_ack(plaintext: &str) -> bool {
    matches!(parse(plaintext), Some(ControlToken::Ack))
}

/// Startup record announced once the first session is established.
#[must_use]
pub fn agent_started_message(name: &str, ip: &str) -> String {
    format!("{AGENT_LOCATION}: Agent started: '{name}->{ip}'.")
}

/// Queue-tagged form of `message` as handed to the outbound channel.
#[must_use]
pub fn queue_record(queue: char, location: &str, message: &str) -> String {
    format!("{queue}:{location}:{message}")
}

/// Shutdown record emitted when the agent is stopped.
#[must_use]
pub fn agent_stopped_message(name: &str, ip: &str) -> String {
    format!("{AGENT_LOCATION}: Agent stopped: '{name}->{ip}'.")
}
