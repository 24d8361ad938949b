//! Resolver mode: how the agent turns a server name into a socket.
//!
//! `ResolverMode` is used both as the `resolver.mode` config value and the
//! `--resolver` CLI override.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Strategy used by the connection manager to resolve and connect.
///
/// Defaults to [`ResolverMode::Delegated`] on Unix, where the agent can
/// run a separate helper process, and [`ResolverMode::Inline`] elsewhere.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverMode {
    /// Resolve and open the socket on the agent's own control task.
    Inline,
    /// Ask the resolver helper process over the resolver channel.
    Delegated,
}

impl Default for ResolverMode {
    fn default() -> Self {
        if cfg!(unix) {
            Self::Delegated
        } else {
            Self::Inline
        }
    }
}
