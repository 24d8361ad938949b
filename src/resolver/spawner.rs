//! Resolver helper process spawner.
//!
//! Starts the agent's own executable with `--resolver-helper`:
//! - `env_clear()` plus a small allowlist, so the shared key and other
//!   secrets in the agent's environment never reach the helper.
//! - stdin/stdout piped and wrapped in a [`ResolverChannel`]; stderr
//!   inherited so helper logs land next to the agent's.
//! - `kill_on_drop(true)` so the helper dies with its connector.

use std::process::Stdio;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::info;

use crate::resolver::channel::ResolverChannel;
use crate::{AppError, Result};

/// Command-line flag that switches the binary into helper mode.
pub const HELPER_FLAG: &str = "--resolver-helper";

/// Environment variables inherited by the helper process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "RUST_LOG",
    "LANG",
    "TZ",
    // Windows-specific variables.
    "SystemRoot",
    "TEMP",
    "TMP",
];

/// Running helper and the agent's end of its channel.
pub struct HelperProcess {
    /// Child handle; keep it alive for `kill_on_drop`.
    pub child: Child,
    /// Agent end of the resolver channel.
    pub channel: ResolverChannel<ChildStdout, ChildStdin>,
}

/// Spawn the resolver helper.
///
/// `log_format` is forwarded so both processes log the same way.
///
/// # Errors
///
/// Returns `AppError::Resolver` if the executable cannot be located or
/// the process cannot be started.
pub fn spawn_helper(log_format: &str) -> Result<HelperProcess> {
    let exe = std::env::current_exe()
        .map_err(|err| AppError::Resolver(format!("cannot locate own executable: {err}")))?;

    let mut cmd = Command::new(exe);
    cmd.arg(HELPER_FLAG).arg("--log-format").arg(log_format);

    // Strip inherited environment, then inject only the safe allowlist.
    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Resolver(format!("failed to spawn resolver helper: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Resolver("failed to capture helper stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Resolver("failed to capture helper stdout".into()))?;

    info!(pid = ?child.id(), "resolver helper started");

    Ok(HelperProcess {
        child,
        channel: ResolverChannel::new(stdout, stdin),
    })
}
