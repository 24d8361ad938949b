//! Switching the agent to an unprivileged account after start-up.

use crate::config::PrivilegeConfig;
use crate::Result;
#[cfg(unix)]
use crate::AppError;

/// Become `config.user`, replacing the group list, primary group and uid.
///
/// A missing `user` is a no-op. Supplementary groups are reset before the
/// gid so none of the launching account's groups survive.
///
/// # Errors
///
/// Returns `AppError::Config` if the user cannot be looked up or any of
/// the credential switches fails.
#[cfg(unix)]
pub fn drop_privileges(config: &PrivilegeConfig) -> Result<()> {
    use nix::unistd::{setgid, setuid, User};

    let Some(name) = config.user.as_deref() else {
        return Ok(());
    };

    let user = User::from_name(name)
        .map_err(|err| AppError::Config(format!("cannot look up user '{name}': {err}")))?
        .ok_or_else(|| AppError::Config(format!("user '{name}' does not exist")))?;

    reset_groups(name, user.gid)?;
    setgid(user.gid)
        .map_err(|err| AppError::Config(format!("failed to switch group for '{name}': {err}")))?;
    setuid(user.uid)
        .map_err(|err| AppError::Config(format!("failed to switch user to '{name}': {err}")))?;

    tracing::info!(user = name, uid = user.uid.as_raw(), gid = user.gid.as_raw(), "dropped privileges");
    Ok(())
}

#[cfg(all(unix, not(target_vendor = "apple")))]
fn reset_groups(name: &str, gid: nix::unistd::Gid) -> Result<()> {
    nix::unistd::setgroups(&[gid]).map_err(|err| {
        AppError::Config(format!("failed to reset supplementary groups for '{name}': {err}"))
    })
}

#[cfg(target_vendor = "apple")]
fn reset_groups(name: &str, _gid: nix::unistd::Gid) -> Result<()> {
    tracing::warn!(user = name, "supplementary groups are not reset on this platform");
    Ok(())
}

/// Privilege drop is unavailable; a configured user is reported and ignored.
///
/// # Errors
///
/// Never fails.
#[cfg(not(unix))]
pub fn drop_privileges(config: &PrivilegeConfig) -> Result<()> {
    if config.user.is_some() {
        tracing::warn!("privilege drop is not supported on this platform, ignoring privileges.user");
    }
    Ok(())
}
