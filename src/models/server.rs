//! Collector endpoints and the ordered, fixed server list.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::{AppError, Result};

/// One configured collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    /// Host name or address literal as configured.
    pub address: String,
    /// Port shared by every endpoint in the list.
    pub port: Arc<str>,
}

impl Display for ServerEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Ordered collector list; never empty, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerList {
    entries: Vec<ServerEndpoint>,
}

impl ServerList {
    /// Build the list from configured addresses and the shared port.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `addresses` is empty.
    pub fn new(addresses: Vec<String>, port: &str) -> Result<Self> {
        if addresses.is_empty() {
            return Err(AppError::Config(
                "at least one server must be configured".into(),
            ));
        }

        let port: Arc<str> = Arc::from(port.trim());
        let entries = addresses
            .into_iter()
            .map(|address| ServerEndpoint {
                address,
                port: Arc::clone(&port),
            })
            .collect();

        Ok(Self { entries })
    }

    /// Endpoint at `index`, if configured.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ServerEndpoint> {
        self.entries.get(index)
    }

    /// `index` if it names an entry, otherwise the first entry.
    #[must_use]
    pub fn normalize(&self, index: usize) -> usize {
        if index < self.entries.len() {
            index
        } else {
            0
        }
    }

    /// Number of configured servers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether rotation between servers is possible.
    ///
    /// Several log messages are suppressed for single-server setups.
    #[must_use]
    pub fn has_alternates(&self) -> bool {
        self.entries.len() > 1
    }

    /// Shared port.
    #[must_use]
    pub fn port(&self) -> &str {
        &self.entries[0].port
    }

    /// Entry at `index`, or the first entry when `index` is out of range.
    #[must_use]
    pub fn at(&self, index: usize) -> &ServerEndpoint {
        &self.entries[self.normalize(index)]
    }

    /// Entry that follows `index` in rotation order, wrapping to the first.
    #[must_use]
    pub fn next_after(&self, index: usize) -> &ServerEndpoint {
        self.at(index.saturating_add(1))
    }
}
