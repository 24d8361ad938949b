//! Backoff sleeps expressed in configurable time units.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Suspends the control flow for a number of backoff time units.
///
/// Every retry delay in the connection manager and the handshake
/// coordinator goes through this seam.
pub trait Pacer: Send + Sync {
    /// Sleep for `units` time units.
    fn pause(&self, units: u32) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Production pacer backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy)]
pub struct TokioPacer {
    unit: Duration,
}

impl TokioPacer {
    /// Pacer whose time unit is `unit`.
    #[must_use]
    pub fn new(unit: Duration) -> Self {
        Self { unit }
    }
}

impl Pacer for TokioPacer {
    fn pause(&self, units: u32) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let delay = self.unit.saturating_mul(units);
        Box::pin(tokio::time::sleep(delay))
    }
}
