//! Outbound audit channel for agent lifecycle records.
//!
//! Provides the [`AuditLogger`] trait and associated types. Records are
//! fire-and-forget from the caller's point of view: the connectivity core
//! logs a failed write and moves on. [`QueueFileWriter`] files the
//! formatted queue records per agent and day; [`TracingAuditLogger`] only emits
//! them as `tracing` events.

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::protocol::control::{queue_record, AGENT_LOCATION, LOCALFILE_QUEUE};

/// Event type classification for audit log entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// First session with a collector was established.
    AgentStarted,
    /// Agent received a shutdown signal.
    AgentStopped,
}

/// A queue-tagged, pre-formatted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp with timezone.
    pub timestamp: DateTime<Utc>,
    /// Event classification.
    pub event_type: AuditEventType,
    /// Destination queue identifier.
    pub queue: char,
    /// Location tag.
    pub location: String,
    /// Pre-formatted message text.
    pub message: String,
    /// Collector the agent was talking to, if any.
    pub server: Option<String>,
}

impl AuditEntry {
    /// Construct an entry on the local-file queue.
    #[must_use]
    pub fn new(event_type: AuditEventType, message: String) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            queue: LOCALFILE_QUEUE,
            location: AGENT_LOCATION.to_owned(),
            message,
            server: None,
        }
    }

    /// Set the collector address for this entry.
    #[must_use]
    pub fn with_server(mut self, server: String) -> Self {
        self.server = Some(server);
        self
    }

    /// `queue:location:message` form of the record.
    #[must_use]
    pub fn formatted(&self) -> String {
        queue_record(self.queue, &self.location, &self.message)
    }
}

/// Writes audit entries to the outbound channel.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing via
/// [`std::sync::Arc`].
pub trait AuditLogger: Send + Sync {
    /// Record a single audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()>;
}

/// Audit sink used when no audit directory is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()> {
        info!(
            event_type = ?entry.event_type,
            record = %entry.formatted(),
            "audit record"
        );
        Ok(())
    }
}

pub use writer::QueueFileWriter;
