//! Agent assembly: state, connection manager, handshake, keep-alive.

use std::sync::Arc;

use tracing::info;

use crate::audit::{AuditLogger, QueueFileWriter, TracingAuditLogger};
use crate::config::AgentConfig;
use crate::connection::{ConnectionManager, Connector};
use crate::handshake::HandshakeCoordinator;
use crate::models::state::AgentRuntimeState;
use crate::pacing::{Pacer, TokioPacer};
use crate::protocol::{KeyedDigestCipher, SessionCipher};
use crate::session::KeepaliveSupervisor;
use crate::Result;

/// Build the audit sink selected by `config`.
///
/// # Errors
///
/// Returns `AppError::Audit` if the audit directory cannot be created.
pub fn audit_logger(config: &AgentConfig) -> Result<Arc<dyn AuditLogger>> {
    match &config.audit_dir {
        Some(dir) => Ok(Arc::new(QueueFileWriter::new(dir.clone(), &config.agent)?)),
        None => Ok(Arc::new(TracingAuditLogger)),
    }
}

/// The connectivity core of one agent process.
pub struct Agent {
    state: AgentRuntimeState,
    manager: ConnectionManager,
    coordinator: HandshakeCoordinator,
    keepalive: KeepaliveSupervisor,
}

impl Agent {
    /// Assemble an agent from explicit parts.
    #[must_use]
    pub fn new(
        state: AgentRuntimeState,
        manager: ConnectionManager,
        coordinator: HandshakeCoordinator,
        keepalive: KeepaliveSupervisor,
    ) -> Self {
        Self {
            state,
            manager,
            coordinator,
            keepalive,
        }
    }

    /// Assemble an agent from configuration and a connect strategy.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the server list is invalid.
    pub fn from_config(
        config: &AgentConfig,
        connector: Box<dyn Connector>,
        audit: Arc<dyn AuditLogger>,
    ) -> Result<Self> {
        let pacer: Arc<dyn Pacer> = Arc::new(TokioPacer::new(config.backoff_unit()));
        let cipher: Arc<dyn SessionCipher> =
            Arc::new(KeyedDigestCipher::new(config.shared_key.as_bytes()));

        let state = AgentRuntimeState::new(config.server_list()?);
        let manager = ConnectionManager::new(connector, Arc::clone(&pacer));

        let mut coordinator = HandshakeCoordinator::new(cipher, Arc::clone(&pacer));
        if config.startup_audit {
            coordinator = coordinator.with_startup_audit(audit, config.agent.clone());
        }

        let keepalive = KeepaliveSupervisor::new(&config.keepalive, pacer);

        Ok(Self::new(state, manager, coordinator, keepalive))
    }

    /// Current connectivity state.
    #[must_use]
    pub fn state(&self) -> &AgentRuntimeState {
        &self.state
    }

    /// Connect to the first reachable server and complete the startup
    /// handshake.
    ///
    /// # Errors
    ///
    /// Only propagates fatal resolver errors.
    pub async fn establish(&mut self) -> Result<()> {
        info!(servers = self.state.servers.len(), "establishing collector session");
        self.manager.connect(&mut self.state, 0).await?;
        self.coordinator
            .run_handshake(&mut self.state, &mut self.manager, true)
            .await
    }

    /// Establish the session, then keep it alive forever.
    ///
    /// # Errors
    ///
    /// Only propagates fatal resolver errors.
    pub async fn run(&mut self) -> Result<()> {
        self.establish().await?;
        self.keepalive
            .maintain(&mut self.state, &self.coordinator, &mut self.manager)
            .await
    }
}
