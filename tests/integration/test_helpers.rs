//! Shared test doubles for connectivity integration tests.
//!
//! Provides a scripted in-memory collector network (`ScriptedConnector`
//! handing out `MockTransport`s), a `RecordingPacer` that records every
//! backoff sleep instead of sleeping, and log capture for asserting on
//! emitted messages.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hostwatch_agent::connection::{ConnectionManager, Connector};
use hostwatch_agent::handshake::HandshakeCoordinator;
use hostwatch_agent::models::server::{ServerEndpoint, ServerList};
use hostwatch_agent::models::state::AgentRuntimeState;
use hostwatch_agent::pacing::Pacer;
use hostwatch_agent::protocol::control::{self, ControlToken};
use hostwatch_agent::protocol::{KeyedDigestCipher, SessionCipher};
use hostwatch_agent::transport::{SessionSocket, Transport};
use hostwatch_agent::Result;

/// Key shared by the agent under test and the scripted collectors.
pub const TEST_KEY: &str = "integration-test-key";

pub fn cipher() -> Arc<KeyedDigestCipher> {
    Arc::new(KeyedDigestCipher::new(TEST_KEY))
}

pub fn sealed_ack() -> Vec<u8> {
    KeyedDigestCipher::new(TEST_KEY).encrypt_for_send(&control::encode(&ControlToken::Ack))
}

pub fn servers(names: &[&str]) -> ServerList {
    ServerList::new(names.iter().map(|s| (*s).to_owned()).collect(), "1514").expect("server list")
}

pub fn state(names: &[&str]) -> AgentRuntimeState {
    AgentRuntimeState::new(servers(names))
}

// ── Pacer ────────────────────────────────────────────────────────────────────

/// Records requested sleeps and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingPacer {
    pauses: Arc<Mutex<Vec<u32>>>,
}

impl RecordingPacer {
    pub fn pauses(&self) -> Vec<u32> {
        self.pauses.lock().expect("pauses lock").clone()
    }

    pub fn clear(&self) {
        self.pauses.lock().expect("pauses lock").clear();
    }
}

impl Pacer for RecordingPacer {
    fn pause(&self, units: u32) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.pauses.lock().expect("pauses lock").push(units);
        Box::pin(async {})
    }
}

// ── Scripted collectors ──────────────────────────────────────────────────────

/// What a collector sends back after receiving its `n`th datagram (1-based,
/// counted per server across every socket opened to it).
pub type Responder = Arc<dyn Fn(usize) -> Option<Vec<u8>> + Send + Sync>;

/// Behavior of one scripted collector.
#[derive(Clone)]
pub struct ServerScript {
    /// Connect attempts that fail before the server becomes reachable.
    pub connect_failures: usize,
    /// Every receive on the socket fails.
    pub recv_error: bool,
    /// Datagram returned by every receive, regardless of what was sent.
    pub flood: Option<Vec<u8>>,
    pub respond: Responder,
}

impl ServerScript {
    pub fn unreachable() -> Self {
        Self {
            connect_failures: usize::MAX,
            ..Self::silent()
        }
    }

    pub fn silent() -> Self {
        Self {
            connect_failures: 0,
            recv_error: false,
            flood: None,
            respond: Arc::new(|_| None),
        }
    }

    /// ACKs every datagram it receives.
    pub fn acking() -> Self {
        Self {
            respond: Arc::new(|_| Some(sealed_ack())),
            ..Self::silent()
        }
    }

    /// ACKs only the `n`th datagram.
    pub fn ack_on_send(n: usize) -> Self {
        Self {
            respond: Arc::new(move |count| (count == n).then(sealed_ack)),
            ..Self::silent()
        }
    }

    /// Replies to every datagram with `reply`.
    pub fn replying(reply: Vec<u8>) -> Self {
        Self {
            respond: Arc::new(move |_| Some(reply.clone())),
            ..Self::silent()
        }
    }

    pub fn recv_error() -> Self {
        Self {
            recv_error: true,
            ..Self::silent()
        }
    }

    /// Never runs out of `datagram`s to deliver.
    pub fn flooding(datagram: Vec<u8>) -> Self {
        Self {
            flood: Some(datagram),
            ..Self::silent()
        }
    }

    pub fn failing_connects(mut self, failures: usize) -> Self {
        self.connect_failures = failures;
        self
    }
}

/// A datagram the agent sent, decoded for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub server: String,
    pub plaintext: String,
}

/// Observation handles shared between the connector and the test.
#[derive(Clone, Default)]
pub struct NetworkLog {
    pub attempts: Arc<Mutex<Vec<String>>>,
    pub sent: Arc<Mutex<Vec<SentMessage>>>,
    pub open_sockets: Arc<AtomicUsize>,
    pub max_open_sockets: Arc<AtomicUsize>,
    pub datagrams_received: Arc<AtomicUsize>,
}

impl NetworkLog {
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().expect("attempts lock").clone()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn sent_to(&self, server: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| m.server == server)
            .map(|m| m.plaintext)
            .collect()
    }

    pub fn open_sockets(&self) -> usize {
        self.open_sockets.load(Ordering::SeqCst)
    }

    pub fn max_open_sockets(&self) -> usize {
        self.max_open_sockets.load(Ordering::SeqCst)
    }

    /// Datagrams the agent has read, across every socket.
    pub fn datagrams_received(&self) -> usize {
        self.datagrams_received.load(Ordering::SeqCst)
    }
}

/// Connector over an in-memory collector network.
pub struct ScriptedConnector {
    scripts: HashMap<String, ServerScript>,
    failures_seen: HashMap<String, usize>,
    send_counters: HashMap<String, Arc<AtomicUsize>>,
    log: NetworkLog,
}

impl ScriptedConnector {
    pub fn new(scripts: &[(&str, ServerScript)]) -> (Self, NetworkLog) {
        let log = NetworkLog::default();
        let connector = Self {
            scripts: scripts
                .iter()
                .map(|(name, script)| ((*name).to_owned(), script.clone()))
                .collect(),
            failures_seen: HashMap::new(),
            send_counters: HashMap::new(),
            log: log.clone(),
        };
        (connector, log)
    }
}

impl Connector for ScriptedConnector {
    fn resolve_connect<'a>(
        &'a mut self,
        endpoint: &'a ServerEndpoint,
        slot: &'a mut Option<SessionSocket>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.log
                .attempts
                .lock()
                .expect("attempts lock")
                .push(endpoint.address.clone());

            let Some(script) = self.scripts.get(&endpoint.address) else {
                return Ok(());
            };

            let seen = self.failures_seen.entry(endpoint.address.clone()).or_default();
            if *seen < script.connect_failures {
                *seen += 1;
                return Ok(());
            }

            let sends = Arc::clone(
                self.send_counters
                    .entry(endpoint.address.clone())
                    .or_default(),
            );
            *slot = Some(Box::new(MockTransport::open(
                endpoint.address.clone(),
                script.clone(),
                sends,
                self.log.clone(),
            )));
            Ok(())
        })
    }
}

/// In-memory connected datagram socket.
pub struct MockTransport {
    server: String,
    script: ServerScript,
    inbox: Mutex<VecDeque<Vec<u8>>>,
    sends: Arc<AtomicUsize>,
    log: NetworkLog,
}

impl MockTransport {
    fn open(
        server: String,
        script: ServerScript,
        sends: Arc<AtomicUsize>,
        log: NetworkLog,
    ) -> Self {
        let open = log.open_sockets.fetch_add(1, Ordering::SeqCst) + 1;
        log.max_open_sockets.fetch_max(open, Ordering::SeqCst);
        Self {
            server,
            script,
            inbox: Mutex::new(VecDeque::new()),
            sends,
            log,
        }
    }

    /// Queue a datagram as if the collector had sent it.
    pub fn deliver(&self, datagram: Vec<u8>) {
        self.inbox.lock().expect("inbox lock").push_back(datagram);
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.log.open_sockets.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let plaintext = KeyedDigestCipher::new(TEST_KEY)
            .authenticate_and_decrypt(buf, 0)
            .unwrap_or_else(|_| String::from("<unauthenticated>"));
        self.log.sent.lock().expect("sent lock").push(SentMessage {
            server: self.server.clone(),
            plaintext,
        });

        let count = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(reply) = (self.script.respond)(count) {
            self.deliver(reply);
        }
        Ok(buf.len())
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        if self.script.recv_error {
            return Err(io::Error::from(ErrorKind::ConnectionRefused));
        }
        let next = match &self.script.flood {
            Some(datagram) => Some(datagram.clone()),
            None => self.inbox.lock().expect("inbox lock").pop_front(),
        };
        match next {
            Some(datagram) => {
                self.log.datagrams_received.fetch_add(1, Ordering::SeqCst);
                buf[..datagram.len()].copy_from_slice(&datagram);
                Ok(Some(datagram.len()))
            }
            None => Ok(None),
        }
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        Ok(())
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([192, 0, 2, 1], 1514)))
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────────

/// Connection manager, coordinator, and observation handles for one test.
pub struct Harness {
    pub manager: ConnectionManager,
    pub coordinator: HandshakeCoordinator,
    pub pacer: RecordingPacer,
    pub log: NetworkLog,
}

pub fn harness(scripts: &[(&str, ServerScript)]) -> Harness {
    let (connector, log) = ScriptedConnector::new(scripts);
    let pacer = RecordingPacer::default();
    let shared: Arc<dyn Pacer> = Arc::new(pacer.clone());
    Harness {
        manager: ConnectionManager::new(Box::new(connector), Arc::clone(&shared)),
        coordinator: HandshakeCoordinator::new(cipher(), shared),
        pacer,
        log,
    }
}

// ── Log capture ──────────────────────────────────────────────────────────────

/// In-memory sink for formatted `tracing` output.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log lock")).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route `tracing` output on this thread into a buffer until the guard is
/// dropped.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
