// DBGP session
//
// Binds one engine connection to a sender, a receiver loop and a lifecycle.
// Typed commands live in their own modules as further `impl DbgpSession` blocks.

use crate::codec::{read_packet, Request};
use crate::commands::features;
use crate::config::DbgpConfig;
use crate::lifecycle::{Lifecycle, SessionState};
use crate::observer::{PacketLogger, PacketLoggers, TerminationListener};
use crate::packet::{InitPacket, NotifyPacket, ResponsePacket, StreamPacket};
use crate::protocol::{DbgpError, DbgpResult};
use crate::receiver::PacketReceiver;
use crate::sender::PacketSender;
use crate::transaction::TransactionManager;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub struct DbgpSession {
    id: u64,
    init: Option<InitPacket>,
    config: DbgpConfig,
    transactions: Arc<TransactionManager>,
    loggers: PacketLoggers,
    lifecycle: Arc<Lifecycle>,
    sender: PacketSender,
    receiver: PacketReceiver,
    multiple_sessions: OnceCell<bool>,
    multiple_sessions_attempted: AtomicBool,
}

impl DbgpSession {
    /// Connect to an engine (or a DBGP proxy) that is listening
    pub async fn connect(host: &str, port: u16, config: DbgpConfig) -> DbgpResult<Self> {
        info!("Connecting to DBGP engine at {}:{}", host, port);
        let stream = TcpStream::connect((host, port)).await?;
        Self::from_tcp(stream, config).await
    }

    /// Take over an established engine connection and perform the handshake
    pub async fn from_tcp(stream: TcpStream, config: DbgpConfig) -> DbgpResult<Self> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }
        let (reader, writer) = stream.into_split();
        Self::accept_io(reader, writer, config).await
    }

    /// Read the engine's init packet from `reader`, then start the session
    pub async fn accept_io<R, W>(mut reader: R, writer: W, config: DbgpConfig) -> DbgpResult<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let init = Self::handshake(&mut reader, &config).await?;
        Ok(Self::start(reader, writer, Some(init), config))
    }

    /// Start a session on a stream pair without waiting for an init packet
    pub fn from_io<R, W>(reader: R, writer: W, config: DbgpConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::start(reader, writer, None, config)
    }

    fn start<R, W>(reader: R, writer: W, init: Option<InitPacket>, config: DbgpConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst);
        let loggers = PacketLoggers::default();
        let lifecycle = Arc::new(Lifecycle::new(id));

        let sender = PacketSender::new(id, writer, loggers.clone());
        let receiver = PacketReceiver::spawn(id, reader, &config, loggers.clone(), lifecycle.clone());

        info!("[session {}] Started", id);

        Self {
            id,
            init,
            config,
            transactions: TransactionManager::global(),
            loggers,
            lifecycle,
            sender,
            receiver,
            multiple_sessions: OnceCell::new(),
            multiple_sessions_attempted: AtomicBool::new(false),
        }
    }

    /// Wait for the init packet an engine sends right after connecting
    async fn handshake<R>(reader: &mut R, config: &DbgpConfig) -> DbgpResult<InitPacket>
    where
        R: AsyncRead + Unpin,
    {
        debug!("Waiting for DBGP init packet");

        let read = read_packet(reader, config.max_packet_size, config.read_timeout());
        let raw = match tokio::time::timeout(config.handshake_timeout(), read).await {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => {
                return Err(DbgpError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Connection closed before init packet",
                )))
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(DbgpError::Protocol(format!(
                    "No init packet within {}ms",
                    config.handshake_timeout_ms
                )))
            }
        };

        let init = InitPacket::parse(&raw)?;
        info!(
            "DBGP handshake successful (language={}, fileuri={})",
            init.language.as_deref().unwrap_or("?"),
            init.fileuri.as_deref().unwrap_or("?")
        );
        Ok(init)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn init_packet(&self) -> Option<&InitPacket> {
        self.init.as_ref()
    }

    pub fn config(&self) -> &DbgpConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    pub fn is_terminated(&self) -> bool {
        !self.lifecycle.is_connected()
    }

    pub fn receiver(&self) -> &PacketReceiver {
        &self.receiver
    }

    pub fn create_request(&self, command: &str) -> Request {
        Request::new(command, self.transactions.generate_id())
    }

    pub fn create_async_request(&self, command: &str) -> Request {
        Request::new_async(command, self.transactions.generate_id())
    }

    /// Send a request and wait for its response, bounded by the configured timeout
    pub async fn communicate(&self, request: Request) -> DbgpResult<ResponsePacket> {
        let timeout = self.config.response_timeout();
        self.communicate_with_timeout(request, timeout).await
    }

    pub async fn communicate_with_timeout(
        &self,
        request: Request,
        timeout: Duration,
    ) -> DbgpResult<ResponsePacket> {
        self.ensure_connected()?;

        let transaction_id = request.transaction_id();
        self.receiver.expect_response(transaction_id)?;
        // Released on every exit, including a caller dropping this future
        let _slot = PendingResponse {
            receiver: &self.receiver,
            transaction_id,
        };

        self.send_request(&request).await?;

        match self.receiver.receive_response(transaction_id, timeout).await? {
            Some(response) => {
                response.check_error()?;
                Ok(response)
            }
            None => {
                warn!(
                    "[session {}] No response to {} (transaction {}) within {:?}",
                    self.id,
                    request.command(),
                    transaction_id,
                    timeout
                );
                Err(DbgpError::Timeout(transaction_id))
            }
        }
    }

    /// Fire-and-forget send; any response to it is dropped as stale
    pub async fn send(&self, request: Request) -> DbgpResult<()> {
        self.ensure_connected()?;
        self.send_request(&request).await
    }

    async fn send_request(&self, request: &Request) -> DbgpResult<()> {
        match self.sender.send_command(request).await {
            Err(DbgpError::Transport(e)) => {
                warn!("[session {}] Transport failure, terminating: {}", self.id, e);
                self.request_termination().await;
                Err(DbgpError::Transport(e))
            }
            other => other,
        }
    }

    fn ensure_connected(&self) -> DbgpResult<()> {
        if self.lifecycle.is_connected() {
            Ok(())
        } else {
            Err(DbgpError::Terminated)
        }
    }

    pub async fn receive_notify(&self, timeout: Duration) -> DbgpResult<Option<NotifyPacket>> {
        self.receiver.receive_notify(timeout).await
    }

    pub async fn receive_stream(&self, timeout: Duration) -> DbgpResult<Option<StreamPacket>> {
        self.receiver.receive_stream(timeout).await
    }

    pub fn add_packet_logger(&self, logger: Arc<dyn PacketLogger>) {
        self.loggers.add(logger);
    }

    pub fn remove_packet_logger(&self, logger: &Arc<dyn PacketLogger>) {
        self.loggers.remove(logger);
    }

    pub fn add_termination_listener(&self, listener: Arc<dyn TerminationListener>) {
        self.lifecycle.add_listener(listener);
    }

    pub fn remove_termination_listener(&self, listener: &Arc<dyn TerminationListener>) {
        self.lifecycle.remove_listener(listener);
    }

    /// Close the connection. Idempotent and safe to race with a remote close.
    pub async fn request_termination(&self) {
        if self.lifecycle.begin_termination() {
            info!("[session {}] Termination requested", self.id);
        }
        self.receiver.shutdown();
        self.sender.close().await;
    }

    /// Resolves once the receiver loop has exited and listeners have fired
    pub async fn wait_terminated(&self) {
        self.lifecycle.wait_terminated().await;
    }

    /// Declare multiple-session support once per session, before the first
    /// command that needs it. Failure is only logged.
    ///
    /// The attempt is claimed before anything is sent, so a caller cancelled
    /// mid-negotiation does not cause a second `feature_set`.
    pub(crate) async fn ensure_multiple_sessions(&self) {
        self.multiple_sessions
            .get_or_init(|| async {
                if self.multiple_sessions_attempted.swap(true, Ordering::SeqCst) {
                    debug!(
                        "[session {}] {} negotiation was abandoned, not retrying",
                        self.id,
                        features::MULTIPLE_SESSIONS
                    );
                    return false;
                }

                match self.feature_set(features::MULTIPLE_SESSIONS, "1").await {
                    Ok(true) => true,
                    Ok(false) => {
                        warn!("[session {}] Engine refused {}", self.id, features::MULTIPLE_SESSIONS);
                        false
                    }
                    Err(e) => {
                        warn!(
                            "[session {}] Failed to set {}: {}",
                            self.id,
                            features::MULTIPLE_SESSIONS,
                            e
                        );
                        false
                    }
                }
            })
            .await;
    }
}

/// Drops a transaction's response slot when its waiter goes away
struct PendingResponse<'a> {
    receiver: &'a PacketReceiver,
    transaction_id: u32,
}

impl Drop for PendingResponse<'_> {
    fn drop(&mut self) {
        self.receiver.forget_response(self.transaction_id);
    }
}

impl Drop for DbgpSession {
    fn drop(&mut self) {
        self.receiver.shutdown();
    }
}

impl std::fmt::Debug for DbgpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbgpSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("init", &self.init)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_packet;
    use crate::testing::{response_xml, session_pair, TEST_WAIT};
    use std::sync::atomic::AtomicUsize;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::Barrier;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_communicate_round_trip() {
        let (session, mut engine) = session_pair(DbgpConfig::default());

        let request = session.create_request("status");
        let id = request.transaction_id();
        let call = tokio::spawn(async move {
            let response = session.communicate(request).await;
            (session, response)
        });

        let received = engine.next_request().await;
        assert_eq!(received.command(), "status");
        assert_eq!(received.transaction_id(), id);
        engine
            .send_xml(&response_xml(&received, r#"status="break" reason="ok""#, ""))
            .await;

        let (_session, response) = call.await.unwrap();
        let response = response.unwrap();
        assert_eq!(response.transaction_id, id);
        assert_eq!(response.attr("status"), Some("break"));
    }

    #[tokio::test]
    async fn test_responses_in_reverse_order_are_not_swapped() {
        let (session, mut engine) = session_pair(DbgpConfig::default());
        let session = Arc::new(session);

        let first = session.create_request("stack_depth");
        let second = session.create_request("stack_depth");
        let (first_id, second_id) = (first.transaction_id(), second.transaction_id());

        let a = {
            let session = session.clone();
            tokio::spawn(async move { session.communicate(first).await })
        };
        let b = {
            let session = session.clone();
            tokio::spawn(async move { session.communicate(second).await })
        };

        let mut requests = vec![engine.next_request().await, engine.next_request().await];
        requests.sort_by_key(|r| r.transaction_id());

        // Answer the later request first
        engine
            .send_xml(&response_xml(&requests[1], &format!(r#"depth="{}""#, second_id), ""))
            .await;
        engine
            .send_xml(&response_xml(&requests[0], &format!(r#"depth="{}""#, first_id), ""))
            .await;

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a.transaction_id, first_id);
        assert_eq!(a.attr("depth"), Some(first_id.to_string().as_str()));
        assert_eq!(b.transaction_id, second_id);
        assert_eq!(b.attr("depth"), Some(second_id.to_string().as_str()));
    }

    #[tokio::test]
    async fn test_timeout_does_not_hang() {
        let (session, _engine) = session_pair(DbgpConfig::default());

        let request = session.create_request("status");
        let id = request.transaction_id();
        let started = Instant::now();
        let result = session
            .communicate_with_timeout(request, Duration::from_millis(50))
            .await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(DbgpError::Timeout(t)) if t == id));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(200), "took {:?}", elapsed);
        assert!(!session.is_terminated());
        assert_eq!(session.receiver().pending_responses(), 0);
    }

    #[tokio::test]
    async fn test_late_response_is_dropped_after_timeout() {
        let config = DbgpConfig::default().with_response_timeout(Duration::from_millis(30));
        let (session, mut engine) = session_pair(config);

        let late = session.create_request("status");
        assert!(matches!(session.communicate(late).await, Err(DbgpError::Timeout(_))));
        let stale = engine.next_request().await;

        let next = session.create_request("status");
        let session = Arc::new(session);
        let call = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .communicate_with_timeout(next, TEST_WAIT)
                    .await
            })
        };

        let fresh = engine.next_request().await;
        engine.send_xml(&response_xml(&stale, r#"status="stale""#, "")).await;
        engine.send_xml(&response_xml(&fresh, r#"status="fresh""#, "")).await;

        let response = call.await.unwrap().unwrap();
        assert_eq!(response.attr("status"), Some("fresh"));
        assert_eq!(session.receiver().pending_responses(), 0);
        assert!(!session.is_terminated());
    }

    #[tokio::test]
    async fn test_remote_error_is_typed() {
        let (session, mut engine) = session_pair(DbgpConfig::default());
        let session = Arc::new(session);

        let call = {
            let session = session.clone();
            tokio::spawn(async move {
                let request = session.create_request("breakpoint_remove").with_option("-d", "99");
                session.communicate(request).await
            })
        };

        let received = engine.next_request().await;
        engine
            .send_xml(&response_xml(
                &received,
                "",
                r#"<error code="205"><message>no such breakpoint</message></error>"#,
            ))
            .await;

        match call.await.unwrap() {
            Err(DbgpError::Remote { code, message }) => {
                assert_eq!(code, 205);
                assert_eq!(message, "no such breakpoint");
            }
            other => panic!("expected remote error, got {:?}", other),
        }
        assert!(!session.is_terminated());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_double_termination_notifies_once() {
        let (session, _engine) = session_pair(DbgpConfig::default());
        let session = Arc::new(session);
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            session.add_termination_listener(Arc::new(move |_id: u64, _err: Option<&DbgpError>| {
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // Both callers are released together, one per worker thread
        let barrier = Arc::new(Barrier::new(2));
        let terminate = |session: Arc<DbgpSession>, barrier: Arc<Barrier>| {
            tokio::spawn(async move {
                barrier.wait().await;
                session.request_termination().await
            })
        };
        let a = terminate(session.clone(), barrier.clone());
        let b = terminate(session.clone(), barrier.clone());
        a.await.unwrap();
        b.await.unwrap();
        session.request_termination().await;

        tokio::time::timeout(TEST_WAIT, session.wait_terminated())
            .await
            .unwrap();
        session.wait_terminated().await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn test_commands_fail_after_termination() {
        let (session, _engine) = session_pair(DbgpConfig::default());
        session.request_termination().await;

        let request = session.create_request("status");
        assert!(matches!(session.communicate(request).await, Err(DbgpError::Terminated)));
        assert!(matches!(session.status().await, Err(DbgpError::Terminated)));
    }

    #[tokio::test]
    async fn test_remote_close_unblocks_waiter() {
        let (session, engine) = session_pair(DbgpConfig::default());
        let session = Arc::new(session);

        let call = {
            let session = session.clone();
            tokio::spawn(async move {
                let request = session.create_request("run");
                session.communicate_with_timeout(request, TEST_WAIT).await
            })
        };

        let mut engine = engine;
        engine.next_request().await;
        drop(engine);

        assert!(matches!(call.await.unwrap(), Err(DbgpError::Terminated)));
        tokio::time::timeout(TEST_WAIT, session.wait_terminated())
            .await
            .unwrap();
        assert!(session.is_terminated());
    }

    #[tokio::test]
    async fn test_async_request_does_not_wait() {
        let (session, mut engine) = session_pair(DbgpConfig::default());

        let request = session.create_async_request("break");
        assert!(request.is_async());
        session.send(request).await.unwrap();

        let received = engine.next_request().await;
        assert_eq!(received.command(), "break");
        assert_eq!(session.receiver().pending_responses(), 0);
    }

    #[tokio::test]
    async fn test_accept_io_reads_init_packet() {
        let (engine_side, local) = tokio::io::duplex(64 * 1024);
        let (local_read, local_write) = tokio::io::split(local);
        let (_engine_read, mut engine_write) = tokio::io::split(engine_side);

        engine_write
            .write_all(&encode_packet(
                r#"<init appid="7" idekey="dltk" language="Tcl" protocol_version="1.0" fileuri="file:///t.tcl"/>"#,
            ))
            .await
            .unwrap();

        let session = DbgpSession::accept_io(local_read, local_write, DbgpConfig::default())
            .await
            .unwrap();
        let init = session.init_packet().unwrap();
        assert_eq!(init.language.as_deref(), Some("Tcl"));
        assert_eq!(init.appid.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_accept_io_rejects_missing_init() {
        let (engine_side, local) = tokio::io::duplex(1024);
        let (local_read, local_write) = tokio::io::split(local);
        drop(engine_side);

        let result = DbgpSession::accept_io(local_read, local_write, DbgpConfig::default()).await;
        assert!(matches!(result, Err(DbgpError::Transport(_))));
    }

    #[tokio::test]
    async fn test_session_ids_increase() {
        let (a, _ea) = session_pair(DbgpConfig::default());
        let (b, _eb) = session_pair(DbgpConfig::default());
        assert!(b.id() > a.id());
    }
}
