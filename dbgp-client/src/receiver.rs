// DBGP packet receiver
//
// Owns the read half of the connection. A single background task reads framed
// packets, classifies them and routes them into three channels: responses
// (keyed by transaction id), notifications and stream output.

use crate::codec::read_packet;
use crate::config::DbgpConfig;
use crate::lifecycle::Lifecycle;
use crate::observer::PacketLoggers;
use crate::packet::{NotifyPacket, Packet, ResponsePacket, StreamPacket};
use crate::protocol::{DbgpError, DbgpResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

/// Response slots, one per registered waiter.
///
/// A slot exists from `expect_response` until the waiter takes its packet or
/// gives up. Responses that find no slot are stale and dropped.
#[derive(Default)]
struct ResponseSlots {
    slots: HashMap<u32, Option<ResponsePacket>>,
    closed: bool,
}

struct Shared {
    session_id: u64,
    responses: Mutex<ResponseSlots>,
    response_arrived: Notify,
    shutdown: Notify,
}

impl Shared {
    fn deliver_response(&self, response: ResponsePacket) {
        let transaction_id = response.transaction_id;
        {
            let mut responses = self.responses.lock();
            match responses.slots.get_mut(&transaction_id) {
                Some(slot) if slot.is_none() => *slot = Some(response),
                Some(_) => {
                    warn!(
                        "[session {}] Duplicate response for transaction {}, dropping",
                        self.session_id, transaction_id
                    );
                    return;
                }
                None => {
                    debug!(
                        "[session {}] No waiter for transaction {}, dropping response",
                        self.session_id, transaction_id
                    );
                    return;
                }
            }
        }
        self.response_arrived.notify_waiters();
    }
}

/// Handle to the receive side of a connection
pub struct PacketReceiver {
    shared: Arc<Shared>,
    notify_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<NotifyPacket>>,
    stream_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<StreamPacket>>,
}

impl PacketReceiver {
    /// Start the receive loop task
    pub fn spawn<R>(
        session_id: u64,
        reader: R,
        config: &DbgpConfig,
        loggers: PacketLoggers,
        lifecycle: Arc<Lifecycle>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            session_id,
            responses: Mutex::new(ResponseSlots::default()),
            response_arrived: Notify::new(),
            shutdown: Notify::new(),
        });

        let task = ReceiveLoop {
            shared: shared.clone(),
            notify_tx,
            stream_tx,
            loggers,
            lifecycle,
            max_packet_size: config.max_packet_size,
            read_timeout: config.read_timeout(),
        };
        tokio::spawn(task.run(reader));

        Self {
            shared,
            notify_rx: tokio::sync::Mutex::new(notify_rx),
            stream_rx: tokio::sync::Mutex::new(stream_rx),
        }
    }

    /// Register interest in a transaction before its request is sent
    pub fn expect_response(&self, transaction_id: u32) -> DbgpResult<()> {
        let mut responses = self.shared.responses.lock();
        if responses.closed {
            return Err(DbgpError::Terminated);
        }
        responses.slots.entry(transaction_id).or_insert(None);
        Ok(())
    }

    /// Drop a waiter's slot; a response arriving later is discarded
    pub fn forget_response(&self, transaction_id: u32) {
        self.shared.responses.lock().slots.remove(&transaction_id);
    }

    pub fn pending_responses(&self) -> usize {
        self.shared.responses.lock().slots.len()
    }

    /// Wait for the response to `transaction_id`.
    ///
    /// `Ok(None)` on timeout; the slot stays registered so the caller may wait
    /// again or call `forget_response`.
    pub async fn receive_response(
        &self,
        transaction_id: u32,
        timeout: Duration,
    ) -> DbgpResult<Option<ResponsePacket>> {
        let wait = async {
            loop {
                let notified = self.shared.response_arrived.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                {
                    let mut responses = self.shared.responses.lock();
                    if let Some(Some(packet)) = responses.slots.remove(&transaction_id) {
                        return Ok(packet);
                    }
                    if responses.closed {
                        return Err(DbgpError::Terminated);
                    }
                    // Waiting on an id nobody registered registers it
                    responses.slots.insert(transaction_id, None);
                }

                notified.await;
            }
        };

        with_timeout(timeout, wait).await
    }

    /// Wait for the next notify packet, in arrival order
    pub async fn receive_notify(&self, timeout: Duration) -> DbgpResult<Option<NotifyPacket>> {
        let mut rx = self.notify_rx.lock().await;
        with_timeout(timeout, async {
            rx.recv().await.ok_or(DbgpError::Terminated)
        })
        .await
    }

    /// Wait for the next chunk of debuggee output, in arrival order
    pub async fn receive_stream(&self, timeout: Duration) -> DbgpResult<Option<StreamPacket>> {
        let mut rx = self.stream_rx.lock().await;
        with_timeout(timeout, async {
            rx.recv().await.ok_or(DbgpError::Terminated)
        })
        .await
    }

    /// Ask the receive loop to stop; it unwinds and fires termination listeners
    pub fn shutdown(&self) {
        self.shared.shutdown.notify_one();
    }
}

impl std::fmt::Debug for PacketReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketReceiver")
            .field("session_id", &self.shared.session_id)
            .field("pending_responses", &self.pending_responses())
            .finish()
    }
}

async fn with_timeout<T, F>(timeout: Duration, wait: F) -> DbgpResult<Option<T>>
where
    F: Future<Output = DbgpResult<T>>,
{
    match tokio::time::timeout(timeout, wait).await {
        Ok(Ok(value)) => Ok(Some(value)),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(None),
    }
}

struct ReceiveLoop {
    shared: Arc<Shared>,
    notify_tx: mpsc::UnboundedSender<NotifyPacket>,
    stream_tx: mpsc::UnboundedSender<StreamPacket>,
    loggers: PacketLoggers,
    lifecycle: Arc<Lifecycle>,
    max_packet_size: usize,
    read_timeout: Option<Duration>,
}

impl ReceiveLoop {
    async fn run<R>(self, mut reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let session_id = self.shared.session_id;
        info!("[session {}] Receiver started", session_id);

        let failure = loop {
            let result = tokio::select! {
                biased;
                _ = self.shared.shutdown.notified() => {
                    debug!("[session {}] Receiver shutdown requested", session_id);
                    break None;
                }
                result = read_packet(&mut reader, self.max_packet_size, self.read_timeout) => result,
            };

            match result {
                Ok(Some(raw)) => self.dispatch(&raw),
                Ok(None) => {
                    info!("[session {}] Connection closed by engine", session_id);
                    break None;
                }
                Err(e) => {
                    error!("[session {}] Failed to read packet: {}", session_id, e);
                    break Some(e);
                }
            }
        };

        drop(reader);
        self.finish(failure);
    }

    fn dispatch(&self, raw: &str) {
        let session_id = self.shared.session_id;
        self.loggers.received(session_id, raw);

        match Packet::parse(raw) {
            Ok(Packet::Response(response)) => {
                debug!(
                    "[session {}] Received response id={} command={}",
                    session_id, response.transaction_id, response.command
                );
                self.shared.deliver_response(response);
            }
            Ok(Packet::Notify(notify)) => {
                debug!("[session {}] Received notify {}", session_id, notify.name);
                if self.notify_tx.send(notify).is_err() {
                    warn!("[session {}] Notify receiver dropped", session_id);
                }
            }
            Ok(Packet::Stream(stream)) => {
                debug!(
                    "[session {}] Received {} bytes of {}",
                    session_id,
                    stream.content.len(),
                    stream.kind
                );
                if self.stream_tx.send(stream).is_err() {
                    warn!("[session {}] Stream receiver dropped", session_id);
                }
            }
            Err(e) => {
                warn!("[session {}] Dropping packet: {}", session_id, e);
            }
        }
    }

    fn finish(self, failure: Option<DbgpError>) {
        self.lifecycle.begin_termination();

        self.shared.responses.lock().closed = true;
        self.shared.response_arrived.notify_waiters();

        // Closing both queues wakes any blocked notify/stream reader
        drop(self.notify_tx);
        drop(self.stream_tx);

        info!("[session {}] Receiver shutting down", self.shared.session_id);
        self.lifecycle.complete(failure.as_ref());
    }
}
