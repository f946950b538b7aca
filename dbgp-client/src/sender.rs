// DBGP packet sender
//
// Owns the write half of the connection. One command is written and flushed
// per lock acquisition, so concurrent commands never interleave on the wire.

use crate::codec::Request;
use crate::observer::PacketLoggers;
use crate::protocol::{DbgpError, DbgpResult};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct PacketSender {
    session_id: u64,
    writer: Mutex<Option<BoxedWriter>>,
    loggers: PacketLoggers,
}

impl PacketSender {
    pub fn new<W>(session_id: u64, writer: W, loggers: PacketLoggers) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            session_id,
            writer: Mutex::new(Some(Box::new(writer))),
            loggers,
        }
    }

    /// Write one command. Fails with `Terminated` after `close`.
    pub async fn send_command(&self, request: &Request) -> DbgpResult<()> {
        self.loggers.sent(self.session_id, request);

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(DbgpError::Terminated)?;

        debug!(
            "[session {}] Sending command id={} {}",
            self.session_id,
            request.transaction_id(),
            request.command()
        );

        let encoded = request.encode();
        if let Err(e) = writer.write_all(&encoded).await {
            error!("[session {}] Failed to write command: {}", self.session_id, e);
            return Err(DbgpError::Transport(e));
        }
        if let Err(e) = writer.flush().await {
            error!("[session {}] Failed to flush command: {}", self.session_id, e);
            return Err(DbgpError::Transport(e));
        }

        Ok(())
    }

    /// Shut down the write half. Safe to call repeatedly.
    pub async fn close(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("[session {}] Error shutting down writer: {}", self.session_id, e);
            }
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}

impl std::fmt::Debug for PacketSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketSender")
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_request;
    use crate::observer::tests::RecordingLogger;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_concurrent_commands_do_not_interleave() {
        let (local, engine) = tokio::io::duplex(64);
        let sender = Arc::new(PacketSender::new(1, local, PacketLoggers::default()));

        let mut tasks = Vec::new();
        for id in 1..=20u32 {
            let sender = sender.clone();
            tasks.push(tokio::spawn(async move {
                let request = Request::new("property_get", id)
                    .with_option("-n", format!("$variable_with_a_long_name_{}", id));
                sender.send_command(&request).await.unwrap();
            }));
        }

        let reader = tokio::spawn(async move {
            let mut reader = BufReader::new(engine);
            let mut seen = Vec::new();
            for _ in 0..20 {
                let request = read_request(&mut reader).await.unwrap().unwrap();
                let name = request.option("-n").unwrap().to_string();
                assert_eq!(name, format!("$variable_with_a_long_name_{}", request.transaction_id()));
                seen.push(request.transaction_id());
            }
            seen
        });

        for task in tasks {
            task.await.unwrap();
        }
        let mut seen = reader.await.unwrap();
        seen.sort_unstable();
        assert_eq!(seen, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_logger_sees_request_and_close_is_idempotent() {
        let (local, _engine) = tokio::io::duplex(1024);
        let recorder = Arc::new(RecordingLogger::default());
        let loggers = PacketLoggers::default();
        loggers.add(recorder.clone());
        let sender = PacketSender::new(1, local, loggers);

        sender.send_command(&Request::new("status", 1)).await.unwrap();
        assert_eq!(recorder.sent.lock().as_slice(), &["status".to_string()]);

        sender.close().await;
        sender.close().await;
        assert!(sender.is_closed().await);
        assert!(matches!(
            sender.send_command(&Request::new("run", 2)).await,
            Err(DbgpError::Terminated)
        ));
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "engine went away")))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_failure_releases_lock() {
        let sender = PacketSender::new(1, BrokenPipe, PacketLoggers::default());

        for id in 1..=2 {
            let err = sender.send_command(&Request::new("run", id)).await.unwrap_err();
            assert!(matches!(err, DbgpError::Transport(_)));
        }
    }
}
