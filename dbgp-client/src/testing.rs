// In-memory engine for exercising sessions without a real interpreter

use crate::codec::{encode_packet, read_request, Request};
use crate::commands::feature_commands;
use crate::config::DbgpConfig;
use crate::session::DbgpSession;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

pub(crate) const TEST_WAIT: Duration = Duration::from_secs(2);

pub(crate) struct FakeEngine {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

/// A session wired to a fake engine over an in-memory pipe
pub(crate) fn session_pair(config: DbgpConfig) -> (DbgpSession, FakeEngine) {
    let (engine_side, local) = tokio::io::duplex(64 * 1024);
    let (local_read, local_write) = tokio::io::split(local);
    let (engine_read, engine_write) = tokio::io::split(engine_side);

    let session = DbgpSession::from_io(local_read, local_write, config);
    let engine = FakeEngine {
        reader: BufReader::new(engine_read),
        writer: engine_write,
    };
    (session, engine)
}

impl FakeEngine {
    pub async fn next_request(&mut self) -> Request {
        tokio::time::timeout(TEST_WAIT, read_request(&mut self.reader))
            .await
            .expect("timed out waiting for a command")
            .expect("failed to read command")
            .expect("connection closed")
    }

    /// Next request that is not the multiple_sessions handshake, which is
    /// answered on the way
    pub async fn next_command(&mut self) -> Request {
        loop {
            let request = self.next_request().await;
            if request.command() == feature_commands::FEATURE_SET {
                self.send_xml(&response_xml(&request, r#"feature="multiple_sessions" success="1""#, ""))
                    .await;
                continue;
            }
            return request;
        }
    }

    pub async fn send_xml(&mut self, xml: &str) {
        self.writer.write_all(&encode_packet(xml)).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Answer every command with the handler's XML until the session closes
    pub fn serve<F>(mut self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(&Request) -> Option<String> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Ok(Some(request)) = read_request(&mut self.reader).await {
                if let Some(xml) = handler(&request) {
                    self.send_xml(&xml).await;
                }
            }
        })
    }
}

/// `<response>` for a request, with extra root attributes and inner XML
pub(crate) fn response_xml(request: &Request, attrs: &str, inner: &str) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="{}" transaction_id="{}" {}>{}</response>"#,
        request.command(),
        request.transaction_id(),
        attrs,
        inner
    )
}
