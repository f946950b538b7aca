// Source retrieval and output redirection commands

use crate::commands::data_commands;
use crate::protocol::DbgpResult;
use crate::session::DbgpSession;
use crate::types::{StreamKind, StreamMode};

impl DbgpSession {
    /// Source text of `uri`, optionally limited to lines `begin..=end`
    pub async fn source(&self, uri: Option<&str>, begin: Option<u32>, end: Option<u32>) -> DbgpResult<String> {
        let request = self
            .create_request(data_commands::SOURCE)
            .with_optional("-f", uri)
            .with_optional("-b", begin)
            .with_optional("-e", end);

        let response = self.communicate(request).await?;
        let bytes = response.root.decoded_text()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Redirect the debuggee's stdout to stream packets
    pub async fn redirect_stdout(&self, mode: StreamMode) -> DbgpResult<bool> {
        self.redirect(StreamKind::Stdout, mode).await
    }

    pub async fn redirect_stderr(&self, mode: StreamMode) -> DbgpResult<bool> {
        self.redirect(StreamKind::Stderr, mode).await
    }

    async fn redirect(&self, kind: StreamKind, mode: StreamMode) -> DbgpResult<bool> {
        let command = match kind {
            StreamKind::Stdout => data_commands::STDOUT,
            StreamKind::Stderr => data_commands::STDERR,
        };
        let request = self.create_request(command).with_option("-c", mode.code());

        let response = self.communicate(request).await?;
        Ok(response.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbgpConfig;
    use crate::protocol::DbgpError;
    use crate::testing::{response_xml, session_pair, TEST_WAIT};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_source_range() {
        let (session, mut engine) = session_pair(DbgpConfig::default());
        let session = Arc::new(session);

        let call = {
            let session = session.clone();
            tokio::spawn(async move { session.source(Some("file:///t.tcl"), Some(2), Some(3)).await })
        };
        let request = engine.next_request().await;
        assert_eq!(request.option("-f"), Some("file:///t.tcl"));
        assert_eq!(request.option("-b"), Some("2"));
        assert_eq!(request.option("-e"), Some("3"));
        // "puts a\nputs b\n"
        engine
            .send_xml(&response_xml(&request, r#"success="1" encoding="base64""#, "cHV0cyBhCnB1dHMgYgo="))
            .await;

        assert_eq!(call.await.unwrap().unwrap(), "puts a\nputs b\n");
    }

    #[tokio::test]
    async fn test_source_unavailable() {
        let (session, engine) = session_pair(DbgpConfig::default());
        let _engine = engine.serve(|request| {
            Some(response_xml(request, "", r#"<error code="100"/>"#))
        });

        match session.source(Some("file:///gone.py"), None, None).await {
            Err(DbgpError::Remote { code, message }) => {
                assert_eq!(code, 100);
                assert!(!message.is_empty());
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redirect_then_receive_stream() {
        let (session, mut engine) = session_pair(DbgpConfig::default());
        let session = Arc::new(session);

        let call = {
            let session = session.clone();
            tokio::spawn(async move { session.redirect_stdout(StreamMode::Copy).await })
        };
        let request = engine.next_request().await;
        assert_eq!(request.command(), "stdout");
        assert_eq!(request.option("-c"), Some("1"));
        engine
            .send_xml(&response_xml(&request, r#"success="1""#, ""))
            .await;
        assert!(call.await.unwrap().unwrap());

        engine
            .send_xml(r#"<stream xmlns="urn:debugger_protocol_v1" type="stdout" encoding="base64">aGVsbG8K</stream>"#)
            .await;
        let stream = session.receive_stream(TEST_WAIT).await.unwrap().unwrap();
        assert_eq!(stream.kind, StreamKind::Stdout);
        assert_eq!(stream.text(), "hello\n");
    }
}
