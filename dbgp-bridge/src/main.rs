// DBGP bridge - script debugging over stdio JSON-RPC
//
// Listens for DBGP engine connections and exposes them to an IDE-side debug
// model as JSON-RPC 2.0 methods and notifications

use anyhow::Result;
use clap::Parser;
use dbgp_client::protocol::DEFAULT_PORT;
use dbgp_client::{DbgpConfig, DbgpServer, DbgpSession};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

mod handlers;
mod protocol;
mod session;
mod tools;

use handlers::RequestHandler;
use protocol::*;
use session::SessionManager;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "dbgp-bridge", version, about)]
struct Args {
    /// Address to accept engine connections on
    #[arg(long, env = "DBGP_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "DBGP_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bound on waiting for a command's response
    #[arg(long, env = "DBGP_RESPONSE_TIMEOUT_MS", default_value_t = 10_000)]
    response_timeout_ms: u64,

    /// Bound on waiting for a connecting engine's init packet
    #[arg(long, env = "DBGP_HANDSHAKE_TIMEOUT_MS", default_value_t = 5_000)]
    handshake_timeout_ms: u64,
}

impl Args {
    fn config(&self) -> DbgpConfig {
        DbgpConfig {
            response_timeout_ms: self.response_timeout_ms,
            handshake_timeout_ms: self.handshake_timeout_ms,
            ..DbgpConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing to stderr only - stdout is reserved for JSON-RPC protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dbgp_bridge=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Starting DBGP bridge...");

    let server = DbgpServer::bind((args.host.as_str(), args.port), args.config()).await?;
    let listen_address = server.local_addr()?.to_string();

    let (outbox, mut outgoing) = Outbox::new();
    let session_manager = SessionManager::new(outbox.clone());
    let handler = Arc::new(RequestHandler::new(session_manager.clone(), listen_address));

    // Single writer so responses and notifications never interleave
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = outgoing.recv().await {
            if let Err(e) = write_line(&mut stdout, &line).await {
                error!("Failed to write to stdout: {}", e);
                break;
            }
        }
    });

    tokio::spawn(accept_engines(server, session_manager.clone()));

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);

    info!("DBGP bridge ready, waiting for requests...");

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!("Client disconnected");
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                debug!("Received: {}", line);

                match serde_json::from_str::<Value>(line) {
                    Ok(value) => {
                        // Discriminate by id field
                        if value.get("id").is_some() {
                            match serde_json::from_value::<JsonRpcRequest>(value) {
                                Ok(request) => {
                                    // Continuation commands block until the engine
                                    // stops, so each request runs on its own task
                                    let handler = handler.clone();
                                    let outbox = outbox.clone();
                                    tokio::spawn(async move {
                                        let response = handler.handle_request(request).await;
                                        outbox.respond(&response);
                                    });
                                }
                                Err(e) => {
                                    error!("Invalid request: {}", e);
                                    outbox.respond(&JsonRpcResponse::failure(
                                        Value::Null,
                                        JsonRpcError::new(INVALID_REQUEST, "Invalid request"),
                                    ));
                                }
                            }
                        } else {
                            match serde_json::from_value::<JsonRpcNotification>(value) {
                                Ok(notification) => handler.handle_notification(notification).await,
                                Err(e) => error!("Invalid notification: {}", e),
                            }
                        }
                    }
                    Err(e) => {
                        error!("Parse error: {}", e);
                        outbox.respond(&JsonRpcResponse::failure(
                            Value::Null,
                            JsonRpcError::new(PARSE_ERROR, "Parse error"),
                        ));
                    }
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        }
    }

    info!("DBGP bridge shutting down");
    for session in session_manager.list_sessions().await {
        session.request_termination().await;
        if tokio::time::timeout(SHUTDOWN_GRACE, session.wait_terminated()).await.is_err() {
            warn!("Session {} did not close in time", session.id());
        }
    }
    writer.abort();
    Ok(())
}

async fn write_line(stdout: &mut tokio::io::Stdout, line: &str) -> std::io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

/// Accept engine connections for the life of the process. Each handshake runs
/// on its own task so one silent engine does not hold up the others.
async fn accept_engines(server: DbgpServer, session_manager: SessionManager) {
    loop {
        match server.accept_stream().await {
            Ok((stream, peer)) => {
                let config = server.config().clone();
                let session_manager = session_manager.clone();
                tokio::spawn(async move {
                    match DbgpSession::from_tcp(stream, config).await {
                        Ok(session) => {
                            session_manager.register(session).await;
                        }
                        // A failed handshake only loses that one engine
                        Err(e) => warn!("Rejected engine connection from {}: {}", peer, e),
                    }
                });
            }
            Err(e) => {
                warn!("Failed to accept engine connection: {}", e);
                // Back off on listener errors such as fd exhaustion
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}
