// Listener for incoming engine connections
//
// DBGP engines connect to the IDE, so the client side usually listens.

use crate::config::DbgpConfig;
use crate::protocol::DbgpResult;
use crate::session::DbgpSession;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::info;

pub struct DbgpServer {
    listener: TcpListener,
    config: DbgpConfig,
}

impl DbgpServer {
    pub async fn bind(addr: impl ToSocketAddrs, config: DbgpConfig) -> DbgpResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening for DBGP engines on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> DbgpResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &DbgpConfig {
        &self.config
    }

    /// Wait for the next engine connection without reading anything from it.
    /// Pair with `DbgpSession::from_tcp`, typically on a task of its own so a
    /// silent engine cannot hold up the listener.
    pub async fn accept_stream(&self) -> DbgpResult<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        info!("Engine connected from {}", peer);
        Ok((stream, peer))
    }

    /// Wait for the next engine and complete its init handshake
    pub async fn accept(&self) -> DbgpResult<DbgpSession> {
        let (stream, _) = self.accept_stream().await?;
        DbgpSession::from_tcp(stream, self.config.clone()).await
    }
}
