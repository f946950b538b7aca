// Debug session management
//
// Tracks engine connections by session id, forwards their notify and stream
// packets as JSON-RPC notifications, and forgets them once they terminate.

use crate::protocol::Outbox;
use dbgp_client::xml::XmlElement;
use dbgp_client::{DbgpError, DbgpSession, NotifyPacket, StreamPacket, TracingPacketLogger};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};

pub type SessionId = u64;

#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<SessionId, Arc<DbgpSession>>>>,
    current_session: Arc<Mutex<Option<SessionId>>>,
    outbox: Outbox,
}

impl SessionManager {
    pub fn new(outbox: Outbox) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            current_session: Arc::new(Mutex::new(None)),
            outbox,
        }
    }

    /// Track a freshly accepted session and make it current
    pub async fn register(&self, session: DbgpSession) -> SessionId {
        let session = Arc::new(session);
        let session_id = session.id();

        session.add_packet_logger(Arc::new(TracingPacketLogger));

        // The listener runs on the receiver task; the forwarder reports the
        // termination after it has relayed the last packets
        let (terminated_tx, terminated_rx) = oneshot::channel();
        let terminated_tx = StdMutex::new(Some(terminated_tx));
        session.add_termination_listener(Arc::new(move |_id: u64, error: Option<&DbgpError>| {
            let sender = terminated_tx.lock().ok().and_then(|mut slot| slot.take());
            if let Some(sender) = sender {
                let _ = sender.send(error.map(|e| e.to_string()));
            }
        }));

        self.sessions.lock().await.insert(session_id, session.clone());
        *self.current_session.lock().await = Some(session_id);

        info!("Registered session {}", session_id);
        self.outbox.notify(
            "session/started",
            json!({ "session_id": session_id, "init": session.init_packet() }),
        );

        tokio::spawn(self.clone().forward_packets(session, terminated_rx));
        session_id
    }

    /// Relay notify and stream packets until the session closes
    async fn forward_packets(self, session: Arc<DbgpSession>, terminated: oneshot::Receiver<Option<String>>) {
        let session_id = session.id();
        loop {
            tokio::select! {
                biased;
                notify = session.receive_notify(Duration::MAX) => match notify {
                    Ok(Some(packet)) => self.outbox.notify("session/notify", notify_json(session_id, &packet)),
                    Ok(None) => {}
                    Err(_) => break,
                },
                stream = session.receive_stream(Duration::MAX) => match stream {
                    Ok(Some(packet)) => self.outbox.notify("session/output", stream_json(session_id, &packet)),
                    Ok(None) => {}
                    Err(_) => break,
                },
            }
        }

        // Packets that arrived just before the close
        while let Ok(Some(packet)) = session.receive_notify(Duration::ZERO).await {
            self.outbox.notify("session/notify", notify_json(session_id, &packet));
        }
        while let Ok(Some(packet)) = session.receive_stream(Duration::ZERO).await {
            self.outbox.notify("session/output", stream_json(session_id, &packet));
        }

        session.wait_terminated().await;
        self.remove_session(session_id).await;

        let error = terminated.await.ok().flatten();
        self.outbox.notify(
            "session/terminated",
            json!({ "session_id": session_id, "error": error }),
        );
        debug!("Stopped forwarding packets for session {}", session_id);
    }

    pub async fn get_session(&self, session_id: Option<SessionId>) -> Option<Arc<DbgpSession>> {
        let session_id = match session_id {
            Some(id) => id,
            None => (*self.current_session.lock().await)?,
        };
        self.sessions.lock().await.get(&session_id).cloned()
    }

    pub async fn get_current_session_id(&self) -> Option<SessionId> {
        *self.current_session.lock().await
    }

    /// Make `session_id` current; false when no such session is tracked
    pub async fn select(&self, session_id: SessionId) -> bool {
        if !self.sessions.lock().await.contains_key(&session_id) {
            return false;
        }
        *self.current_session.lock().await = Some(session_id);
        true
    }

    pub async fn list_sessions(&self) -> Vec<Arc<DbgpSession>> {
        let mut sessions: Vec<_> = self.sessions.lock().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.id());
        sessions
    }

    pub async fn remove_session(&self, session_id: SessionId) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&session_id);

        // Fall back to the most recent remaining session
        let mut current = self.current_session.lock().await;
        if *current == Some(session_id) {
            *current = sessions.keys().max().copied();
        }
    }
}

fn notify_json(session_id: SessionId, packet: &NotifyPacket) -> Value {
    json!({
        "session_id": session_id,
        "name": packet.name,
        "packet": element_json(&packet.root),
    })
}

fn stream_json(session_id: SessionId, packet: &StreamPacket) -> Value {
    json!({
        "session_id": session_id,
        "stream": packet.kind,
        "text": packet.text(),
    })
}

/// Generic JSON rendering of an XML element tree
pub fn element_json(element: &XmlElement) -> Value {
    let attributes: Map<String, Value> = element
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    let text = match element.decoded_text() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => element.text.clone(),
    };

    json!({
        "name": element.name,
        "attributes": attributes,
        "text": text.trim(),
        "children": element.children.iter().map(element_json).collect::<Vec<_>>(),
    })
}
