// Session lifecycle
//
// Connected -> Terminating -> Terminated, never backward. Local termination
// requests and the receiver loop's own exit both funnel into `complete`,
// which fires termination listeners exactly once.

use crate::observer::TerminationListener;
use crate::protocol::DbgpError;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SessionState {
    Connected = 0,
    Terminating = 1,
    Terminated = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connected,
            1 => SessionState::Terminating,
            _ => SessionState::Terminated,
        }
    }
}

#[derive(Default)]
struct Listeners {
    fired: bool,
    registered: Vec<Arc<dyn TerminationListener>>,
}

pub struct Lifecycle {
    session_id: u64,
    state: AtomicU8,
    listeners: Mutex<Listeners>,
    terminated_tx: watch::Sender<bool>,
}

impl Lifecycle {
    pub fn new(session_id: u64) -> Self {
        let (terminated_tx, _) = watch::channel(false);
        Self {
            session_id,
            state: AtomicU8::new(SessionState::Connected as u8),
            listeners: Mutex::new(Listeners::default()),
            terminated_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Move to Terminating. Returns true only for the caller that made the transition.
    pub fn begin_termination(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                SessionState::Connected as u8,
                SessionState::Terminating as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if won {
            debug!("[session {}] terminating", self.session_id);
        }
        won
    }

    /// Fire listeners (once) and enter Terminated
    pub fn complete(&self, error: Option<&DbgpError>) {
        self.begin_termination();

        let listeners = {
            let mut listeners = self.listeners.lock();
            if listeners.fired {
                return;
            }
            listeners.fired = true;
            std::mem::take(&mut listeners.registered)
        };

        match error {
            Some(e) => info!("[session {}] terminated: {}", self.session_id, e),
            None => info!("[session {}] terminated", self.session_id),
        }

        for listener in listeners {
            listener.terminated(self.session_id, error);
        }

        self.state
            .store(SessionState::Terminated as u8, Ordering::SeqCst);
        self.terminated_tx.send_replace(true);
    }

    /// Register a listener; one added after termination is called immediately
    pub fn add_listener(&self, listener: Arc<dyn TerminationListener>) {
        {
            let mut listeners = self.listeners.lock();
            if !listeners.fired {
                listeners.registered.push(listener);
                return;
            }
        }
        listener.terminated(self.session_id, None);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn TerminationListener>) {
        self.listeners
            .lock()
            .registered
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Resolves once listeners have fired; immediately on later calls
    pub async fn wait_terminated(&self) {
        let mut rx = self.terminated_tx.subscribe();
        // The sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|terminated| *terminated).await;
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish()
    }
}
