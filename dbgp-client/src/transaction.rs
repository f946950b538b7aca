// Transaction id allocation
//
// Ids are process-wide and never reused. Correlating responses with waiters is
// the receiver's job; this only hands out ids.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

#[derive(Debug)]
pub struct TransactionManager {
    next_id: AtomicU32,
}

impl TransactionManager {
    /// An isolated id space, mostly useful in tests
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
        }
    }

    /// The process-wide id space shared by all sessions
    pub fn global() -> Arc<TransactionManager> {
        static GLOBAL: OnceLock<Arc<TransactionManager>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(TransactionManager::new()))
            .clone()
    }

    pub fn generate_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
