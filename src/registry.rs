//! Cancellation registry: scan id -> live cancellation token.
//!
//! One token is registered when a pipeline run starts and removed when
//! the scan reaches a terminal state. Cancellation is cooperative — the
//! pipeline checks its token at stage boundaries and poll iterations.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a fresh token for a scan about to start.
    pub fn register(&self, scan_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().unwrap().insert(scan_id, token.clone());
        token
    }

    /// Cancel a live scan. Returns true iff a token was registered,
    /// whether or not it had already been cancelled.
    pub fn cancel(&self, scan_id: Uuid) -> bool {
        match self.tokens.lock().unwrap().get(&scan_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the token once the scan is terminal.
    pub fn remove(&self, scan_id: Uuid) {
        self.tokens.lock().unwrap().remove(&scan_id);
    }

    pub fn is_registered(&self, scan_id: Uuid) -> bool {
        self.tokens.lock().unwrap().contains_key(&scan_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_requires_live_token() {
        let registry = CancelRegistry::new();
        let scan_id = Uuid::new_v4();
        assert!(!registry.cancel(scan_id));

        let token = registry.register(scan_id);
        assert!(registry.is_registered(scan_id));
        assert!(!token.is_cancelled());

        assert!(registry.cancel(scan_id));
        assert!(token.is_cancelled());

        registry.remove(scan_id);
        assert!(!registry.cancel(scan_id));
    }
}
