use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Live on/off switch for outbox processing.
///
/// Clones share the same flag. Workers read it once per cycle, so flipping it
/// takes effect on every worker's next cycle without a restart.
#[derive(Debug, Clone)]
pub struct OutboxToggle {
    enabled: Arc<AtomicBool>,
}

impl OutboxToggle {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn enable(&self) {
        self.set(true);
    }

    pub fn disable(&self) {
        self.set(false);
    }
}

impl Default for OutboxToggle {
    fn default() -> Self {
        Self::new(true)
    }
}
