//! First-error slot shared between a stream and the thread that reports into it

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};

/// Keeps the first failure message until it is taken.
///
/// Cloning shares the slot.
#[derive(Clone, Debug, Default)]
pub struct FailureSlot {
    inner: Arc<Mutex<Option<String>>>,
}

impl FailureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` unless an earlier failure is still pending
    pub fn record(&self, message: impl Into<String>) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(|| message.into());
    }

    /// Take the pending failure, leaving the slot empty
    pub fn take(&self) -> Option<String> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Message carried by a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_wins_and_take_clears() {
        let slot = FailureSlot::new();
        let reporter = slot.clone();
        reporter.record("out of memory");
        reporter.record("validation");
        assert_eq!(slot.take().as_deref(), Some("out of memory"));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_panic_message_from_payload() {
        let payload = std::panic::catch_unwind(|| panic!("kernel fault")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "kernel fault");

        let payload = std::panic::catch_unwind(|| panic!("slot {} out of range", 3)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "slot 3 out of range");
    }
}
