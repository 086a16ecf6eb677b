//! Playback session identity.
//!
//! Every playback attempt gets a ticket from a shared generation counter.
//! Starting or stopping playback bumps the counter, so any callback still
//! holding an older ticket sees `is_active() == false` and drops its result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SessionCounter {
    current: Arc<AtomicU64>,
}

impl SessionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session, invalidating every earlier ticket.
    pub fn begin(&self) -> SessionTicket {
        let id = self.invalidate();
        SessionTicket {
            id,
            current: Arc::clone(&self.current),
        }
    }

    /// Invalidate the active session without starting another. Returns the new generation.
    pub fn invalidate(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// Proof of belonging to one session generation.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    id: u64,
    current: Arc<AtomicU64>,
}

impl SessionTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_monotonically() {
        let counter = SessionCounter::new();
        let a = counter.begin();
        let b = counter.begin();
        assert!(b.id() > a.id());
        assert_eq!(counter.current(), b.id());
    }

    #[test]
    fn new_session_invalidates_previous() {
        let counter = SessionCounter::new();
        let a = counter.begin();
        assert!(a.is_active());
        let b = counter.begin();
        assert!(!a.is_active());
        assert!(b.is_active());
    }

    #[test]
    fn invalidate_leaves_no_active_ticket() {
        let counter = SessionCounter::new();
        let a = counter.begin();
        let cloned = a.clone();
        counter.invalidate();
        assert!(!a.is_active());
        assert!(!cloned.is_active());
    }
}
