//! Time-windowed guard against redelivered events.

use crate::EventId;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long an event id is remembered.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60);

/// Remembers event ids seen within a sliding window.
///
/// The platform delivers at least once, so the same event can reach the
/// handler twice. Ids are forgotten after the window; a redelivery that late
/// is processed again.
#[derive(Debug)]
pub struct DedupGuard {
    window: Duration,
    seen: Mutex<HashMap<EventId, Instant>>,
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl DedupGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if the event is new and records it. Returns false if it
    /// was already accepted within the window; the caller drops it.
    pub fn accept(&self, event_id: EventId) -> bool {
        self.accept_at(event_id, Instant::now())
    }

    pub fn accept_at(&self, event_id: EventId, now: Instant) -> bool {
        // A panic while holding the lock cannot leave the map half-updated.
        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let window = self.window;
        seen.retain(|_, first_seen| now.saturating_duration_since(*first_seen) < window);

        if seen.contains_key(&event_id) {
            tracing::debug!(event_id, "duplicate event dropped");
            return false;
        }

        seen.insert(event_id, now);
        true
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn second_sighting_within_window_is_rejected() {
        let guard = DedupGuard::default();
        let start = Instant::now();

        assert!(guard.accept_at(42, start));
        assert!(!guard.accept_at(42, start + Duration::from_secs(59)));
    }

    #[test]
    fn id_is_accepted_again_after_window() {
        let guard = DedupGuard::default();
        let start = Instant::now();

        assert!(guard.accept_at(42, start));
        assert!(guard.accept_at(42, start + Duration::from_secs(61)));
        assert!(!guard.accept_at(42, start + Duration::from_secs(62)));
    }

    #[test]
    fn distinct_ids_do_not_interfere() {
        let guard = DedupGuard::default();
        let now = Instant::now();

        assert!(guard.accept_at(1, now));
        assert!(guard.accept_at(2, now));
        assert!(!guard.accept_at(1, now));
    }

    #[test]
    fn expired_entries_are_swept_on_every_call() {
        let guard = DedupGuard::new(Duration::from_secs(10));
        let start = Instant::now();

        for id in 0..100 {
            guard.accept_at(id, start);
        }
        assert_eq!(guard.len(), 100);

        guard.accept_at(1000, start + Duration::from_secs(11));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn concurrent_accepts_admit_each_id_once() {
        let guard = Arc::new(DedupGuard::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || (0..50).filter(|id| guard.accept(*id)).count())
            })
            .collect();

        let accepted: usize = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .sum();
        assert_eq!(accepted, 50);
    }
}
