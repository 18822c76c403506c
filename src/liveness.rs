use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Receives "still transferring" notifications from relays.
///
/// Both directions of a session, and possibly many sessions, call `active`
/// concurrently.
pub trait LivenessSink: Send + Sync {
    fn active(&self, now: Instant);
}

impl<F> LivenessSink for F
where
    F: Fn(Instant) + Send + Sync,
{
    fn active(&self, now: Instant) {
        self(now)
    }
}

/// Liveness sink that remembers the most recent activity of one session.
#[derive(Debug)]
pub struct ActivityTracker {
    origin: Instant,
    // milliseconds since origin
    last_active_ms: AtomicU64,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_active_ms: AtomicU64::new(0),
        }
    }

    pub fn last_active(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_active_ms.load(Ordering::Relaxed))
    }

    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_active())
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessSink for ActivityTracker {
    fn active(&self, now: Instant) {
        let elapsed_ms = now.saturating_duration_since(self.origin).as_millis() as u64;
        // the two directions race; never move backwards
        self.last_active_ms.fetch_max(elapsed_ms, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tracker_records_latest_activity() {
        let tracker = ActivityTracker::new();
        let start = tracker.last_active();

        tokio::time::advance(Duration::from_secs(3)).await;
        let later = Instant::now();
        tracker.active(later);
        assert_eq!(tracker.last_active(), later);

        // an older timestamp from the other direction does not rewind it
        tracker.active(start + Duration::from_secs(1));
        assert_eq!(tracker.last_active(), later);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tracker.idle_for(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_closure_sink() {
        use std::sync::atomic::AtomicUsize;

        let calls = AtomicUsize::new(0);
        let sink = |_now: Instant| {
            calls.fetch_add(1, Ordering::Relaxed);
        };
        sink.active(Instant::now());
        LivenessSink::active(&sink, Instant::now());
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
