//! Unique message ids for outbound network messages.
//!
//! Ids have the form `<unixMillis>-<publisherId>`. When a millisecond was
//! already used (or the wall clock went backwards) a counter is inserted:
//! `<unixMillis>-<counter>-<publisherId>`. The counter restarts once the
//! clock moves past the last used millisecond.

use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
struct State {
    last_ms: u64,
    counter: u32,
}

/// Generator for unique message ids, shared by one application instance.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    state: Mutex<State>,
}

impl MessageIdGenerator {
    /// Create a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next message id for `publisher_id`.
    #[must_use]
    pub fn generate(&self, publisher_id: &str) -> String {
        self.generate_at(current_time_ms(), publisher_id)
    }

    fn generate_at(&self, now_ms: u64, publisher_id: &str) -> String {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if now_ms > state.last_ms {
            state.last_ms = now_ms;
            state.counter = 0;
            return format!("{now_ms}-{publisher_id}");
        }

        // Stay on the last used millisecond so ids never go backwards.
        state.counter = state.counter.saturating_add(1);
        format!("{}-{}-{publisher_id}", state.last_ms, state.counter)
    }
}

/// Current wall clock time in milliseconds since UNIX epoch.
fn current_time_ms() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    u64::try_from(millis).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn plain_id_on_fresh_millisecond() {
        let generator = MessageIdGenerator::new();
        assert_eq!(generator.generate_at(1_000, "pub"), "1000-pub");
        assert_eq!(generator.generate_at(1_001, "pub"), "1001-pub");
    }

    #[test]
    fn counter_within_same_millisecond() {
        let generator = MessageIdGenerator::new();
        assert_eq!(generator.generate_at(1_000, "p"), "1000-p");
        assert_eq!(generator.generate_at(1_000, "p"), "1000-1-p");
        assert_eq!(generator.generate_at(1_000, "p"), "1000-2-p");
        assert_eq!(generator.generate_at(1_002, "p"), "1002-p");
        assert_eq!(generator.generate_at(1_002, "p"), "1002-1-p");
    }

    #[test]
    fn clock_going_backwards_never_repeats() {
        let generator = MessageIdGenerator::new();
        let a = generator.generate_at(5_000, "p");
        let b = generator.generate_at(4_000, "p");
        let c = generator.generate_at(4_000, "p");
        assert_eq!(b, "5000-1-p");
        assert_eq!(c, "5000-2-p");
        assert_ne!(a, b);
    }

    #[test]
    fn unique_under_concurrent_callers() {
        let generator = Arc::new(MessageIdGenerator::new());
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || generator.generate("Utility/acme.com/m/p/s"))
            })
            .collect();

        let ids: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 100);
    }
}
