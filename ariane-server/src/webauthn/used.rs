//! In-process record of challenges that have already been presented.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use ariane_core::CHALLENGE_TTL_SECS;

/// Challenges seen at a completion endpoint, each remembered for as long as
/// its cookie could still verify.
pub struct UsedChallenges {
    seen: DashMap<String, Instant>,
    window: Duration,
}

impl Default for UsedChallenges {
    fn default() -> Self {
        Self::new(Duration::from_secs(CHALLENGE_TTL_SECS))
    }
}

impl UsedChallenges {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            window,
        }
    }

    /// Record `challenge`. Returns `false` if it was already recorded and the
    /// record has not expired.
    pub fn mark_used(&self, challenge: &str) -> bool {
        let now = Instant::now();
        match self.seen.entry(challenge.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    false
                } else {
                    entry.insert(now + self.window);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now + self.window);
                true
            }
        }
    }

    /// Drop expired records (called periodically)
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.seen.len();
        self.seen.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.seen.len())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl std::fmt::Debug for UsedChallenges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsedChallenges")
            .field("seen", &self.seen.len())
            .field("window", &self.window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_presentation_rejected() {
        let used = UsedChallenges::default();
        assert!(used.mark_used("abc"));
        assert!(!used.mark_used("abc"));
        assert!(used.mark_used("def"));
        assert_eq!(used.len(), 2);
    }

    #[test]
    fn test_expired_records_are_forgotten() {
        let used = UsedChallenges::new(Duration::ZERO);
        assert!(used.mark_used("abc"));
        std::thread::sleep(Duration::from_millis(2));
        assert!(used.mark_used("abc"));

        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(used.cleanup_expired(), 1);
        assert!(used.is_empty());
    }
}
