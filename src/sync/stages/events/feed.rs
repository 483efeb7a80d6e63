use std::collections::HashMap;

use tokio::time::Instant;
use tracing::{info, warn};

const REPORT_EVERY: usize = 1000;

/// Per-topic sequence tracking and throughput reporting for the event feed
pub struct FeedTracker {
    last_sequence: HashMap<String, u32>,
    received: usize,
    last_checkpoint: Instant,
}

impl FeedTracker {
    pub fn new() -> Self {
        Self {
            last_sequence: HashMap::new(),
            received: 0,
            last_checkpoint: Instant::now(),
        }
    }

    /// Record a notification's sequence frame, returning how many
    /// notifications were skipped since the previous one on the topic
    pub fn observe(&mut self, topic: &str, sequence_frame: &[u8]) -> Option<u32> {
        let sequence = u32::from_le_bytes(sequence_frame.try_into().ok()?);

        let previous = self.last_sequence.insert(topic.to_string(), sequence)?;
        let expected = previous.wrapping_add(1);

        if sequence == expected {
            return None;
        }

        let missed = sequence.wrapping_sub(expected);

        warn!(
            topic,
            previous, sequence, missed, "gap in node notification sequence"
        );

        Some(missed)
    }

    pub fn event_received(&mut self) {
        self.received += 1;

        if self.received % REPORT_EVERY == 0 {
            let time_taken = self.last_checkpoint.elapsed();

            info!(
                "last {REPORT_EVERY} notifications in {time_taken:?} ({:.1} n/s)",
                REPORT_EVERY as f64 / time_taken.as_secs_f64()
            );

            self.last_checkpoint = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_gaps_per_topic() {
        let mut feed = FeedTracker::new();

        assert_eq!(feed.observe("rawtx", &7u32.to_le_bytes()), None);
        assert_eq!(feed.observe("rawtx", &8u32.to_le_bytes()), None);
        assert_eq!(feed.observe("rawblock", &100u32.to_le_bytes()), None);
        assert_eq!(feed.observe("rawtx", &12u32.to_le_bytes()), Some(3));
        assert_eq!(feed.observe("rawblock", &101u32.to_le_bytes()), None);
    }

    #[test]
    fn sequence_wraps_around() {
        let mut feed = FeedTracker::new();

        feed.observe("rawtx", &u32::MAX.to_le_bytes());

        assert_eq!(feed.observe("rawtx", &0u32.to_le_bytes()), None);
    }

    #[test]
    fn malformed_sequence_frame_is_ignored() {
        let mut feed = FeedTracker::new();

        assert_eq!(feed.observe("rawtx", &[1, 2]), None);
    }
}
