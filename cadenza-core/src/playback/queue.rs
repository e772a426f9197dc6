use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;

use crate::protocol::TrackId;

/// A single track of a set
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTrack {
    pub uuid: String,
    pub track_id: TrackId,
    pub duration: Duration,
    /// Cleared when no file was found and the alert sound plays instead
    pub valid: bool,
}

impl QueuedTrack {
    pub fn new(uuid: impl Into<String>, track_id: TrackId, duration: Duration) -> Self {
        Self {
            uuid: uuid.into(),
            track_id,
            duration,
            valid: true,
        }
    }
}

/// Tracks of the current set that have not been made current yet
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    items: VecDeque<QueuedTrack>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, track: QueuedTrack) {
        self.items.push_back(track);
    }

    /// Return a track that was taken out too early, e.g. a pre-bound next
    /// track when playback stops
    pub fn push_front(&mut self, track: QueuedTrack) {
        self.items.push_front(track);
    }

    /// Take the next track: the head of the queue, or any track when
    /// `random` is set
    pub fn pop(&mut self, random: bool) -> Option<QueuedTrack> {
        if random && self.items.len() > 1 {
            let index = rand::rng().random_range(0..self.items.len());
            self.items.remove(index)
        } else {
            self.items.pop_front()
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of the durations of every pending track
    pub fn total_duration(&self) -> Duration {
        self.items.iter().map(|t| t.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(n: u32, secs: u64) -> QueuedTrack {
        QueuedTrack::new("u", TrackId::new(0, n), Duration::from_secs(secs))
    }

    #[test]
    fn pops_in_order_without_random() {
        let mut queue = PendingQueue::new();
        queue.push_back(track(0, 10));
        queue.push_back(track(1, 20));
        queue.push_front(track(5, 1));
        assert_eq!(queue.pop(false).unwrap().track_id.track_num, 5);
        assert_eq!(queue.pop(false).unwrap().track_id.track_num, 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn random_pop_never_loses_tracks() {
        let mut queue = PendingQueue::new();
        for n in 0..20 {
            queue.push_back(track(n, 1));
        }
        let mut seen: Vec<u32> = std::iter::from_fn(|| queue.pop(true))
            .map(|t| t.track_id.track_num)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn total_duration_is_order_independent() {
        let mut a = PendingQueue::new();
        let mut b = PendingQueue::new();
        for (n, secs) in [(0, 120), (1, 180), (2, 45)] {
            a.push_back(track(n, secs));
            b.push_front(track(n, secs));
        }
        assert_eq!(a.total_duration(), Duration::from_secs(345));
        assert_eq!(a.total_duration(), b.total_duration());
    }
}
