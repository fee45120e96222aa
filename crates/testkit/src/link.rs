//! Seeded unreliable link for driving sessions deterministically.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Counters kept by a [`LossyLink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Payloads handed to [`LossyLink::send`].
    pub sent: u64,
    /// Payloads dropped on send.
    pub dropped: u64,
    /// Payloads returned by [`LossyLink::deliver`].
    pub delivered: u64,
}

/// In-order link that drops a fixed percentage of payloads and delays the
/// rest by a fixed number of frames.
///
/// Drops come from a seeded [`StdRng`], so a given seed always loses the same
/// payloads.
#[derive(Debug)]
pub struct LossyLink<T> {
    rng: StdRng,
    loss_percent: u8,
    delay_frames: u64,
    queue: VecDeque<(u64, T)>,
    stats: LinkStats,
}

impl<T> LossyLink<T> {
    /// Link losing `loss_percent` (clamped to 100) of payloads, delivering the
    /// rest `delay_frames` after they were sent.
    pub fn new(seed: u64, loss_percent: u8, delay_frames: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            loss_percent: loss_percent.min(100),
            delay_frames,
            queue: VecDeque::new(),
            stats: LinkStats::default(),
        }
    }

    /// Perfect link with no delay.
    pub fn reliable() -> Self {
        Self::new(0, 0, 0)
    }

    /// Change the loss rate from now on.
    pub fn set_loss_percent(&mut self, loss_percent: u8) {
        self.loss_percent = loss_percent.min(100);
    }

    /// Offer `payload` at frame `now`. Returns false if it was dropped.
    pub fn send(&mut self, now: u64, payload: T) -> bool {
        self.stats.sent += 1;
        if self.loss_percent > 0 && self.rng.gen_range(0..100u8) < self.loss_percent {
            self.stats.dropped += 1;
            return false;
        }
        self.queue.push_back((now + self.delay_frames, payload));
        true
    }

    /// Everything due by frame `now`, in send order.
    pub fn deliver(&mut self, now: u64) -> Vec<T> {
        let mut due = Vec::new();
        while self.queue.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, payload)) = self.queue.pop_front() {
                due.push(payload);
            }
        }
        self.stats.delivered += due.len() as u64;
        due
    }

    /// Payloads accepted but not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Counters so far.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reliable_link_delivers_immediately_in_order() {
        let mut link = LossyLink::reliable();
        assert!(link.send(0, 1));
        assert!(link.send(0, 2));
        assert_eq!(link.deliver(0), vec![1, 2]);
        assert_eq!(link.in_flight(), 0);
        assert_eq!(link.stats().delivered, 2);
    }

    #[test]
    fn delay_holds_payloads_back() {
        let mut link = LossyLink::new(1, 0, 2);
        link.send(5, "a");
        assert!(link.deliver(6).is_empty());
        assert_eq!(link.deliver(7), vec!["a"]);
    }

    #[test]
    fn loss_is_deterministic_per_seed() {
        let pattern = |seed| {
            let mut link = LossyLink::new(seed, 30, 0);
            (0..200).map(|i| link.send(i, i)).collect::<Vec<_>>()
        };
        assert_eq!(pattern(7), pattern(7));
        let kept = pattern(7).iter().filter(|sent| **sent).count();
        assert!((100..180).contains(&kept), "kept {kept}");
    }

    #[test]
    fn total_loss_drops_everything() {
        let mut link = LossyLink::new(3, 100, 0);
        for i in 0..10 {
            assert!(!link.send(i, i));
        }
        assert!(link.deliver(100).is_empty());
        assert_eq!(link.stats().dropped, 10);
    }
}
