//! Logical clock and scheduler
//!
//! All timed work (story cues, feedback emitter lifetimes, sync events) is
//! keyed by logical elapsed time rather than wall-clock timers. The host
//! advances the clock from its frame callback; tests advance it directly.

use serde::{Deserialize, Serialize};

/// Elapsed-time clock for one segment or story moment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentClock {
    elapsed: f64,
    running: bool,
}

impl SegmentClock {
    /// Create a stopped clock at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart after pause) the clock
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Freeze elapsed time
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Continue from where the clock was paused
    pub fn resume(&mut self) {
        self.running = true;
    }

    /// Stop and rewind to zero
    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.running = false;
    }

    /// Jump to an absolute elapsed time
    pub fn seek(&mut self, elapsed: f64) {
        self.elapsed = elapsed.max(0.0);
    }

    /// Advance by `delta` seconds if running; returns the new elapsed time
    pub fn advance(&mut self, delta: f64) -> f64 {
        if self.running && delta > 0.0 {
            self.elapsed += delta;
        }
        self.elapsed
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Handle returned by [`Scheduler::schedule_at`], used to cancel an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleKey(u64);

#[derive(Debug, Clone)]
struct Entry<A> {
    key: ScheduleKey,
    at: f64,
    action: A,
}

/// Ordered queue of actions due at logical times
#[derive(Debug, Clone)]
pub struct Scheduler<A> {
    entries: Vec<Entry<A>>,
    next_key: u64,
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_key: 0,
        }
    }

    /// Schedule `action` to become due at logical time `at`
    pub fn schedule_at(&mut self, at: f64, action: A) -> ScheduleKey {
        let key = ScheduleKey(self.next_key);
        self.next_key += 1;
        self.entries.push(Entry { key, at, action });
        key
    }

    /// Remove a pending entry; returns false if it already fired or never existed
    pub fn cancel(&mut self, key: ScheduleKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        self.entries.len() != before
    }

    /// Take every entry due at or before `now`, in non-decreasing time order
    pub fn drain_due(&mut self, now: f64) -> Vec<(f64, A)> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|e| e.at <= now);
        self.entries = pending;
        due.sort_by(|a, b| a.at.total_cmp(&b.at));
        due.into_iter().map(|e| (e.at, e.action)).collect()
    }

    /// Time of the earliest pending entry
    pub fn next_due(&self) -> Option<f64> {
        self.entries.iter().map(|e| e.at).min_by(|a, b| a.total_cmp(b))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_only_advances_while_running() {
        let mut clock = SegmentClock::new();
        assert_eq!(clock.advance(1.0), 0.0);

        clock.start();
        clock.advance(1.5);
        clock.pause();
        clock.advance(10.0);
        assert_eq!(clock.elapsed(), 1.5);

        clock.resume();
        clock.advance(0.5);
        assert_eq!(clock.elapsed(), 2.0);

        clock.reset();
        assert_eq!(clock.elapsed(), 0.0);
        assert!(!clock.is_running());
    }

    #[test]
    fn drains_in_time_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(3.0, "c");
        scheduler.schedule_at(1.0, "a");
        scheduler.schedule_at(2.0, "b");
        scheduler.schedule_at(9.0, "later");

        let due: Vec<_> = scheduler.drain_due(3.0).into_iter().map(|(_, a)| a).collect();
        assert_eq!(due, vec!["a", "b", "c"]);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.next_due(), Some(9.0));
    }

    #[test]
    fn cancelled_entries_never_fire() {
        let mut scheduler = Scheduler::new();
        let key = scheduler.schedule_at(1.0, 1);
        scheduler.schedule_at(1.0, 2);
        assert!(scheduler.cancel(key));
        assert!(!scheduler.cancel(key));

        let due: Vec<_> = scheduler.drain_due(5.0).into_iter().map(|(_, a)| a).collect();
        assert_eq!(due, vec![2]);
        assert!(scheduler.drain_due(10.0).is_empty());
    }
}
