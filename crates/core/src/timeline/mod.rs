//! Logical clock and the deferred-task queue driving the voice pool.
//!
//! Staggered chord onsets and one-shot auto-releases are stored here as
//! scheduled tasks keyed by voice. Stopping a voice cancels its pending
//! tasks; each task also carries the id of the voice it was scheduled for,
//! so a task that outlives its voice is recognised as stale and ignored.

use serde::{Deserialize, Serialize};

use crate::audio::{VoiceId, VoiceKey};

/// Monotonic logical time in seconds.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    pub time_seconds: f64,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    /// Moves time forward; negative or non-finite deltas are ignored.
    pub fn advance(&mut self, delta: f64) {
        if delta.is_finite() && delta > 0.0 {
            self.time_seconds += delta;
        }
    }

    /// Jumps forward to `time`; never moves backwards.
    pub fn advance_to(&mut self, time: f64) {
        if time.is_finite() && time > self.time_seconds {
            self.time_seconds = time;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// Start a voice whose onset was deferred.
    Onset,
    /// Release a one-shot voice whose duration elapsed.
    AutoRelease,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub due: f64,
    pub key: VoiceKey,
    pub voice: VoiceId,
    pub kind: TaskKind,
    seq: u64,
}

/// Pending deferred tasks, cancellable per key.
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: f64, key: VoiceKey, voice: VoiceId, kind: TaskKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(ScheduledTask {
            due,
            key,
            voice,
            kind,
            seq,
        });
    }

    /// Drops every pending task for `key`, returning how many were removed.
    pub fn cancel_key(&mut self, key: &VoiceKey) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| &task.key != key);
        before - self.tasks.len()
    }

    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.tasks.len();
        self.tasks.clear();
        cancelled
    }

    /// Removes and returns every task due at or before `now`, earliest
    /// first; ties keep scheduling order.
    pub fn drain_due(&mut self, now: f64) -> Vec<ScheduledTask> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.tasks.drain(..).partition(|task| task.due <= now);
        self.tasks = pending;
        due.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)));
        due
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub fn has_pending_for(&self, key: &VoiceKey) -> bool {
        self.tasks.iter().any(|task| &task.key == key)
    }

    pub fn next_due(&self) -> Option<f64> {
        self.tasks.iter().map(|task| task.due).min_by(f64::total_cmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(row: u32) -> VoiceKey {
        VoiceKey::Cell { column: 0, row }
    }

    #[test]
    fn clock_only_moves_forward() {
        let mut clock = PlaybackClock::default();
        clock.advance(0.5);
        clock.advance(-1.0);
        clock.advance(f64::NAN);
        assert_eq!(clock.time_seconds, 0.5);
        clock.advance_to(0.2);
        assert_eq!(clock.time_seconds, 0.5);
        clock.advance_to(2.0);
        assert_eq!(clock.time_seconds, 2.0);
        clock.reset();
        assert_eq!(clock.time_seconds, 0.0);
    }

    #[test]
    fn drains_due_tasks_in_time_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(0.3, key(3), VoiceId(3), TaskKind::Onset);
        scheduler.schedule(0.1, key(1), VoiceId(1), TaskKind::Onset);
        scheduler.schedule(0.1, key(2), VoiceId(2), TaskKind::AutoRelease);
        scheduler.schedule(0.9, key(9), VoiceId(9), TaskKind::Onset);

        let due = scheduler.drain_due(0.5);
        let rows: Vec<VoiceId> = due.iter().map(|task| task.voice).collect();
        assert_eq!(rows, vec![VoiceId(1), VoiceId(2), VoiceId(3)]);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.next_due(), Some(0.9));
    }

    #[test]
    fn cancels_by_key() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(0.1, key(1), VoiceId(1), TaskKind::Onset);
        scheduler.schedule(0.2, key(1), VoiceId(1), TaskKind::AutoRelease);
        scheduler.schedule(0.2, key(2), VoiceId(2), TaskKind::Onset);

        assert_eq!(scheduler.cancel_key(&key(1)), 2);
        assert!(!scheduler.has_pending_for(&key(1)));
        assert!(scheduler.has_pending_for(&key(2)));
        assert_eq!(scheduler.cancel_key(&key(1)), 0);
        assert_eq!(scheduler.cancel_all(), 1);
        assert!(scheduler.drain_due(10.0).is_empty());
    }
}
