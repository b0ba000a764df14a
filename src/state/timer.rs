//! Playback deadline
//!
//! Completion is observable only within a detection window after the
//! deadline. Ticks inside the window all report it until a state consumes
//! it with [`PlaybackTimer::disarm`]; the first tick past the window drops it.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPoll {
    /// No playback is being tracked
    Idle,
    /// Playback is still running
    Pending,
    /// Playback has just finished
    Fired,
    /// Playback finished too long ago for this tick to notice
    Missed { late_by: Duration },
}

#[derive(Debug, Clone, Default)]
pub struct PlaybackTimer {
    deadline: Option<Instant>,
}

impl PlaybackTimer {
    /// Track a new utterance, superseding any previous one
    pub fn arm(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Compare the deadline against `now`
    pub fn poll(&mut self, now: Instant, window: Duration) -> TimerPoll {
        let Some(deadline) = self.deadline else {
            return TimerPoll::Idle;
        };
        if now <= deadline {
            return TimerPoll::Pending;
        }

        let late_by = now - deadline;
        if late_by < window {
            TimerPoll::Fired
        } else {
            self.deadline = None;
            TimerPoll::Missed { late_by }
        }
    }
}
