//! Bookkeeping for the single outstanding request a worker may have

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing outstanding; a request may be sent
    Free,
    /// A request is outstanding
    Busy { since: Instant },
    /// We gave up waiting; the late result must be drained before reuse
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct WorkerSlot {
    name: &'static str,
    state: SlotState,
}

impl WorkerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: SlotState::Free,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_free(&self) -> bool {
        self.state == SlotState::Free
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, SlotState::Busy { .. })
    }

    pub fn is_abandoned(&self) -> bool {
        self.state == SlotState::Abandoned
    }

    /// Mark a request as sent; false if one is already outstanding
    pub fn begin(&mut self, now: Instant) -> bool {
        if !self.is_free() {
            return false;
        }
        self.state = SlotState::Busy { since: now };
        true
    }

    /// Restart the timeout clock of an outstanding request
    pub fn touch(&mut self, now: Instant) {
        if self.is_busy() {
            self.state = SlotState::Busy { since: now };
        }
    }

    /// The outstanding result has been received
    pub fn complete(&mut self) {
        self.state = SlotState::Free;
    }

    pub fn abandon(&mut self) {
        self.state = SlotState::Abandoned;
    }

    /// Whether the outstanding request has been waiting longer than `timeout`
    pub fn overdue(&self, now: Instant, timeout: Duration) -> bool {
        match self.state {
            SlotState::Busy { since } => now.saturating_duration_since(since) > timeout,
            _ => false,
        }
    }
}
