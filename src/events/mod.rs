//! Events observed by the controller during one loop iteration
//!
//! Events are edge tags: they carry no payload and live for exactly one
//! batch. Worker results are pulled from the inbox only when a state
//! consumes the matching readiness event.

use serde::{Deserialize, Serialize};

/// Something that happened since the previous tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// Talk control pressed
    BeginCapture,

    /// Talk control released
    EndCapture,

    /// Mode-switch control released (to radio from dialog, to dialog from radio)
    SwitchMode,

    /// The speech-to-text worker has a transcript waiting
    TranscriptReady,

    /// The generation worker has an utterance waiting
    GenerationReady,

    /// The current utterance has just finished playing
    PlaybackDone,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::BeginCapture => write!(f, "begin_capture"),
            Event::EndCapture => write!(f, "end_capture"),
            Event::SwitchMode => write!(f, "switch_mode"),
            Event::TranscriptReady => write!(f, "transcript_ready"),
            Event::GenerationReady => write!(f, "generation_ready"),
            Event::PlaybackDone => write!(f, "playback_done"),
        }
    }
}

/// The events collected during a single tick
///
/// Keeps insertion order and drops duplicates, so an event can be observed
/// at most once per batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    events: Vec<Event>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event; repeated events within one batch collapse into one
    pub fn push(&mut self, event: Event) {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
    }

    pub fn contains(&self, event: Event) -> bool {
        self.events.contains(&event)
    }

    /// Remove an event, returning whether it was present
    pub fn take(&mut self, event: Event) -> bool {
        match self.events.iter().position(|e| *e == event) {
            Some(idx) => {
                self.events.remove(idx);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}

impl FromIterator<Event> for EventBatch {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        let mut batch = EventBatch::new();
        for event in iter {
            batch.push(event);
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_deduplicates() {
        let mut batch = EventBatch::new();
        batch.push(Event::GenerationReady);
        batch.push(Event::GenerationReady);
        assert_eq!(batch.iter().count(), 1);
    }

    #[test]
    fn test_batch_keeps_order() {
        let batch: EventBatch = [Event::SwitchMode, Event::PlaybackDone, Event::GenerationReady]
            .into_iter()
            .collect();
        let order: Vec<_> = batch.iter().copied().collect();
        assert_eq!(
            order,
            vec![Event::SwitchMode, Event::PlaybackDone, Event::GenerationReady]
        );
    }

    #[test]
    fn test_take_removes_event() {
        let mut batch: EventBatch = [Event::TranscriptReady].into_iter().collect();
        assert!(batch.take(Event::TranscriptReady));
        assert!(!batch.take(Event::TranscriptReady));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&Event::GenerationReady).unwrap();
        assert_eq!(json, r#""generation_ready""#);
        let event: Event = serde_json::from_str(r#""switch_mode""#).unwrap();
        assert_eq!(event, Event::SwitchMode);
    }
}
