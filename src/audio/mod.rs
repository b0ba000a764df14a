//! Audio output: spoken lines, capture cues and the background static
//!
//! The static level doubles as the UI cue for "someone is speaking".

mod speaker;

use std::time::Duration;

use crate::state::{Ambient, Cue};

pub use speaker::VoiceSpeaker;

/// Static volume while nobody speaks
pub const AMBIENT_HIGH: f32 = 0.5;

/// Static volume while someone speaks
pub const AMBIENT_LOW: f32 = 0.025;

impl Ambient {
    pub fn volume(self) -> f32 {
        match self {
            Ambient::High => AMBIENT_HIGH,
            Ambient::Low => AMBIENT_LOW,
        }
    }
}

/// Playback sink
pub trait Speaker: Send {
    /// Start speaking `text`; returns how long it will take
    fn say(&mut self, text: &str) -> Result<Duration, AudioError>;

    fn cue(&mut self, cue: Cue) -> Result<(), AudioError>;

    fn set_ambient(&mut self, level: Ambient);

    /// Current static volume
    fn ambient_volume(&self) -> f32;
}

/// Errors that can occur producing sound
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
