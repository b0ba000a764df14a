//! Side effects requested by a transition
//!
//! The controller never touches audio or workers itself; it returns these
//! for the runtime to carry out, in order.

use serde::{Deserialize, Serialize};

/// Level of the background static
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ambient {
    /// Someone is speaking
    Low,
    /// Nobody is speaking
    High,
}

/// Short sounds marking the start and end of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    CaptureStart,
    CaptureEnd,
}

/// Control messages for the speech-to-text worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SttControl {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SetAmbient { level: Ambient },

    PlayCue { cue: Cue },

    Transcriber { control: SttControl },

    /// Send a prompt to the generation worker
    Generate { prompt: String },

    /// Start playing a line; the runtime reports the duration back
    Speak { text: String },

    /// Play a line and wait until it has finished
    Broadcast { text: String },

    /// Refresh the display now (the loop is about to block)
    Redraw,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::SetAmbient { level } => write!(f, "SET_AMBIENT ({level:?})"),
            Command::PlayCue { cue } => write!(f, "PLAY_CUE ({cue:?})"),
            Command::Transcriber { control } => write!(f, "TRANSCRIBER ({control:?})"),
            Command::Generate { prompt } => write!(f, "GENERATE ({} chars)", prompt.len()),
            Command::Speak { text } => write!(f, "SPEAK ({} chars)", text.len()),
            Command::Broadcast { text } => write!(f, "BROADCAST ({} chars)", text.len()),
            Command::Redraw => write!(f, "REDRAW"),
        }
    }
}
