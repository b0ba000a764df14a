//! Interaction state machine
//!
//! Eleven states in two groups:
//! - Dialog: IdleDialog, Recording, Transcribing, Thinking, Speaking
//! - Radio: IdleRadio, ThinkingRadio, ThinkAndSay, SlowTongue,
//!   FinishTalking, ClearQueue
//!
//! The controller is pure: it consumes event batches and emits commands.

mod command;
mod machine;
mod slot;
mod timer;

pub use command::{Ambient, Command, Cue, SttControl};
pub use machine::{Controller, Inbox, Limits, Mode, State};
