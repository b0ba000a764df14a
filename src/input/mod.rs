//! Input module for user controls
//!
//! Turns terminal lines into edge-triggered control events: a push-to-talk
//! control, a mode-switch control and quit.

mod keys;
mod terminal;

pub use keys::InputEdge;
pub use terminal::TerminalInput;
