//! Control definitions and edge tracking
//!
//! The talk control is a toggle on the terminal: each empty line flips it,
//! producing a press edge and then a release edge.

use crate::events::Event;

/// Edges produced by the input source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEdge {
    /// Talk control went down
    TalkPressed,
    /// Talk control came up
    TalkReleased,
    /// Mode-switch control came up
    ModeSwitchReleased,
    /// A line typed in place of speech
    Typed(String),
    /// Stop the application
    Quit,
}

impl InputEdge {
    /// The controller event for this edge, if it has one
    pub fn event(&self) -> Option<Event> {
        match self {
            InputEdge::TalkPressed => Some(Event::BeginCapture),
            InputEdge::TalkReleased => Some(Event::EndCapture),
            InputEdge::ModeSwitchReleased => Some(Event::SwitchMode),
            InputEdge::Typed(_) | InputEdge::Quit => None,
        }
    }
}

/// Tracks whether the talk control is currently held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TalkControl {
    pub pressed: bool,
}

impl TalkControl {
    /// Flip the control and return the resulting edge
    pub fn toggle(&mut self) -> InputEdge {
        self.pressed = !self.pressed;
        if self.pressed {
            InputEdge::TalkPressed
        } else {
            InputEdge::TalkReleased
        }
    }
}

/// Interpret one terminal line
pub fn parse_line(line: &str, talk: &mut TalkControl) -> InputEdge {
    let trimmed = line.trim();
    match trimmed.to_lowercase().as_str() {
        "" => talk.toggle(),
        "r" => InputEdge::ModeSwitchReleased,
        "q" | "quit" => InputEdge::Quit,
        _ => InputEdge::Typed(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_lines_toggle_talk() {
        let mut talk = TalkControl::default();
        assert_eq!(parse_line("", &mut talk), InputEdge::TalkPressed);
        assert!(talk.pressed);
        assert_eq!(parse_line("  ", &mut talk), InputEdge::TalkReleased);
        assert!(!talk.pressed);
    }

    #[test]
    fn test_commands() {
        let mut talk = TalkControl::default();
        assert_eq!(parse_line("R", &mut talk), InputEdge::ModeSwitchReleased);
        assert_eq!(parse_line("quit", &mut talk), InputEdge::Quit);
        assert_eq!(
            parse_line(" Play something jazzy ", &mut talk),
            InputEdge::Typed("Play something jazzy".to_string())
        );
        assert!(!talk.pressed);
    }

    #[test]
    fn test_edge_events() {
        assert_eq!(InputEdge::TalkPressed.event(), Some(Event::BeginCapture));
        assert_eq!(InputEdge::TalkReleased.event(), Some(Event::EndCapture));
        assert_eq!(InputEdge::ModeSwitchReleased.event(), Some(Event::SwitchMode));
        assert_eq!(InputEdge::Quit.event(), None);
    }
}
