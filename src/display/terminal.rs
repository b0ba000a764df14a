//! Single-line VU meter drawn on stdout

use std::io::Write;

use super::{Frame, Renderer, MAX_ANGLE, MIN_ANGLE};

const METER_WIDTH: usize = 21;

pub struct TerminalRenderer<W: Write> {
    out: W,
}

impl TerminalRenderer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn line(frame: &Frame) -> String {
        let span = MAX_ANGLE - MIN_ANGLE;
        let pos = ((frame.needle - MIN_ANGLE) / span * (METER_WIDTH - 1) as f32).round() as usize;
        let pos = pos.min(METER_WIDTH - 1);

        let meter: String = (0..METER_WIDTH)
            .map(|i| if i == pos { '|' } else { '-' })
            .collect();
        let icon = if frame.listening { "MIC" } else { "AIR" };

        format!("\r[{meter}] {icon} {:<6} {:<14}", frame.mode, frame.state)
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn render(&mut self, frame: &Frame) {
        // Display glitches are not worth stopping the show for
        let _ = write!(self.out, "{}", Self::line(frame));
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Mode, State};

    #[test]
    fn test_render_resting_needle() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.render(&Frame {
            mode: Mode::Dialog,
            state: State::IdleDialog,
            listening: true,
            needle: MIN_ANGLE,
        });
        let text = String::from_utf8(renderer.out).unwrap();
        assert!(text.starts_with("\r[|--------------------] MIC dialog"));
        assert!(text.contains("idle_dialog"));
    }

    #[test]
    fn test_render_speaking_needle() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.render(&Frame {
            mode: Mode::Radio,
            state: State::ThinkAndSay,
            listening: false,
            needle: MAX_ANGLE,
        });
        let text = String::from_utf8(renderer.out).unwrap();
        assert!(text.starts_with("\r[--------------------|] AIR radio"));
    }
}
