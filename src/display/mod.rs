//! Display: a VU-meter needle plus mic/speaker iconography
//!
//! The needle follows the static volume: resting while the static is loud,
//! swinging up while someone speaks.

mod terminal;

use std::collections::VecDeque;
use std::f32::consts::PI;

use rand::Rng;

use crate::state::{Mode, State};

pub use terminal::TerminalRenderer;

/// Needle angle while nobody speaks
pub const MIN_ANGLE: f32 = PI / 4.0;

/// Needle angle while someone speaks
pub const MAX_ANGLE: f32 = 3.0 * PI / 4.0;

/// Static above this volume means nobody is speaking
const QUIET_THRESHOLD: f32 = 0.3;

const JITTER: f32 = 0.07;

/// More samples make the needle slower
const HISTORY_STEPS: usize = 4;

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub mode: Mode,
    pub state: State,
    /// Show the microphone (dialog states) instead of the on-air lamp
    pub listening: bool,
    /// Needle angle in radians, between `MIN_ANGLE` and `MAX_ANGLE`
    pub needle: f32,
}

pub trait Renderer {
    fn render(&mut self, frame: &Frame);
}

/// Renderer that draws nothing
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _frame: &Frame) {}
}

/// Smoothed needle position
#[derive(Debug, Default)]
pub struct Needle {
    history: VecDeque<f32>,
}

impl Needle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a new sample for the given static volume and return the smoothed angle
    pub fn sample<R: Rng>(&mut self, ambient_volume: f32, rng: &mut R) -> f32 {
        let target = if ambient_volume > QUIET_THRESHOLD {
            MIN_ANGLE
        } else {
            MAX_ANGLE
        };
        let angle = (target + JITTER * gaussian(rng)).clamp(MIN_ANGLE, MAX_ANGLE);
        self.push(angle)
    }

    fn push(&mut self, angle: f32) -> f32 {
        self.history.push_back(angle);
        while self.history.len() > HISTORY_STEPS {
            self.history.pop_front();
        }
        self.history.iter().sum::<f32>() / self.history.len() as f32
    }
}

/// Standard normal sample (Box-Muller)
fn gaussian<R: Rng>(rng: &mut R) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
