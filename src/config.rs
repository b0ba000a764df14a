//! Configuration loading and management
//!
//! Configuration lives in a single JSON file. Every field has a default so
//! a partial file (or none of the optional sections) is enough to start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Full application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seeds, prompt templates and context sizes
    #[serde(flatten)]
    pub persona: Persona,

    pub transcriber: TranscriberConfig,

    pub generator: GeneratorConfig,

    pub speech: SpeechConfig,

    pub timing: TimingConfig,
}

/// What the controller needs to talk: seeds, templates and context windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    /// Name the model uses for the person it talks to
    pub username: String,

    /// Opening turns of a dialog
    pub dialog_seed: Vec<String>,

    /// Opening lines of a radio broadcast
    pub monologue_seed: Vec<String>,

    /// Header of every reply prompt; `{username}` is substituted
    pub dialog_prompt: String,

    /// Header of every broadcast prompt; `{username}` is substituted
    pub monologue_prompt: String,

    /// Dialog turns (user + reply pairs) included in a reply prompt
    pub context_turns: usize,

    /// Utterances included in a broadcast prompt
    pub broadcast_turns: usize,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            username: "User".to_string(),
            dialog_seed: vec!["Hello, who am I speaking with?".to_string()],
            monologue_seed: vec![
                "Good evening and welcome back to the late show.".to_string(),
            ],
            dialog_prompt: "The following is a conversation between a radio host and \
                            {username}, a caller.\n"
                .to_string(),
            monologue_prompt: "The following is a late-night radio broadcast.\n".to_string(),
            context_turns: 5,
            broadcast_turns: 10,
        }
    }
}

/// Which speech-to-text backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriberBackend {
    /// External worker process speaking the framed protocol
    #[default]
    Process,
    /// Lines typed in the terminal stand in for speech
    Typed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    pub backend: TranscriberBackend,

    /// Worker command line; `{device}` is replaced with the mic device
    pub command: Vec<String>,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            backend: TranscriberBackend::Process,
            command: vec![
                "radiobot-stt".to_string(),
                "--device".to_string(),
                "{device}".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Worker command line; `{model}` is replaced with the model path
    pub command: Vec<String>,

    /// Characters kept when the worker rejects an oversized prompt
    pub prompt_budget_chars: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "radiobot-llm".to_string(),
                "--model".to_string(),
                "{model}".to_string(),
            ],
            prompt_budget_chars: 2048,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Text-to-speech command; the text is appended as the last argument.
    /// Empty means text is only echoed.
    pub command: Vec<String>,

    /// Speaking rate used to estimate how long an utterance plays
    pub words_per_minute: f64,

    /// Print every spoken line to stdout
    pub echo_text: bool,

    /// Command that plays a cue; the cue file path is appended
    pub cue_command: Vec<String>,

    /// Directory holding `button_on.wav` and `button_off.wav`
    pub cue_dir: PathBuf,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            words_per_minute: 150.0,
            echo_text: true,
            cue_command: Vec::new(),
            cue_dir: PathBuf::from("sounds"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Polling cadence of the main loop
    pub tick_ms: u64,

    /// Display refresh cadence
    pub redraw_ms: u64,

    /// Give up on a worker after this long
    pub worker_timeout_secs: u64,

    /// How late a tick may be and still observe the end of playback
    pub done_speaking_window_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 20,
            redraw_ms: 200,
            worker_timeout_secs: 60,
            done_speaking_window_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn redraw(&self) -> Duration {
        Duration::from_millis(self.redraw_ms)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    pub fn done_speaking_window(&self) -> Duration {
        Duration::from_millis(self.done_speaking_window_ms)
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        let persona = &self.persona;
        if persona.dialog_seed.is_empty() {
            bail!("dialog_seed must contain at least one utterance");
        }
        if persona.monologue_seed.is_empty() {
            bail!("monologue_seed must contain at least one utterance");
        }
        if persona.context_turns == 0 || persona.broadcast_turns == 0 {
            bail!("context_turns and broadcast_turns must be positive");
        }
        if self.generator.command.is_empty() {
            bail!("generator.command must not be empty");
        }
        if self.transcriber.backend == TranscriberBackend::Process
            && self.transcriber.command.is_empty()
        {
            bail!("transcriber.command must not be empty for the process backend");
        }
        if self.timing.tick_ms == 0 {
            bail!("timing.tick_ms must be positive");
        }
        Ok(())
    }
}

/// Substitute `{name}` placeholders in a command line
///
/// Arguments that reference a variable with no value are dropped together
/// with the flag right before them, so `--model {model}` disappears when
/// no model was given.
pub fn render_command(template: &[String], vars: &HashMap<&str, String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(template.len());
    for arg in template {
        match placeholder(arg) {
            Some(name) => match vars.get(name) {
                Some(value) => out.push(arg.replace(&format!("{{{name}}}"), value)),
                None => {
                    if out.len() > 1 && out.last().is_some_and(|prev| prev.starts_with('-')) {
                        out.pop();
                    }
                }
            },
            None => out.push(arg.clone()),
        }
    }
    out
}

fn placeholder(arg: &str) -> Option<&str> {
    let start = arg.find('{')?;
    let end = arg[start..].find('}')? + start;
    Some(&arg[start + 1..end])
}
