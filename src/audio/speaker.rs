//! Speaker backed by external commands
//!
//! Speech and cues are fire-and-forget child processes; how long a line
//! plays is estimated from its word count.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::SpeechConfig;
use crate::state::{Ambient, Cue};

use super::{AudioError, Speaker};

/// Shortest time any line is assumed to take
const MIN_UTTERANCE: Duration = Duration::from_millis(500);

pub struct VoiceSpeaker {
    tts_command: Vec<String>,
    cue_command: Vec<String>,
    cue_dir: PathBuf,
    words_per_minute: f64,
    echo_text: bool,
    ambient: Ambient,
    /// The line currently playing, replaced when a new one starts
    current: Option<Child>,
    /// Cue sounds that may still be playing
    cues: Vec<Child>,
}

impl VoiceSpeaker {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            tts_command: config.command.clone(),
            cue_command: config.cue_command.clone(),
            cue_dir: config.cue_dir.clone(),
            words_per_minute: config.words_per_minute.max(1.0),
            echo_text: config.echo_text,
            ambient: Ambient::High,
            current: None,
            cues: Vec::new(),
        }
    }

    /// Time needed to say `text` at the configured rate
    pub fn estimate(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as f64;
        let secs = words * 60.0 / self.words_per_minute;
        Duration::from_secs_f64(secs).max(MIN_UTTERANCE)
    }

    fn spawn(command: &[String], last_arg: &str) -> Result<Option<Child>, AudioError> {
        let Some((program, args)) = command.split_first() else {
            return Ok(None);
        };
        Command::new(program)
            .args(args)
            .arg(last_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map(Some)
            .map_err(|source| AudioError::Spawn {
                program: program.clone(),
                source,
            })
    }

    fn reap_current(&mut self) {
        if let Some(mut child) = self.current.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!("previous line still playing, stopping it");
                    let _ = child.kill();
                    let _ = child.wait();
                }
                Err(e) => warn!(?e, "failed to check speech process"),
            }
        }
    }

    /// Collect cue processes that have finished
    fn reap_cues(&mut self) {
        self.cues.retain_mut(|child| match child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(e) => {
                warn!(?e, "failed to check cue process");
                false
            }
        });
    }
}

impl Speaker for VoiceSpeaker {
    fn say(&mut self, text: &str) -> Result<Duration, AudioError> {
        if self.echo_text {
            println!("I: {text}");
        }
        self.reap_current();
        self.current = Self::spawn(&self.tts_command, text)?;
        Ok(self.estimate(text))
    }

    fn cue(&mut self, cue: Cue) -> Result<(), AudioError> {
        let file = match cue {
            Cue::CaptureStart => "button_on.wav",
            Cue::CaptureEnd => "button_off.wav",
        };
        let path = self.cue_dir.join(file);
        debug!(?cue, path = %path.display(), "playing cue");
        self.reap_cues();
        if let Some(child) = Self::spawn(&self.cue_command, &path.to_string_lossy())? {
            self.cues.push(child);
        }
        Ok(())
    }

    fn set_ambient(&mut self, level: Ambient) {
        self.ambient = level;
    }

    fn ambient_volume(&self) -> f32 {
        self.ambient.volume()
    }
}

impl Drop for VoiceSpeaker {
    fn drop(&mut self) {
        self.reap_current();
        for mut child in self.cues.drain(..) {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
