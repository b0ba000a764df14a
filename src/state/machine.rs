//! Core interaction state machine
//!
//! One canonical transition table for both modes. Each tick the runtime
//! hands over a batch of events; the controller applies at most one
//! transition and returns the commands it implies.
//!
//! A mode switch requested while a generation is in flight is deferred
//! through `ClearQueue` / `SlowTongue` / `FinishTalking` until the late
//! result has been drained, so it can never land in the wrong conversation.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::{Config, Persona};
use crate::conversation::ConversationLog;
use crate::events::{Event, EventBatch};
use crate::prompt;
use crate::worker::WorkerError;

use super::command::{Ambient, Command, Cue, SttControl};
use super::slot::WorkerSlot;
use super::timer::{PlaybackTimer, TimerPoll};

/// Conversation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Turn-taking with the user
    Dialog,
    /// Self-driving monologue
    Radio,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Dialog => f.pad("dialog"),
            Mode::Radio => f.pad("radio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Waiting for the user to press the talk control
    IdleDialog,
    /// Capturing the user's voice
    Recording,
    /// Waiting for the transcript
    Transcribing,
    /// Waiting for the reply
    Thinking,
    /// Playing the reply
    Speaking,
    /// Radio selected; opening broadcast not played yet
    IdleRadio,
    /// Waiting for the next broadcast line
    ThinkingRadio,
    /// Playing a line while the next one is generated
    ThinkAndSay,
    /// Next line ready, current one still playing
    SlowTongue,
    /// Switch to dialog requested while a ready line is pending
    FinishTalking,
    /// Switch to dialog requested while a generation is in flight
    ClearQueue,
}

impl State {
    #[cfg(test)]
    pub const ALL: [State; 11] = [
        State::IdleDialog,
        State::Recording,
        State::Transcribing,
        State::Thinking,
        State::Speaking,
        State::IdleRadio,
        State::ThinkingRadio,
        State::ThinkAndSay,
        State::SlowTongue,
        State::FinishTalking,
        State::ClearQueue,
    ];

    /// The mode this state belongs to
    pub fn mode(self) -> Mode {
        match self {
            State::IdleDialog
            | State::Recording
            | State::Transcribing
            | State::Thinking
            | State::Speaking => Mode::Dialog,
            State::IdleRadio
            | State::ThinkingRadio
            | State::ThinkAndSay
            | State::SlowTongue
            | State::FinishTalking
            | State::ClearQueue => Mode::Radio,
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            State::IdleDialog => "idle_dialog",
            State::Recording => "recording",
            State::Transcribing => "transcribing",
            State::Thinking => "thinking",
            State::Speaking => "speaking",
            State::IdleRadio => "idle_radio",
            State::ThinkingRadio => "thinking_radio",
            State::ThinkAndSay => "think_and_say",
            State::SlowTongue => "slow_tongue",
            State::FinishTalking => "finish_talking",
            State::ClearQueue => "clear_queue",
        };
        f.pad(name)
    }
}

/// Source of worker results, read only when a state consumes them
pub trait Inbox {
    fn take_transcript(&mut self) -> Result<String, WorkerError>;
    fn take_generation(&mut self) -> Result<String, WorkerError>;
}

/// Timing and size limits applied by the controller
#[derive(Debug, Clone)]
pub struct Limits {
    /// Give up on an outstanding worker request after this long
    pub worker_timeout: Duration,
    /// Late ticks within this window still observe the end of playback
    pub done_speaking_window: Duration,
    /// Characters kept when retrying an oversized prompt
    pub prompt_budget_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            worker_timeout: Duration::from_secs(60),
            done_speaking_window: Duration::from_secs(1),
            prompt_budget_chars: 2048,
        }
    }
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            worker_timeout: config.timing.worker_timeout(),
            done_speaking_window: config.timing.done_speaking_window(),
            prompt_budget_chars: config.generator.prompt_budget_chars,
        }
    }
}

/// Outcome of consuming a generation result
enum Generation {
    Text(String),
    Retrying,
    Failed,
}

/// The interaction controller
pub struct Controller {
    persona: Persona,
    limits: Limits,
    mode: Mode,
    state: State,
    log: ConversationLog,
    timer: PlaybackTimer,
    transcriber: WorkerSlot,
    generator: WorkerSlot,
    /// Last prompt sent, kept for the oversized-prompt retry
    last_prompt: Option<String>,
    retried: bool,
}

impl Controller {
    pub fn new(persona: Persona, limits: Limits) -> Self {
        let log = ConversationLog::seeded(&persona.dialog_seed);
        Self {
            persona,
            limits,
            mode: Mode::Dialog,
            state: State::IdleDialog,
            log,
            timer: PlaybackTimer::default(),
            transcriber: WorkerSlot::new("transcriber"),
            generator: WorkerSlot::new("generator"),
            last_prompt: None,
            retried: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Whether the mic should be shown (dialog group states)
    pub fn listening(&self) -> bool {
        self.state.mode() == Mode::Dialog
    }

    /// Playback of the last `Speak` command began at `now`
    pub fn playback_started(&mut self, now: Instant, duration: Duration) {
        self.timer.arm(now + duration);
    }

    /// Apply one batch of events and return the commands to execute
    pub fn step(&mut self, now: Instant, mut batch: EventBatch, inbox: &mut dyn Inbox) -> Vec<Command> {
        let old_state = self.state;
        let mut out = Vec::new();

        match self.timer.poll(now, self.limits.done_speaking_window) {
            TimerPoll::Fired => batch.push(Event::PlaybackDone),
            TimerPoll::Missed { late_by } => {
                warn!(state = %self.state, ?late_by, "playback completion missed");
            }
            TimerPoll::Idle | TimerPoll::Pending => {}
        }

        self.drain_abandoned(&mut batch, inbox);

        if !self.enforce_timeouts(now, &batch, &mut out) {
            self.dispatch(now, &batch, inbox, &mut out);
        }

        if self.state != old_state {
            debug!(from = %old_state, to = %self.state, commands = out.len(), "state transition");
        }

        out
    }

    fn dispatch(&mut self, now: Instant, batch: &EventBatch, inbox: &mut dyn Inbox, out: &mut Vec<Command>) {
        match self.state {
            State::IdleDialog => {
                if batch.contains(Event::BeginCapture) {
                    if !self.transcriber.begin(now) {
                        warn!("transcriber has not delivered its last result, capture ignored");
                        return;
                    }
                    out.push(Command::SetAmbient { level: Ambient::Low });
                    out.push(Command::PlayCue { cue: Cue::CaptureStart });
                    out.push(Command::Transcriber { control: SttControl::Start });
                    self.enter(State::Recording);
                } else if batch.contains(Event::SwitchMode) {
                    self.switch_mode(Mode::Radio);
                    out.push(Command::SetAmbient { level: Ambient::High });
                    self.enter(State::IdleRadio);
                }
            }

            State::Recording => {
                if batch.contains(Event::EndCapture) {
                    out.push(Command::SetAmbient { level: Ambient::High });
                    out.push(Command::PlayCue { cue: Cue::CaptureEnd });
                    out.push(Command::Transcriber { control: SttControl::Stop });
                    self.transcriber.touch(now);
                    self.enter(State::Transcribing);
                }
            }

            State::Transcribing => {
                if batch.contains(Event::TranscriptReady) {
                    let result = inbox.take_transcript();
                    self.transcriber.complete();
                    match result {
                        Ok(text) => {
                            info!(%text, "user said");
                            self.log.push(text);
                            let prompt = prompt::build_reply_prompt(
                                &self.persona.dialog_prompt,
                                self.log.turns(),
                                self.persona.context_turns,
                                &self.persona.username,
                            );
                            if self.send_prompt(now, prompt, out) {
                                self.enter(State::Thinking);
                            } else {
                                self.recover(out);
                            }
                        }
                        Err(e) => {
                            warn!(worker = self.transcriber.name(), error = %e, "transcription failed");
                            self.recover(out);
                        }
                    }
                }
            }

            State::Thinking => {
                if batch.contains(Event::GenerationReady) {
                    match self.take_generation(now, inbox, out) {
                        Generation::Text(reply) => {
                            self.log.push(reply.clone());
                            out.push(Command::SetAmbient { level: Ambient::Low });
                            out.push(Command::Speak { text: reply });
                            self.enter(State::Speaking);
                        }
                        Generation::Retrying => {}
                        Generation::Failed => self.recover(out),
                    }
                }
            }

            State::Speaking => {
                if batch.contains(Event::PlaybackDone) {
                    self.timer.disarm();
                    out.push(Command::SetAmbient { level: Ambient::High });
                    self.enter(State::IdleDialog);
                }
            }

            State::IdleRadio => {
                if batch.contains(Event::SwitchMode) {
                    self.switch_mode(Mode::Dialog);
                    out.push(Command::SetAmbient { level: Ambient::High });
                    self.enter(State::IdleDialog);
                } else if self.generator.is_free() {
                    let prompt = self.next_broadcast_prompt();
                    self.send_prompt(now, prompt, out);
                    // The opening line is scripted, so the loop blocks while it plays
                    out.push(Command::Redraw);
                    out.push(Command::SetAmbient { level: Ambient::Low });
                    out.push(Command::Broadcast { text: self.log.joined() });
                    out.push(Command::SetAmbient { level: Ambient::High });
                    self.enter(State::ThinkingRadio);
                }
            }

            State::ThinkingRadio => {
                if batch.contains(Event::GenerationReady) {
                    match self.take_generation(now, inbox, out) {
                        Generation::Text(line) => {
                            self.log.push(line.clone());
                            out.push(Command::SetAmbient { level: Ambient::Low });
                            out.push(Command::Speak { text: line });
                            // Start on the next line while this one plays
                            let prompt = self.next_broadcast_prompt();
                            if self.send_prompt(now, prompt, out) {
                                self.enter(State::ThinkAndSay);
                            } else {
                                self.recover(out);
                            }
                        }
                        Generation::Retrying => {}
                        Generation::Failed => self.recover(out),
                    }
                } else if batch.contains(Event::SwitchMode) {
                    self.enter(State::ClearQueue);
                }
            }

            State::ThinkAndSay => {
                if batch.contains(Event::GenerationReady) {
                    self.enter(State::SlowTongue);
                } else if batch.contains(Event::PlaybackDone) {
                    self.timer.disarm();
                    out.push(Command::SetAmbient { level: Ambient::High });
                    self.enter(State::ThinkingRadio);
                } else if batch.contains(Event::SwitchMode) {
                    // Still speaking; known gap, the line keeps playing into dialog mode
                    self.enter(State::ClearQueue);
                }
            }

            State::SlowTongue => {
                if batch.contains(Event::PlaybackDone) {
                    self.timer.disarm();
                    self.enter(State::ThinkingRadio);
                } else if batch.contains(Event::SwitchMode) {
                    self.enter(State::FinishTalking);
                }
            }

            State::FinishTalking => {
                if batch.contains(Event::PlaybackDone) {
                    self.timer.disarm();
                    out.push(Command::SetAmbient { level: Ambient::High });
                    self.discard_generation(inbox);
                    self.switch_mode(Mode::Dialog);
                    self.enter(State::IdleDialog);
                }
            }

            State::ClearQueue => {
                if batch.contains(Event::GenerationReady) {
                    self.discard_generation(inbox);
                    self.switch_mode(Mode::Dialog);
                    self.enter(State::IdleDialog);
                }
            }
        }
    }

    /// Move to `next`, which must belong to the active mode
    fn enter(&mut self, next: State) {
        if next.mode() != self.mode {
            error!(state = %next, mode = %self.mode, "state does not belong to the active mode");
            panic!("invalid state {next} in {} mode", self.mode);
        }
        self.state = next;
    }

    /// Change mode and start its conversation from the seed
    fn switch_mode(&mut self, mode: Mode) {
        debug_assert!(
            !self.generator.is_busy(),
            "conversation replaced while a generation is outstanding"
        );
        let seed = match mode {
            Mode::Dialog => &self.persona.dialog_seed,
            Mode::Radio => &self.persona.monologue_seed,
        };
        self.log.replace(seed);
        self.mode = mode;
        info!(%mode, "conversation mode switched");
    }

    /// Return to the idle state of the active mode after a worker incident
    fn recover(&mut self, out: &mut Vec<Command>) {
        out.push(Command::SetAmbient { level: Ambient::High });
        match self.mode {
            Mode::Dialog => self.enter(State::IdleDialog),
            Mode::Radio => {
                self.switch_mode(Mode::Radio);
                self.enter(State::IdleRadio);
            }
        }
        warn!(state = %self.state, "recovered from worker incident");
    }

    fn next_broadcast_prompt(&self) -> String {
        prompt::broadcast_prompt(
            &self.persona.monologue_prompt,
            self.log.turns(),
            self.persona.broadcast_turns,
            &self.persona.username,
        )
    }

    /// Send a fresh prompt; false if the generator cannot take one
    fn send_prompt(&mut self, now: Instant, prompt: String, out: &mut Vec<Command>) -> bool {
        if !self.generator.begin(now) {
            warn!(slot = ?self.generator.state(), "generator unavailable, prompt not sent");
            return false;
        }
        self.last_prompt = Some(prompt.clone());
        self.retried = false;
        out.push(Command::Generate { prompt });
        true
    }

    fn take_generation(&mut self, now: Instant, inbox: &mut dyn Inbox, out: &mut Vec<Command>) -> Generation {
        let result = inbox.take_generation();
        self.generator.complete();

        match result {
            Ok(text) => {
                self.last_prompt = None;
                Generation::Text(text)
            }
            Err(WorkerError::PromptTooLong) if !self.retried => {
                let Some(prompt) = self.last_prompt.take() else {
                    return Generation::Failed;
                };
                let truncated = prompt::truncate_prompt(&prompt, self.limits.prompt_budget_chars);
                warn!(
                    from = prompt.chars().count(),
                    to = truncated.chars().count(),
                    "prompt too long, retrying with its tail"
                );
                if self.send_prompt(now, truncated, out) {
                    self.retried = true;
                    Generation::Retrying
                } else {
                    Generation::Failed
                }
            }
            Err(e) => {
                warn!(worker = self.generator.name(), error = %e, state = %self.state, "generation failed");
                self.last_prompt = None;
                Generation::Failed
            }
        }
    }

    /// Receive and drop a pending generation
    fn discard_generation(&mut self, inbox: &mut dyn Inbox) {
        if !self.generator.is_busy() {
            return;
        }
        match inbox.take_generation() {
            Ok(text) => debug!(%text, "discarded generation"),
            Err(e) => debug!(error = %e, "discarded failed generation"),
        }
        self.generator.complete();
        self.last_prompt = None;
    }

    /// Swallow late results of requests we already gave up on
    fn drain_abandoned(&mut self, batch: &mut EventBatch, inbox: &mut dyn Inbox) {
        if self.generator.is_abandoned() && batch.take(Event::GenerationReady) {
            let late = inbox.take_generation();
            info!(ok = late.is_ok(), "drained late generation");
            self.generator.complete();
        }
        if self.transcriber.is_abandoned() && batch.take(Event::TranscriptReady) {
            let late = inbox.take_transcript();
            info!(ok = late.is_ok(), "drained late transcript");
            self.transcriber.complete();
        }
    }

    /// Abandon hung requests; true if a recovery transition was taken
    fn enforce_timeouts(&mut self, now: Instant, batch: &EventBatch, out: &mut Vec<Command>) -> bool {
        let timeout = self.limits.worker_timeout;

        if self.state == State::Transcribing
            && !batch.contains(Event::TranscriptReady)
            && self.transcriber.overdue(now, timeout)
        {
            warn!(worker = self.transcriber.name(), ?timeout, "worker timed out");
            self.transcriber.abandon();
            self.recover(out);
            return true;
        }

        let awaiting_generation = matches!(
            self.state,
            State::Thinking | State::ThinkingRadio | State::ThinkAndSay | State::ClearQueue
        );
        if awaiting_generation
            && !batch.contains(Event::GenerationReady)
            && self.generator.overdue(now, timeout)
        {
            warn!(worker = self.generator.name(), ?timeout, state = %self.state, "worker timed out");
            self.generator.abandon();
            self.last_prompt = None;
            if self.state == State::ClearQueue {
                self.switch_mode(Mode::Dialog);
                self.enter(State::IdleDialog);
            } else {
                self.recover(out);
            }
            return true;
        }

        false
    }
}
