//! The polling loop around the controller
//!
//! Each tick collects one batch of events (input edge, worker readiness),
//! steps the controller and executes the commands it returns in order.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::audio::Speaker;
use crate::config::Config;
use crate::display::{Frame, Needle, Renderer};
use crate::events::{Event, EventBatch};
use crate::input::{InputEdge, TerminalInput};
use crate::lifecycle::ShutdownSignal;
use crate::prompt;
use crate::state::{Command, Controller, Inbox, Limits, State, SttControl};
use crate::worker::{TypedFeed, WorkerChannel, WorkerError, WorkerRequest};

/// The two workers, borrowed for the lifetime of the loop
pub struct Workers<'a> {
    pub transcriber: &'a mut dyn WorkerChannel,
    pub generator: &'a mut dyn WorkerChannel,
}

impl Workers<'_> {
    /// Name of a worker that has exited, if any
    fn closed(&self) -> Option<&str> {
        [&*self.transcriber, &*self.generator]
            .into_iter()
            .find(|worker| worker.is_closed())
            .map(|worker| worker.name())
    }

    fn send(worker: &mut dyn WorkerChannel, request: WorkerRequest) {
        debug!(worker = worker.name(), ?request, "sending request");
        if let Err(e) = worker.send(request) {
            warn!(worker = worker.name(), error = %e, "failed to send request");
        }
    }
}

impl Inbox for Workers<'_> {
    fn take_transcript(&mut self) -> Result<String, WorkerError> {
        self.transcriber.receive()
    }

    fn take_generation(&mut self) -> Result<String, WorkerError> {
        self.generator
            .receive()
            .map(|raw| prompt::tidy_utterance(&raw))
    }
}

pub struct Runtime {
    controller: Controller,
    speaker: Box<dyn Speaker>,
    renderer: Box<dyn Renderer>,
    /// Present when transcripts are typed instead of spoken
    typed_feed: Option<TypedFeed>,
    /// Release half of a typed utterance, handed over on the next tick
    deferred: Option<Event>,
    needle: Needle,
    rng: StdRng,
    tick: Duration,
    redraw: Duration,
    last_redraw: Option<Instant>,
}

impl Runtime {
    pub fn new(
        config: &Config,
        speaker: Box<dyn Speaker>,
        renderer: Box<dyn Renderer>,
        typed_feed: Option<TypedFeed>,
    ) -> Self {
        Self {
            controller: Controller::new(config.persona.clone(), Limits::from(config)),
            speaker,
            renderer,
            typed_feed,
            deferred: None,
            needle: Needle::new(),
            rng: StdRng::from_entropy(),
            tick: config.timing.tick(),
            redraw: config.timing.redraw(),
            last_redraw: None,
        }
    }

    #[cfg(test)]
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Run until quit is requested or a shutdown signal arrives
    pub async fn run(
        &mut self,
        mut workers: Workers<'_>,
        input: &mut TerminalInput,
        shutdown: &ShutdownSignal,
    ) -> Result<()> {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let signal = shutdown.wait();
        tokio::pin!(signal);

        info!(state = %self.controller.state(), "entering main loop");

        let mut result = Ok(());
        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("shutdown signal received");
                    break;
                }
                _ = interval.tick() => {}
            }

            // A deferred release owns this tick; new input waits
            let edge = if self.deferred.is_some() {
                None
            } else {
                input.try_next()
            };

            match self.tick_once(Instant::now(), edge, &mut workers).await {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => {
                    info!("quit requested");
                    break;
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        input.stop();
        debug!(conversation = %self.controller.log().joined(), "final conversation");
        info!(state = %self.controller.state(), "main loop stopped");
        result
    }

    /// One loop iteration: build the batch, step, execute, redraw if due
    ///
    /// Fails once a worker has exited, since nothing could answer again.
    pub async fn tick_once(
        &mut self,
        now: Instant,
        edge: Option<InputEdge>,
        workers: &mut Workers<'_>,
    ) -> Result<ControlFlow<()>> {
        let mut batch = EventBatch::new();

        if let Some(event) = self.deferred.take() {
            batch.push(event);
        }

        match edge {
            Some(InputEdge::Quit) => return Ok(ControlFlow::Break(())),
            Some(InputEdge::Typed(text)) => match &self.typed_feed {
                // Only an idle dialog can take the line; feeding it now would
                // hand it to some later capture
                Some(feed) if self.controller.state() == State::IdleDialog => {
                    feed.push(text);
                    batch.push(Event::BeginCapture);
                    self.deferred = Some(Event::EndCapture);
                }
                Some(_) => {
                    warn!(%text, state = %self.controller.state(), "typed text ignored, not listening")
                }
                None => warn!(%text, "typed text ignored, transcriber listens to the microphone"),
            },
            Some(edge) => {
                if let Some(event) = edge.event() {
                    batch.push(event);
                }
            }
            None => {}
        }

        if workers.transcriber.poll() {
            batch.push(Event::TranscriptReady);
        }
        if workers.generator.poll() {
            batch.push(Event::GenerationReady);
        }

        let commands = self.controller.step(now, batch, workers);
        for command in commands {
            self.execute(command, workers).await;
        }

        let due = self
            .last_redraw
            .map_or(true, |last| now.saturating_duration_since(last) >= self.redraw);
        if due {
            self.draw(now);
        }

        if let Some(name) = workers.closed() {
            bail!("{name} worker exited");
        }

        Ok(ControlFlow::Continue(()))
    }

    async fn execute(&mut self, command: Command, workers: &mut Workers<'_>) {
        match command {
            Command::SetAmbient { level } => self.speaker.set_ambient(level),
            Command::PlayCue { cue } => {
                if let Err(e) = self.speaker.cue(cue) {
                    warn!(?cue, error = %e, "failed to play cue");
                }
            }
            Command::Transcriber { control } => {
                let request = match control {
                    SttControl::Start => WorkerRequest::StartRecording,
                    SttControl::Stop => WorkerRequest::StopRecording,
                };
                Workers::send(workers.transcriber, request);
            }
            Command::Generate { prompt } => {
                Workers::send(workers.generator, WorkerRequest::Generate { prompt });
            }
            Command::Speak { text } => {
                let duration = match self.speaker.say(&text) {
                    Ok(duration) => duration,
                    Err(e) => {
                        // Nothing plays, so playback ends right away
                        warn!(error = %e, "failed to speak");
                        Duration::ZERO
                    }
                };
                self.controller.playback_started(Instant::now(), duration);
            }
            Command::Broadcast { text } => match self.speaker.say(&text) {
                Ok(duration) => {
                    debug!(?duration, "opening broadcast");
                    tokio::time::sleep(duration).await;
                }
                Err(e) => warn!(error = %e, "failed to speak opening broadcast"),
            },
            Command::Redraw => self.draw(Instant::now()),
        }
    }

    fn draw(&mut self, now: Instant) {
        let needle = self
            .needle
            .sample(self.speaker.ambient_volume(), &mut self.rng);
        self.renderer.render(&Frame {
            mode: self.controller.mode(),
            state: self.controller.state(),
            listening: self.controller.listening(),
            needle,
        });
        self.last_redraw = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::audio::AudioError;
    use crate::config::Persona;
    use crate::state::{Ambient, Cue, Mode};
    use crate::worker::TypedTranscriber;

    #[derive(Default)]
    struct Spoken {
        lines: Vec<String>,
        cues: Vec<Cue>,
    }

    struct FakeSpeaker {
        spoken: Arc<Mutex<Spoken>>,
        ambient: Ambient,
    }

    impl Speaker for FakeSpeaker {
        fn say(&mut self, text: &str) -> Result<Duration, AudioError> {
            self.spoken.lock().unwrap().lines.push(text.to_string());
            Ok(Duration::ZERO)
        }

        fn cue(&mut self, cue: Cue) -> Result<(), AudioError> {
            self.spoken.lock().unwrap().cues.push(cue);
            Ok(())
        }

        fn set_ambient(&mut self, level: Ambient) {
            self.ambient = level;
        }

        fn ambient_volume(&self) -> f32 {
            self.ambient.volume()
        }
    }

    struct FakeRenderer {
        frames: Rc<RefCell<Vec<Frame>>>,
    }

    impl Renderer for FakeRenderer {
        fn render(&mut self, frame: &Frame) {
            self.frames.borrow_mut().push(*frame);
        }
    }

    /// Generator that answers each prompt with the next scripted reply
    #[derive(Default)]
    struct ScriptedGenerator {
        prompts: Vec<String>,
        replies: VecDeque<String>,
        ready: Option<String>,
        closed: bool,
    }

    impl WorkerChannel for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted-llm"
        }

        fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
            if let WorkerRequest::Generate { prompt } = request {
                self.prompts.push(prompt);
                self.ready = self.replies.pop_front();
            }
            Ok(())
        }

        fn poll(&mut self) -> bool {
            self.ready.is_some()
        }

        fn receive(&mut self) -> Result<String, WorkerError> {
            self.ready.take().ok_or(WorkerError::NotReady)
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    struct Harness {
        runtime: Runtime,
        spoken: Arc<Mutex<Spoken>>,
        frames: Rc<RefCell<Vec<Frame>>>,
        stt: TypedTranscriber,
        llm: ScriptedGenerator,
    }

    impl Harness {
        fn new(replies: &[&str]) -> Self {
            let config = Config {
                persona: Persona {
                    username: "Ana".to_string(),
                    dialog_seed: vec!["Hello, caller.".to_string()],
                    monologue_seed: vec!["Good evening, listeners.".to_string()],
                    dialog_prompt: "Chat\n".to_string(),
                    monologue_prompt: "Radio\n".to_string(),
                    ..Persona::default()
                },
                ..Config::default()
            };
            let spoken = Arc::new(Mutex::new(Spoken::default()));
            let frames = Rc::new(RefCell::new(Vec::new()));
            let stt = TypedTranscriber::new();
            let runtime = Runtime::new(
                &config,
                Box::new(FakeSpeaker {
                    spoken: Arc::clone(&spoken),
                    ambient: Ambient::High,
                }),
                Box::new(FakeRenderer {
                    frames: Rc::clone(&frames),
                }),
                Some(stt.feed()),
            );
            let llm = ScriptedGenerator {
                replies: replies.iter().map(|s| s.to_string()).collect(),
                ..ScriptedGenerator::default()
            };
            Self {
                runtime,
                spoken,
                frames,
                stt,
                llm,
            }
        }

        async fn try_tick(&mut self, edge: Option<InputEdge>) -> Result<ControlFlow<()>> {
            let mut workers = Workers {
                transcriber: &mut self.stt,
                generator: &mut self.llm,
            };
            let now = Instant::now() + Duration::from_millis(10);
            self.runtime.tick_once(now, edge, &mut workers).await
        }

        async fn tick(&mut self, edge: Option<InputEdge>) -> ControlFlow<()> {
            self.try_tick(edge).await.unwrap()
        }

        fn state(&self) -> State {
            self.runtime.controller().state()
        }
    }

    #[tokio::test]
    async fn test_typed_dialog_round_trip() {
        let mut h = Harness::new(&["Clear skies tonight. I: and then"]);

        h.tick(Some(InputEdge::Typed("how's the weather?".to_string()))).await;
        assert_eq!(h.state(), State::Recording);

        // Release arrives one tick later, then the transcript
        h.tick(None).await;
        assert_eq!(h.state(), State::Transcribing);
        h.tick(None).await;
        assert_eq!(h.state(), State::Thinking);
        assert!(h.llm.prompts[0].ends_with("Ana: how's the weather?\nI: "));

        h.tick(None).await;
        assert_eq!(h.state(), State::Speaking);
        assert_eq!(
            h.runtime.controller().log().last(),
            Some("Clear skies tonight.")
        );

        h.tick(None).await;
        assert_eq!(h.state(), State::IdleDialog);

        let spoken = h.spoken.lock().unwrap();
        assert_eq!(spoken.lines, vec!["Clear skies tonight.".to_string()]);
        assert_eq!(spoken.cues, vec![Cue::CaptureStart, Cue::CaptureEnd]);
    }

    #[tokio::test]
    async fn test_quit_stops_loop() {
        let mut h = Harness::new(&[]);
        assert!(h.tick(None).await.is_continue());
        assert!(h.tick(Some(InputEdge::Quit)).await.is_break());
    }

    #[tokio::test]
    async fn test_radio_opener_broadcasts_seed() {
        let mut h = Harness::new(&["Tonight we talk about owls."]);

        h.tick(Some(InputEdge::ModeSwitchReleased)).await;
        assert_eq!(h.state(), State::IdleRadio);
        assert_eq!(h.runtime.controller().mode(), Mode::Radio);

        h.tick(None).await;
        assert_eq!(h.state(), State::ThinkingRadio);
        assert_eq!(
            h.spoken.lock().unwrap().lines,
            vec!["Good evening, listeners.".to_string()]
        );

        h.tick(None).await;
        assert_eq!(h.state(), State::ThinkAndSay);
        assert!(!h.runtime.controller().listening());
    }

    #[tokio::test]
    async fn test_redraw_cadence() {
        let mut h = Harness::new(&[]);
        h.tick(None).await;
        h.tick(None).await;
        // First tick draws, the second is inside the redraw interval
        assert_eq!(h.frames.borrow().len(), 1);
        let frame = h.frames.borrow()[0];
        assert_eq!(frame.state, State::IdleDialog);
        assert!(frame.listening);
    }

    #[tokio::test]
    async fn test_typed_text_ignored_unless_idle_dialog() {
        let mut h = Harness::new(&[]);
        h.tick(Some(InputEdge::ModeSwitchReleased)).await;
        assert_eq!(h.state(), State::IdleRadio);

        h.tick(Some(InputEdge::Typed("too early".to_string()))).await;
        assert_eq!(h.state(), State::ThinkingRadio);

        // The line was not kept for a later capture
        h.stt.send(WorkerRequest::StartRecording).unwrap();
        h.stt.send(WorkerRequest::StopRecording).unwrap();
        assert_eq!(h.stt.receive().unwrap(), "");
    }

    #[tokio::test]
    async fn test_exited_worker_stops_loop() {
        let mut h = Harness::new(&[]);
        assert!(h.try_tick(None).await.is_ok());

        h.llm.closed = true;
        let err = h.try_tick(None).await.unwrap_err();
        assert_eq!(err.to_string(), "scripted-llm worker exited");
    }
}
