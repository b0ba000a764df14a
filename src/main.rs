//! radiobot: a voice-driven radio persona
//!
//! Two ways to run:
//! - `run`: talk to the host with a push-to-talk control, or switch to
//!   radio mode and let it broadcast on its own
//! - `monologue`: generate an endless broadcast into text and SSML files
//!
//! Speech recognition and text generation run in worker processes; the
//! interaction controller in `state` decides what happens on every tick.

mod audio;
mod cli;
mod config;
mod conversation;
mod display;
mod events;
mod input;
mod lifecycle;
mod monologue;
mod prompt;
mod runtime;
mod state;
mod worker;

use std::collections::HashMap;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::VoiceSpeaker;
use crate::cli::{CliArgs, CliCommand, MonologueArgs, RunArgs};
use crate::config::{render_command, Config, TranscriberBackend};
use crate::display::{NullRenderer, Renderer, TerminalRenderer};
use crate::input::TerminalInput;
use crate::lifecycle::ShutdownSignal;
use crate::runtime::{Runtime, Workers};
use crate::worker::{ProcessWorker, TypedTranscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize logging
    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "radiobot starting");

    match args.command {
        CliCommand::Run(run) => run_host(run).await,
        CliCommand::Monologue(monologue) => run_monologue(monologue).await,
    }
}

async fn run_host(args: RunArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    info!(config = %args.config.display(), "configuration loaded");

    let mut vars = HashMap::new();
    if let Some(model) = &args.model {
        vars.insert("model", model.clone());
    }
    if let Some(device) = args.mic_device {
        vars.insert("device", device.to_string());
    }

    let shutdown = ShutdownSignal::new();

    let mut generator =
        ProcessWorker::spawn("generator", &render_command(&config.generator.command, &vars))
            .context("failed to start the generation worker")?;

    let mut input = TerminalInput::start().context("failed to start terminal input")?;

    let speaker = Box::new(VoiceSpeaker::new(&config.speech));
    let renderer: Box<dyn Renderer> = if args.no_display {
        Box::new(NullRenderer)
    } else {
        Box::new(TerminalRenderer::stdout())
    };

    let typed = args.text || config.transcriber.backend == TranscriberBackend::Typed;
    info!(typed, "press enter to talk, 'r' to switch mode, 'q' to quit");

    let result = if typed {
        let mut transcriber = TypedTranscriber::new();
        let mut runtime = Runtime::new(&config, speaker, renderer, Some(transcriber.feed()));
        let workers = Workers {
            transcriber: &mut transcriber,
            generator: &mut generator,
        };
        runtime.run(workers, &mut input, &shutdown).await
    } else {
        let command = render_command(&config.transcriber.command, &vars);
        let mut transcriber = ProcessWorker::spawn("transcriber", &command)
            .context("failed to start the speech-to-text worker")?;
        let mut runtime = Runtime::new(&config, speaker, renderer, None);
        let workers = Workers {
            transcriber: &mut transcriber,
            generator: &mut generator,
        };
        let result = runtime.run(workers, &mut input, &shutdown).await;
        transcriber.shutdown().await;
        result
    };

    // Cleanup
    info!("shutting down...");
    generator.shutdown().await;

    if let Err(e) = &result {
        warn!(error = %e, "main loop failed");
    }
    info!("radiobot stopped");

    result
}

async fn run_monologue(args: MonologueArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    info!(config = %args.config.display(), "configuration loaded");

    let mut vars = HashMap::new();
    if let Some(model) = &args.model {
        vars.insert("model", model.clone());
    }

    let shutdown = ShutdownSignal::new();
    let mut generator =
        ProcessWorker::spawn("generator", &render_command(&config.generator.command, &vars))
            .context("failed to start the generation worker")?;

    let result = monologue::run(&config, &mut generator, &args.out_dir, &shutdown).await;

    generator.shutdown().await;
    info!("radiobot stopped");

    result
}
