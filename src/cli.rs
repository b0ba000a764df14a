use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "radiobot", version, about = "Radiobot - a talking radio host")]
pub struct CliArgs {
    /// Enable debug mode with verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Talk with the host, or let it broadcast
    Run(RunArgs),

    /// Generate an endless monologue into text and SSML files
    Monologue(MonologueArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Configuration file
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,

    /// Type utterances on the terminal instead of speaking them
    #[arg(long)]
    pub text: bool,

    /// Do not draw the VU meter
    #[arg(long)]
    pub no_display: bool,

    /// Model passed to the generation worker
    #[arg(long)]
    pub model: Option<String>,

    /// Microphone device passed to the speech-to-text worker
    #[arg(long)]
    pub mic_device: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct MonologueArgs {
    /// Configuration file
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,

    /// Model passed to the generation worker
    #[arg(long)]
    pub model: Option<String>,

    /// Directory the transcripts are written to
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}
