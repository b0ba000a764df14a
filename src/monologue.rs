//! Endless monologue generation
//!
//! Drives only the generator: each new line continues the broadcast and is
//! appended to a plain-text transcript and to an SSML script.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::Config;
use crate::conversation::ConversationLog;
use crate::lifecycle::ShutdownSignal;
use crate::prompt;
use crate::worker::{ProcessWorker, WorkerChannel, WorkerError, WorkerRequest};

/// Names for output files, two picked at random per run
const ANIMALS: &[&str] = &[
    "aardvark", "bat", "cow", "dolphin", "eagle", "fox", "giraffe", "horse", "iguana", "jaguar",
    "koala", "llama", "monkey", "nandu", "ocelot", "panther", "rhino", "salamander", "tortoise",
    "viper", "wombat", "yaguarete", "zebra",
];

/// File stem such as `monologue_fox_wombat`
pub fn output_stem<R: Rng>(rng: &mut R) -> String {
    let picked: Vec<&str> = ANIMALS.choose_multiple(rng, 2).copied().collect();
    format!("monologue_{}", picked.join("_"))
}

/// The pair of files a monologue is written to
pub struct Transcript {
    txt: File,
    ssml: File,
    txt_path: PathBuf,
    ssml_path: PathBuf,
}

impl Transcript {
    pub async fn create(dir: &Path, stem: &str) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let txt_path = dir.join(format!("{stem}.txt"));
        let ssml_path = dir.join(format!("{stem}.ssml"));
        let txt = File::create(&txt_path)
            .await
            .with_context(|| format!("failed to create {}", txt_path.display()))?;
        let ssml = File::create(&ssml_path)
            .await
            .with_context(|| format!("failed to create {}", ssml_path.display()))?;

        let mut transcript = Self {
            txt,
            ssml,
            txt_path,
            ssml_path,
        };
        transcript.write_ssml("<speak>\n").await?;
        Ok(transcript)
    }

    pub fn txt_path(&self) -> &Path {
        &self.txt_path
    }

    pub fn ssml_path(&self) -> &Path {
        &self.ssml_path
    }

    /// Append one utterance to both files
    pub async fn append(&mut self, utterance: &str) -> Result<()> {
        self.txt
            .write_all(format!("{utterance}\n").as_bytes())
            .await
            .context("failed to write transcript")?;
        self.txt.flush().await.context("failed to flush transcript")?;
        self.write_ssml(&format!("<s>{utterance}</s><break time=\"1s\" />\n"))
            .await
    }

    /// Close the SSML document
    pub async fn finish(mut self) -> Result<()> {
        self.write_ssml("</speak>\n").await
    }

    async fn write_ssml(&mut self, text: &str) -> Result<()> {
        self.ssml
            .write_all(text.as_bytes())
            .await
            .context("failed to write ssml")?;
        self.ssml.flush().await.context("failed to flush ssml")
    }
}

/// Generate until a shutdown signal arrives
pub async fn run(
    config: &Config,
    generator: &mut ProcessWorker,
    out_dir: &Path,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    let persona = &config.persona;
    let stem = output_stem(&mut rand::thread_rng());
    let mut transcript = Transcript::create(out_dir, &stem).await?;
    info!(
        txt = %transcript.txt_path().display(),
        ssml = %transcript.ssml_path().display(),
        "writing monologue"
    );

    let mut log = ConversationLog::seeded(&persona.monologue_seed);
    for utterance in log.turns() {
        transcript.append(utterance).await?;
    }

    let signal = shutdown.wait();
    tokio::pin!(signal);

    'generate: loop {
        let mut prompt = prompt::broadcast_prompt(
            &persona.monologue_prompt,
            log.turns(),
            persona.broadcast_turns,
            &persona.username,
        );
        let mut retried = false;

        let line = loop {
            generator
                .send(WorkerRequest::Generate {
                    prompt: prompt.clone(),
                })
                .context("failed to send prompt")?;

            let response = tokio::select! {
                _ = &mut signal => {
                    info!("shutdown signal received");
                    break 'generate;
                }
                response = generator.next_response() => response,
            };

            match response {
                Ok(raw) => break prompt::tidy_utterance(&raw),
                Err(WorkerError::PromptTooLong) if !retried => {
                    retried = true;
                    prompt =
                        prompt::truncate_prompt(&prompt, config.generator.prompt_budget_chars);
                    warn!(budget = config.generator.prompt_budget_chars, "prompt too long, retrying truncated");
                }
                Err(WorkerError::PromptTooLong) => bail!(
                    "generator rejected the prompt even when cut to {} characters",
                    config.generator.prompt_budget_chars
                ),
                Err(WorkerError::Disconnected) => bail!("generator exited"),
                Err(e) => {
                    warn!(error = %e, "generation failed, trying again");
                    continue 'generate;
                }
            }
        };

        info!(%line, "generated");
        transcript.append(&line).await?;
        log.push(line);
    }

    transcript.finish().await?;
    info!(utterances = log.len(), "monologue finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("radiobot-{name}-{}", std::process::id()))
    }

    #[test]
    fn test_output_stem_uses_two_animals() {
        let mut rng = StdRng::seed_from_u64(3);
        let stem = output_stem(&mut rng);
        let parts: Vec<&str> = stem.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "monologue");
        assert!(ANIMALS.contains(&parts[1]));
        assert!(ANIMALS.contains(&parts[2]));
        assert_ne!(parts[1], parts[2]);
    }

    #[tokio::test]
    async fn test_transcript_files() {
        let dir = scratch_dir("transcript");
        let mut transcript = Transcript::create(&dir, "monologue_fox_bat").await.unwrap();
        transcript.append("Good evening.").await.unwrap();
        transcript.append("Tonight, owls.").await.unwrap();
        let txt_path = transcript.txt_path().to_path_buf();
        let ssml_path = transcript.ssml_path().to_path_buf();
        transcript.finish().await.unwrap();

        let txt = std::fs::read_to_string(&txt_path).unwrap();
        assert_eq!(txt, "Good evening.\nTonight, owls.\n");

        let ssml = std::fs::read_to_string(&ssml_path).unwrap();
        assert_eq!(
            ssml,
            "<speak>\n\
             <s>Good evening.</s><break time=\"1s\" />\n\
             <s>Tonight, owls.</s><break time=\"1s\" />\n\
             </speak>\n"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_rejected_truncated_prompt_stops_generation() {
        // Answers every prompt with a prompt_too_long error (62-byte frames)
        let frame = r#"\076\000\000\000{"type":"error","code":"prompt_too_long","message":"too long"}"#;
        let script = format!("printf '{frame}{frame}'; sleep 5");
        let mut generator =
            ProcessWorker::spawn("stubborn", &["sh".to_string(), "-c".to_string(), script])
                .unwrap();

        let dir = scratch_dir("rejected");
        let err = run(&Config::default(), &mut generator, &dir, &ShutdownSignal::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("even when cut"));

        generator.shutdown().await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
