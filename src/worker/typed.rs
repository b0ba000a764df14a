//! Keyboard stand-in for the speech-to-text worker
//!
//! In text mode the terminal feeds typed lines here; the next
//! start/stop pair returns the last line typed as its transcript.

use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{WorkerChannel, WorkerError, WorkerRequest};

/// Handle used by the input side to hand over typed text
#[derive(Debug, Clone, Default)]
pub struct TypedFeed {
    pending: Arc<Mutex<Option<String>>>,
}

impl TypedFeed {
    pub fn push(&self, text: impl Into<String>) {
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(text.into());
        }
    }

    fn take(&self) -> Option<String> {
        self.pending.lock().ok().and_then(|mut pending| pending.take())
    }
}

#[derive(Debug, Default)]
pub struct TypedTranscriber {
    feed: TypedFeed,
    recording: bool,
    ready: Option<String>,
}

impl TypedTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&self) -> TypedFeed {
        self.feed.clone()
    }
}

impl WorkerChannel for TypedTranscriber {
    fn name(&self) -> &str {
        "typed-stt"
    }

    fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        match request {
            WorkerRequest::StartRecording => self.recording = true,
            WorkerRequest::StopRecording if self.recording => {
                self.recording = false;
                let text = self.feed.take().unwrap_or_default();
                debug!(%text, "typed transcript");
                self.ready = Some(text);
            }
            WorkerRequest::StopRecording | WorkerRequest::Quit => {}
            WorkerRequest::Generate { .. } => {
                return Err(WorkerError::Failed(
                    "typed transcriber cannot generate".to_string(),
                ))
            }
        }
        Ok(())
    }

    fn poll(&mut self) -> bool {
        self.ready.is_some()
    }

    fn receive(&mut self) -> Result<String, WorkerError> {
        self.ready.take().ok_or(WorkerError::NotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_line_becomes_transcript() {
        let mut stt = TypedTranscriber::new();
        let feed = stt.feed();

        stt.send(WorkerRequest::StartRecording).unwrap();
        feed.push("what's on tonight?");
        assert!(!stt.poll());

        stt.send(WorkerRequest::StopRecording).unwrap();
        assert!(stt.poll());
        assert_eq!(stt.receive().unwrap(), "what's on tonight?");
        assert!(!stt.poll());
    }

    #[test]
    fn test_stop_without_start_yields_nothing() {
        let mut stt = TypedTranscriber::new();
        stt.send(WorkerRequest::StopRecording).unwrap();
        assert!(!stt.poll());
        assert!(matches!(stt.receive(), Err(WorkerError::NotReady)));
    }
}
