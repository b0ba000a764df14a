//! Background workers: speech-to-text and text generation
//!
//! The controller only depends on the polling contract in [`WorkerChannel`];
//! how a worker runs (child process, keyboard) stays behind it.

mod process;
mod protocol;
mod typed;

pub use process::ProcessWorker;
pub use protocol::WorkerRequest;
pub use typed::{TypedFeed, TypedTranscriber};

/// Request/response channel to one worker
///
/// `receive` must only be called after `poll` returned true.
pub trait WorkerChannel: Send {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Hand a request to the worker without waiting for it
    fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError>;

    /// Whether a response is waiting
    fn poll(&mut self) -> bool;

    /// Take the waiting response
    fn receive(&mut self) -> Result<String, WorkerError>;

    /// The worker has gone away for good and will never answer again
    fn is_closed(&self) -> bool {
        false
    }
}

/// Errors that can occur talking to a worker
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker rejected the prompt as too long")]
    PromptTooLong,

    #[error("worker failed: {0}")]
    Failed(String),

    #[error("malformed worker message: {0}")]
    Malformed(String),

    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    #[error("worker is not running")]
    Disconnected,

    #[error("no response is waiting")]
    NotReady,

    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    #[error("worker I/O error: {0}")]
    Io(#[from] std::io::Error),
}
