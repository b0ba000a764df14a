//! Worker running as a child process
//!
//! Frames are pumped by two tokio tasks so the controller never blocks on
//! the pipe: requests go out through an unbounded channel, responses come
//! back through another and wait in a one-slot buffer until received.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::protocol::{read_frame, write_frame, WorkerRequest, WorkerResponse};
use super::{WorkerChannel, WorkerError};

pub struct ProcessWorker {
    name: String,
    child: Child,
    request_tx: mpsc::UnboundedSender<WorkerRequest>,
    response_rx: mpsc::UnboundedReceiver<Result<WorkerResponse, WorkerError>>,
    ready: Option<Result<WorkerResponse, WorkerError>>,
    /// Set once the end of the worker's output has been seen
    closed: bool,
}

impl ProcessWorker {
    /// Spawn `command` and start pumping frames
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(name: &str, command: &[String]) -> Result<Self, WorkerError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| WorkerError::Spawn(format!("{name}: empty command")))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::Spawn(format!("{name}: {program}: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Spawn(format!("{name}: stdin not captured")))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Spawn(format!("{name}: stdout not captured")))?;

        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<WorkerRequest>();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let writer_name = name.to_string();
        tokio::spawn(async move {
            while let Some(request) = request_rx.recv().await {
                debug!(worker = %writer_name, ?request, "sending request");
                if let Err(e) = write_frame(&mut stdin, &request).await {
                    warn!(worker = %writer_name, ?e, "failed to write request");
                    break;
                }
            }
            debug!(worker = %writer_name, "request pump stopped");
        });

        let reader_name = name.to_string();
        tokio::spawn(async move {
            loop {
                match read_frame::<_, WorkerResponse>(&mut stdout).await {
                    Ok(Some(response)) => {
                        debug!(worker = %reader_name, ?response, "response received");
                        if response_tx.send(Ok(response)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!(worker = %reader_name, "worker closed its output");
                        let _ = response_tx.send(Err(WorkerError::Disconnected));
                        break;
                    }
                    Err(e) => {
                        warn!(worker = %reader_name, ?e, "failed to read response");
                        let fatal = matches!(e, WorkerError::Io(_) | WorkerError::FrameTooLarge(_));
                        if response_tx.send(Err(e)).is_err() || fatal {
                            break;
                        }
                    }
                }
            }
        });

        info!(worker = name, program = %program, "worker started");

        Ok(Self {
            name: name.to_string(),
            child,
            request_tx,
            response_rx,
            ready: None,
            closed: false,
        })
    }

    /// Wait for the next response, for callers that may block
    pub async fn next_response(&mut self) -> Result<String, WorkerError> {
        if let Some(ready) = self.ready.take() {
            return ready.and_then(WorkerResponse::into_text);
        }
        match self.response_rx.recv().await {
            Some(result) => result.and_then(WorkerResponse::into_text),
            None => Err(WorkerError::Disconnected),
        }
    }

    /// Ask the worker to quit and wait for it to exit
    pub async fn shutdown(mut self) {
        let _ = self.request_tx.send(WorkerRequest::Quit);
        let wait = tokio::time::timeout(std::time::Duration::from_secs(2), self.child.wait());
        match wait.await {
            Ok(Ok(status)) => info!(worker = %self.name, %status, "worker exited"),
            Ok(Err(e)) => warn!(worker = %self.name, ?e, "failed to wait for worker"),
            Err(_) => {
                warn!(worker = %self.name, "worker did not exit, killing it");
                let _ = self.child.kill().await;
            }
        }
    }
}

impl WorkerChannel for ProcessWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        self.request_tx
            .send(request)
            .map_err(|_| WorkerError::Disconnected)
    }

    fn poll(&mut self) -> bool {
        if self.ready.is_none() && !self.closed {
            match self.response_rx.try_recv() {
                Ok(result) => {
                    self.closed = matches!(result, Err(WorkerError::Disconnected));
                    self.ready = Some(result);
                }
                Err(mpsc::error::TryRecvError::Empty) => {}
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.closed = true;
                    self.ready = Some(Err(WorkerError::Disconnected));
                }
            }
        }
        self.ready.is_some()
    }

    fn receive(&mut self) -> Result<String, WorkerError> {
        match self.ready.take() {
            Some(result) => result.and_then(WorkerResponse::into_text),
            None => Err(WorkerError::NotReady),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    async fn wait_ready(worker: &mut ProcessWorker) {
        for _ in 0..500 {
            if worker.poll() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("worker never answered");
    }

    #[tokio::test]
    async fn test_framed_reply_then_disconnect() {
        // One utterance frame (32 bytes of JSON), then end of output
        let mut worker = ProcessWorker::spawn(
            "echo",
            &sh(r#"printf '\040\000\000\000{"type":"utterance","text":"hi"}'"#),
        )
        .unwrap();

        wait_ready(&mut worker).await;
        assert_eq!(worker.receive().unwrap(), "hi");
        assert!(!worker.is_closed());

        wait_ready(&mut worker).await;
        assert!(matches!(worker.receive(), Err(WorkerError::Disconnected)));
        assert!(worker.is_closed());

        // A closed worker stays quiet instead of repeating the disconnect
        assert!(!worker.poll());
        assert!(matches!(worker.receive(), Err(WorkerError::NotReady)));
    }

    #[tokio::test]
    async fn test_worker_that_exits_immediately() {
        let mut worker = ProcessWorker::spawn("quitter", &sh("exit 0")).unwrap();
        wait_ready(&mut worker).await;
        assert!(matches!(worker.receive(), Err(WorkerError::Disconnected)));
        assert!(worker.is_closed());
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let result = ProcessWorker::spawn("ghost", &["/nonexistent/radiobot-llm".to_string()]);
        assert!(matches!(result, Err(WorkerError::Spawn(_))));
        assert!(matches!(
            ProcessWorker::spawn("empty", &[]),
            Err(WorkerError::Spawn(_))
        ));
    }
}
