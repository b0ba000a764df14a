//! Terminal input source
//!
//! Reads stdin lines on a dedicated thread and forwards edges to the main
//! loop through a channel, which drains them without blocking.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::keys::{parse_line, InputEdge, TalkControl};

pub struct TerminalInput {
    edge_rx: mpsc::Receiver<InputEdge>,
    running: Arc<AtomicBool>,
}

impl TerminalInput {
    /// Start reading the terminal
    pub fn start() -> Result<Self, InputError> {
        let (edge_tx, edge_rx) = mpsc::channel(32);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        thread::Builder::new()
            .name("terminal-input".to_string())
            .spawn(move || {
                info!("terminal input thread started");
                read_lines(std::io::stdin().lock(), edge_tx, &thread_running);
                thread_running.store(false, Ordering::SeqCst);
                info!("terminal input thread stopped");
            })
            .map_err(|e| InputError::ThreadSpawn(e.to_string()))?;

        Ok(Self { edge_rx, running })
    }

    /// Next pending edge, if any
    pub fn try_next(&mut self) -> Option<InputEdge> {
        self.edge_rx.try_recv().ok()
    }

    /// Stop forwarding edges; the thread exits after its current read
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Errors that can occur in the input source
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to spawn input thread: {0}")]
    ThreadSpawn(String),
}

fn read_lines<R: BufRead>(reader: R, edge_tx: mpsc::Sender<InputEdge>, running: &AtomicBool) {
    let mut talk = TalkControl::default();

    for line in reader.lines() {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(?e, "failed to read terminal input");
                break;
            }
        };

        let edge = parse_line(&line, &mut talk);
        debug!(?edge, "input edge");
        if edge_tx.blocking_send(edge).is_err() {
            warn!("failed to send input edge - channel closed?");
            return;
        }
    }

    // End of input behaves like quit
    let _ = edge_tx.blocking_send(InputEdge::Quit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_become_edges() {
        let (tx, mut rx) = mpsc::channel(8);
        let running = AtomicBool::new(true);
        read_lines("\nhello\n\nr\n".as_bytes(), tx, &running);

        let edges: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            edges,
            vec![
                InputEdge::TalkPressed,
                InputEdge::Typed("hello".to_string()),
                InputEdge::TalkReleased,
                InputEdge::ModeSwitchReleased,
                InputEdge::Quit,
            ]
        );
    }
}
