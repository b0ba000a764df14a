//! Worker message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::WorkerError;

/// Largest frame accepted from or sent to a worker
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Error code a generator uses when a prompt exceeds its input budget
pub const PROMPT_TOO_LONG: &str = "prompt_too_long";

/// Requests from the controller to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Speech-to-text: begin capturing audio
    StartRecording,

    /// Speech-to-text: stop capturing and transcribe
    StopRecording,

    /// Generation: produce the next utterance for a prompt
    Generate { prompt: String },

    /// Either worker: exit cleanly
    Quit,
}

/// Responses from a worker to the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    /// Speech-to-text result
    Transcript { text: String },

    /// Generation result
    Utterance { text: String },

    /// The request could not be served
    Error { code: String, message: String },
}

impl WorkerResponse {
    /// Collapse a response into the text it carries
    pub fn into_text(self) -> Result<String, WorkerError> {
        match self {
            WorkerResponse::Transcript { text } | WorkerResponse::Utterance { text } => Ok(text),
            WorkerResponse::Error { code, .. } if code == PROMPT_TOO_LONG => {
                Err(WorkerError::PromptTooLong)
            }
            WorkerResponse::Error { code, message } => {
                Err(WorkerError::Failed(format!("{code}: {message}")))
            }
        }
    }
}

/// Write one length-prefixed JSON frame
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), WorkerError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes =
        serde_json::to_vec(msg).map_err(|e| WorkerError::Malformed(e.to_string()))?;
    if msg_bytes.len() > MAX_FRAME_LEN {
        return Err(WorkerError::FrameTooLarge(msg_bytes.len()));
    }
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}

/// Read one length-prefixed JSON frame; `None` on a clean end of stream
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, WorkerError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WorkerError::FrameTooLarge(len));
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;

    serde_json::from_slice(&msg_buf)
        .map(Some)
        .map_err(|e| WorkerError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> Vec<u8> {
        let mut bytes = (json.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(json.as_bytes());
        bytes
    }

    #[test]
    fn test_request_serialization() {
        let req = WorkerRequest::Generate {
            prompt: "I: ".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""type":"generate""#));
        assert!(json.contains("I: "));
    }

    #[test]
    fn test_error_response_maps_prompt_too_long() {
        let resp = WorkerResponse::Error {
            code: PROMPT_TOO_LONG.to_string(),
            message: "4096 tokens".to_string(),
        };
        assert!(matches!(resp.into_text(), Err(WorkerError::PromptTooLong)));
    }

    #[tokio::test]
    async fn test_read_frame() {
        let bytes = frame(r#"{"type":"transcript","text":"hello"}"#);
        let mut mock = tokio_test::io::Builder::new().read(&bytes).build();

        let resp: Option<WorkerResponse> = read_frame(&mut mock).await.unwrap();
        assert_eq!(
            resp,
            Some(WorkerResponse::Transcript {
                text: "hello".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_read_frame_eof() {
        let mut mock = tokio_test::io::Builder::new().build();
        let resp: Option<WorkerResponse> = read_frame(&mut mock).await.unwrap();
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized() {
        let len = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes();
        let mut mock = tokio_test::io::Builder::new().read(&len).build();
        let err = read_frame::<_, WorkerResponse>(&mut mock).await.unwrap_err();
        assert!(matches!(err, WorkerError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn test_read_frame_malformed() {
        let bytes = frame(r#"{"type":"nonsense"}"#);
        let mut mock = tokio_test::io::Builder::new().read(&bytes).build();
        let err = read_frame::<_, WorkerResponse>(&mut mock).await.unwrap_err();
        assert!(matches!(err, WorkerError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let json = r#"{"type":"stop_recording"}"#;
        let mut mock = tokio_test::io::Builder::new()
            .write(&(json.len() as u32).to_le_bytes())
            .write(json.as_bytes())
            .build();
        write_frame(&mut mock, &WorkerRequest::StopRecording)
            .await
            .unwrap();
    }
}
