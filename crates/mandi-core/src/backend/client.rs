use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Serialize;

use super::error::{BackendError, BackendResult, classify_reqwest_error};
use super::sse::{Frame, FrameDecoder};
use crate::config::Config;

/// Standard User-Agent header for mandi API requests.
pub const USER_AGENT: &str = concat!("mandi/", env!("CARGO_PKG_VERSION"));

const CHAT_STREAM_PATH: &str = "/api/v1/chat/stream";

/// Boxed stream of decoded frames.
pub type FrameStream = BoxStream<'static, BackendResult<Frame>>;

#[derive(Debug, Serialize)]
struct ChatStreamRequest<'a> {
    message: &'a str,
    session_id: Option<&'a str>,
}

/// HTTP client for the shopping assistant backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    /// Creates a new client from config.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        // Connect timeout only. The stream itself has no deadline: callers
        // wanting one race the stream against a timer and cancel.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Opens the streaming chat endpoint and returns the decoded frame
    /// stream for one request.
    ///
    /// # Errors
    /// Returns a classified [`BackendError`] on connection failure or a
    /// non-success HTTP status, before any frame is read.
    pub async fn open_chat_stream(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> BackendResult<FrameStream> {
        let url = format!("{}{CHAT_STREAM_PATH}", self.base_url);
        let request = ChatStreamRequest {
            message,
            session_id,
        };

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .header("user-agent", USER_AGENT)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(BackendError::http_status(status.as_u16(), &error_body));
        }

        Ok(FrameDecoder::new(response.bytes_stream()).boxed())
    }
}
