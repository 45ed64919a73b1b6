//! Line-delimited SSE frame decoder.
//!
//! The assistant backend emits one record per newline-terminated line
//! (`data: {...}\n`), not blank-line-delimited SSE event blocks, so the
//! decoder buffers raw bytes and splits on line boundaries itself.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::Stream;

use super::error::{BackendError, BackendResult};

/// Literal payload that terminates the stream regardless of content.
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded record from the raw byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A data record with the `data:` field prefix stripped.
    Data(String),
    /// The `[DONE]` sentinel. Nothing follows it.
    EndOfStream,
}

/// Decodes a chunked byte stream into [`Frame`]s.
///
/// Bytes are buffered until a line terminator arrives; a trailing partial
/// line stays in the buffer rather than being emitted. Blank lines and
/// `:`-prefixed comment (keep-alive) lines are discarded. Multi-byte UTF-8
/// sequences split across chunk boundaries are safe because only complete
/// lines are ever decoded.
pub struct FrameDecoder<S> {
    inner: S,
    buf: Vec<u8>,
    pending: VecDeque<Frame>,
    finished: bool,
}

impl<S> FrameDecoder<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buf: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Drains complete lines out of the byte buffer into pending frames.
    fn drain_lines(&mut self) {
        while !self.finished {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                return;
            };
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(frame) = decode_line(&line) {
                if frame == Frame::EndOfStream {
                    self.finished = true;
                }
                self.pending.push_back(frame);
            }
        }
    }
}

/// Classifies one complete line, returning `None` for lines that are not
/// data records (blank lines, comments).
fn decode_line(line: &[u8]) -> Option<Frame> {
    let text = String::from_utf8_lossy(line);
    if text.is_empty() || text.starts_with(':') {
        return None;
    }
    let payload = match text.strip_prefix("data:") {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => &text,
    };
    if payload == DONE_SENTINEL {
        return Some(Frame::EndOfStream);
    }
    Some(Frame::Data(payload.to_string()))
}

impl<S, E> Stream for FrameDecoder<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = BackendResult<Frame>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.buf.extend_from_slice(&chunk);
                    self.drain_lines();
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(BackendError::network(format!(
                        "Stream error: {e}"
                    )))));
                }
                Poll::Ready(None) => {
                    // A trailing partial line has no terminator; drop it.
                    self.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    /// Helper to create a mock byte stream from a string
    fn mock_byte_stream(
        data: &str,
        chunk_size: usize,
    ) -> impl Stream<Item = std::result::Result<bytes::Bytes, std::io::Error>> {
        let chunks: Vec<_> = data
            .as_bytes()
            .chunks(chunk_size)
            .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
            .collect();
        futures_util::stream::iter(chunks)
    }

    async fn collect_frames(data: &str, chunk_size: usize) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new(mock_byte_stream(data, chunk_size));
        let mut frames = Vec::new();
        while let Some(result) = decoder.next().await {
            frames.push(result.expect("Expected valid frame"));
        }
        frames
    }

    #[tokio::test]
    async fn test_decoder_strips_data_prefix_and_skips_blanks() {
        let data = "data: {\"type\":\"thinking\"}\n\ndata: {\"type\":\"response\"}\n\n";
        let frames = collect_frames(data, 50).await;
        assert_eq!(
            frames,
            vec![
                Frame::Data("{\"type\":\"thinking\"}".to_string()),
                Frame::Data("{\"type\":\"response\"}".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_decoder_discards_comment_lines() {
        let data = ": keep-alive\ndata: {\"type\":\"thinking\"}\n: another comment\n";
        let frames = collect_frames(data, 50).await;
        assert_eq!(
            frames,
            vec![Frame::Data("{\"type\":\"thinking\"}".to_string())]
        );
    }

    #[tokio::test]
    async fn test_decoder_surfaces_done_sentinel_and_stops() {
        let data = "data: {\"type\":\"thinking\"}\ndata: [DONE]\ndata: {\"type\":\"late\"}\n";
        let frames = collect_frames(data, 50).await;
        // Nothing after the sentinel is yielded.
        assert_eq!(
            frames,
            vec![
                Frame::Data("{\"type\":\"thinking\"}".to_string()),
                Frame::EndOfStream,
            ]
        );
    }

    #[tokio::test]
    async fn test_decoder_accepts_unprefixed_sentinel() {
        let frames = collect_frames("[DONE]\n", 50).await;
        assert_eq!(frames, vec![Frame::EndOfStream]);
    }

    #[tokio::test]
    async fn test_decoder_handles_crlf_line_endings() {
        let data = "data: {\"a\":1}\r\ndata: [DONE]\r\n";
        let frames = collect_frames(data, 50).await;
        assert_eq!(
            frames,
            vec![Frame::Data("{\"a\":1}".to_string()), Frame::EndOfStream]
        );
    }

    #[tokio::test]
    async fn test_decoder_handles_lines_split_across_chunks() {
        // Very small chunks split records mid-line.
        let data = "data: {\"type\":\"conversation_chunk\",\"message\":\"hello\"}\ndata: [DONE]\n";
        let frames = collect_frames(data, 7).await;
        assert_eq!(
            frames,
            vec![
                Frame::Data("{\"type\":\"conversation_chunk\",\"message\":\"hello\"}".to_string()),
                Frame::EndOfStream,
            ]
        );
    }

    #[tokio::test]
    async fn test_decoder_handles_utf8_split_across_chunks() {
        // ₹ = E2 82 B9 (3 bytes); split inside it and verify the rupee sign
        // survives because only complete lines are decoded.
        let data = "data: {\"message\":\"Total ₹450\"}\n";
        let bytes = data.as_bytes();
        let rupee_start = bytes
            .windows(3)
            .position(|w| w == [0xE2, 0x82, 0xB9])
            .expect("rupee sign not found");
        let split_point = rupee_start + 1;

        let chunks: Vec<std::result::Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::copy_from_slice(&bytes[..split_point])),
            Ok(bytes::Bytes::copy_from_slice(&bytes[split_point..])),
        ];
        let mut decoder = FrameDecoder::new(futures_util::stream::iter(chunks));

        let frame = decoder
            .next()
            .await
            .unwrap()
            .expect("should decode valid frame");
        assert_eq!(frame, Frame::Data("{\"message\":\"Total ₹450\"}".to_string()));
    }

    #[tokio::test]
    async fn test_decoder_retains_trailing_partial_line() {
        // No terminator on the second record: it is never emitted.
        let data = "data: {\"a\":1}\ndata: {\"trunc";
        let frames = collect_frames(data, 50).await;
        assert_eq!(frames, vec![Frame::Data("{\"a\":1}".to_string())]);
    }

    #[tokio::test]
    async fn test_decoder_terminates_on_stream_error() {
        let chunks: Vec<std::result::Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from_static(b"data: {\"a\":1}\n")),
            Err(std::io::Error::other("connection reset")),
        ];
        let mut decoder = FrameDecoder::new(futures_util::stream::iter(chunks));

        assert_eq!(
            decoder.next().await.unwrap().unwrap(),
            Frame::Data("{\"a\":1}".to_string())
        );
        assert!(decoder.next().await.unwrap().is_err());
        assert!(decoder.next().await.is_none());
    }
}
