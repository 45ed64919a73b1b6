//! Frame dispatch loop.
//!
//! Pulls decoded frames off the wire, parses them into typed events, and
//! forwards them to a sink. Exactly one terminal callback fires per run:
//! `on_complete` or `on_error`, never both, and neither after cancellation.

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, Frame, FrameStream};
use crate::core::events::{parse_frame, ChatEvent};

/// Receives parsed events and the terminal outcome of a stream run.
pub trait EventSink {
    fn on_event(&mut self, event: ChatEvent, session_id: Option<String>);
    fn on_complete(&mut self);
    fn on_error(&mut self, error: BackendError);
}

/// How a dispatch run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The stream ran to its end-of-stream marker or natural EOF.
    Completed,
    /// The caller cancelled; no terminal callback was delivered.
    Cancelled,
    /// Transport or decode failure; `on_error` was delivered.
    Failed,
}

/// Drives a frame stream to completion, cancellation, or failure.
///
/// Cancellation is observed between frames only. A frame already received
/// is fully processed before the token is checked again.
pub async fn dispatch<S: EventSink>(
    mut frames: FrameStream,
    sink: &mut S,
    cancel: &CancellationToken,
) -> StreamOutcome {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("chat stream cancelled");
                return StreamOutcome::Cancelled;
            }
            next = frames.next() => next,
        };

        match next {
            Some(Ok(Frame::Data(payload))) => match parse_frame(&payload) {
                Ok(Some(parsed)) => match parsed.event {
                    ChatEvent::Done => {
                        sink.on_complete();
                        return StreamOutcome::Completed;
                    }
                    event => sink.on_event(event, parsed.session_id),
                },
                Ok(None) => {
                    tracing::debug!(payload = %payload, "ignoring unknown frame kind");
                }
                Err(err) => {
                    tracing::debug!(error = %err, "skipping malformed frame");
                }
            },
            Some(Ok(Frame::EndOfStream)) => {
                sink.on_complete();
                return StreamOutcome::Completed;
            }
            Some(Err(err)) => {
                sink.on_error(err);
                return StreamOutcome::Failed;
            }
            // Natural EOF without a sentinel still counts as completion.
            None => {
                sink.on_complete();
                return StreamOutcome::Completed;
            }
        }
    }
}
