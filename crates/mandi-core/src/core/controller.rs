//! Chat session controller.
//!
//! Single owner of the transcript. Stream tasks run on their own tokio task
//! and report back over an unbounded channel; the controller is the only
//! place that mutates transcript state, and it drops signals from requests
//! that are no longer active.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendClient, BackendError};
use crate::config::Config;
use crate::core::dispatch::{dispatch, EventSink};
use crate::core::events::ChatEvent;
use crate::core::transcript::{RequestId, Transcript, TranscriptMutation};

/// A message from a running stream task to the controller.
#[derive(Debug)]
pub enum StreamSignal {
    Event {
        request: RequestId,
        event: ChatEvent,
        session_id: Option<String>,
    },
    Completed {
        request: RequestId,
    },
    Failed {
        request: RequestId,
        error: BackendError,
    },
}

/// An observable consequence of controller input, in application order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    Transcript(TranscriptMutation),
    /// The active request reached a terminal state.
    RequestFinished { request: RequestId },
}

pub type SignalReceiver = mpsc::UnboundedReceiver<StreamSignal>;

/// Lifecycle of the at-most-one in-flight request.
#[derive(Debug, Default)]
struct ActiveRequest {
    active: Option<RequestId>,
    cancel: Option<CancellationToken>,
}

impl ActiveRequest {
    fn start(&mut self, id: RequestId, cancel: CancellationToken) {
        self.active = Some(id);
        self.cancel = Some(cancel);
    }

    fn finish_if_active(&mut self, id: RequestId) -> bool {
        let ok = self.active == Some(id);
        if ok {
            self.active = None;
            self.cancel = None;
        }
        ok
    }

    /// Cancels the in-flight request, if any, and returns its id.
    fn abort(&mut self) -> Option<RequestId> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.active.take()
    }
}

/// Forwards dispatch callbacks onto the controller channel.
struct ChannelSink {
    request: RequestId,
    tx: mpsc::UnboundedSender<StreamSignal>,
}

impl EventSink for ChannelSink {
    fn on_event(&mut self, event: ChatEvent, session_id: Option<String>) {
        let _ = self.tx.send(StreamSignal::Event {
            request: self.request,
            event,
            session_id,
        });
    }

    fn on_complete(&mut self) {
        let _ = self.tx.send(StreamSignal::Completed {
            request: self.request,
        });
    }

    fn on_error(&mut self, error: BackendError) {
        let _ = self.tx.send(StreamSignal::Failed {
            request: self.request,
            error,
        });
    }
}

pub struct ChatController {
    client: BackendClient,
    transcript: Transcript,
    session_id: Option<String>,
    device_tag: Option<String>,
    active: ActiveRequest,
    tx: mpsc::UnboundedSender<StreamSignal>,
}

impl ChatController {
    /// Builds a controller and the receiver the caller drives `handle` with.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config, device_id: Option<&str>) -> anyhow::Result<(Self, SignalReceiver)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            client: BackendClient::new(config)?,
            transcript: Transcript::new(),
            session_id: config.session_id.clone(),
            device_tag: device_id.map(|id| format!("[Device: {id}] ")),
            active: ActiveRequest::default(),
            tx,
        };
        Ok((controller, rx))
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.active.active.is_some()
    }

    /// Sends a user message, superseding any request still in flight.
    pub fn send_message(&mut self, text: &str) -> Vec<ChatUpdate> {
        let mut updates = self.cancel_active();
        let request = RequestId::new();
        updates.push(ChatUpdate::Transcript(
            self.transcript.push_user(request, text),
        ));
        self.spawn_request(request, text);
        updates
    }

    /// Sends a message that never appears in the transcript. Used for
    /// session bootstrap traffic.
    pub fn send_message_hidden(&mut self, text: &str) -> Vec<ChatUpdate> {
        let updates = self.cancel_active();
        let request = RequestId::new();
        self.spawn_request(request, text);
        updates
    }

    /// Cancels the in-flight request. Silent: transients are swept and no
    /// error entry is recorded.
    pub fn cancel(&mut self) -> Vec<ChatUpdate> {
        self.cancel_active()
    }

    fn cancel_active(&mut self) -> Vec<ChatUpdate> {
        match self.active.abort() {
            Some(request) => self
                .transcript
                .sweep(request)
                .into_iter()
                .map(ChatUpdate::Transcript)
                .collect(),
            None => Vec::new(),
        }
    }

    fn spawn_request(&mut self, request: RequestId, text: &str) {
        // The backend tags a session to a device on first contact.
        let message = match self.device_tag.take() {
            Some(tag) => format!("{tag}{text}"),
            None => text.to_string(),
        };
        let cancel = CancellationToken::new();
        self.active.start(request, cancel.clone());

        let client = self.client.clone();
        let session_id = self.session_id.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut sink = ChannelSink { request, tx };
            match client.open_chat_stream(&message, session_id.as_deref()).await {
                Ok(frames) => {
                    dispatch(frames, &mut sink, &cancel).await;
                }
                Err(error) => sink.on_error(error),
            }
        });
    }

    /// Applies one signal from a stream task. Signals from requests other
    /// than the active one are dropped.
    pub fn handle(&mut self, signal: StreamSignal) -> Vec<ChatUpdate> {
        match signal {
            StreamSignal::Event {
                request,
                event,
                session_id,
            } => {
                if self.active.active != Some(request) {
                    tracing::debug!(%request, "dropping event from superseded request");
                    return Vec::new();
                }
                if self.session_id.is_none() {
                    self.session_id = session_id;
                }
                self.transcript
                    .apply(request, event)
                    .into_iter()
                    .map(ChatUpdate::Transcript)
                    .collect()
            }
            StreamSignal::Completed { request } => {
                if !self.active.finish_if_active(request) {
                    return Vec::new();
                }
                let mut updates: Vec<ChatUpdate> = self
                    .transcript
                    .sweep(request)
                    .into_iter()
                    .map(ChatUpdate::Transcript)
                    .collect();
                updates.push(ChatUpdate::RequestFinished { request });
                updates
            }
            StreamSignal::Failed { request, error } => {
                if !self.active.finish_if_active(request) {
                    return Vec::new();
                }
                tracing::warn!(%request, %error, "chat stream failed");
                let mut updates: Vec<ChatUpdate> = self
                    .transcript
                    .record_failure(request, &error)
                    .into_iter()
                    .map(ChatUpdate::Transcript)
                    .collect();
                updates.push(ChatUpdate::RequestFinished { request });
                updates
            }
        }
    }
}
