//! Stream consumption core: event parsing, dispatch, transcript state.

pub mod controller;
pub mod dispatch;
pub mod events;
pub mod transcript;

pub use controller::{ChatController, ChatUpdate, SignalReceiver, StreamSignal};
pub use dispatch::{dispatch, EventSink, StreamOutcome};
pub use events::{parse_frame, CartItem, CartTotals, ChatEvent, ParsedFrame, Product};
pub use transcript::{Entry, EntryBody, EntryId, EntryKind, RequestId, Transcript, TranscriptMutation};
