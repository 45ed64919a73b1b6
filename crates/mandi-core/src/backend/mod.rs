//! Backend transport: HTTP client, frame decoding, error classification.

pub mod client;
pub mod error;
pub mod sse;

pub use client::{BackendClient, FrameStream, USER_AGENT};
pub use error::{BackendError, BackendErrorKind, BackendResult};
pub use sse::{Frame, FrameDecoder};
