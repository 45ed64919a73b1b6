//! Typed events parsed from assistant stream frames.
//!
//! Each data frame carries a JSON object with a `type` discriminator plus
//! kind-specific fields. Events are handed to exactly one handler and then
//! discarded; only their transcript effects persist.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{BackendError, BackendResult};

/// A parsed unit of assistant output.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Transient status line while the assistant works.
    Thinking { message: String },
    /// A backend tool has started executing.
    ToolStart {
        tool_name: String,
        status: Option<String>,
    },
    /// A backend tool has finished executing.
    ToolComplete { tool_name: String },
    /// Partial conversational text emitted mid-request.
    ConversationChunk {
        message: String,
        stage: Option<String>,
    },
    /// Terminal payload: final response text, optionally with structured
    /// data and a context type driving transcript expansion.
    FinalResponse {
        content: String,
        payload: Option<Value>,
        context_type: Option<String>,
    },
    /// Raw product results from a search tool.
    RawProducts { products: Vec<Product> },
    /// Raw cart state from a cart tool.
    RawCart {
        items: Vec<CartItem>,
        summary: CartTotals,
    },
    /// Confirmation of a completed backend action, outside the final
    /// response text.
    Success { message: String },
    /// In-band error record from the backend. Does not terminate the stream.
    ServerError {
        message: String,
        retry_suggestion: Option<String>,
    },
    /// In-band end-of-stream marker. No events follow it.
    Done,
}

/// One product in a raw search result. The backend attaches many more
/// marketplace fields; only the ones the transcript renders are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub provider: Option<String>,
}

/// One line item in a raw cart snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub price: Option<f64>,
}

/// Cart aggregates surfaced to the presentation layer outside the transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartTotals {
    #[serde(default)]
    pub total_items: u64,
    #[serde(default, alias = "total_amount")]
    pub total_value: f64,
}

// === Wire payload structures ===

#[derive(Debug, Deserialize)]
struct WireThinking {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireToolStart {
    tool_name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireToolComplete {
    tool_name: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    message: String,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireToolResult {
    data: Value,
    #[serde(default)]
    context_type: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireProducts {
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRawCart {
    #[serde(default, alias = "cart_items")]
    items: Vec<CartItem>,
    #[serde(default, alias = "cart_summary")]
    summary: CartTotals,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCartUpdate {
    #[serde(flatten)]
    summary: CartTotals,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSuccess {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireServerError {
    message: String,
    #[serde(default)]
    retry_suggestion: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

/// A parsed frame: the event plus the session id the backend echoed, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    pub event: ChatEvent,
    pub session_id: Option<String>,
}

impl ParsedFrame {
    fn new(event: ChatEvent, session_id: Option<String>) -> Self {
        Self { event, session_id }
    }
}

/// Parses a single frame payload into a typed event.
///
/// Returns `Ok(None)` for records with an unrecognized `type` value, which
/// the dispatcher ignores.
///
/// # Errors
/// Returns a parse error for payloads that are not valid JSON objects or
/// whose fields do not match the advertised kind.
pub fn parse_frame(payload: &str) -> BackendResult<Option<ParsedFrame>> {
    let record: Value = serde_json::from_str(payload)
        .map_err(|err| BackendError::parse(format!("Malformed frame: {err}")))?;
    let kind = record
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::parse("Frame has no type field"))?;

    let parsed = match kind {
        "thinking" => {
            let w: WireThinking = from_record(&record, kind)?;
            Some(ParsedFrame::new(
                ChatEvent::Thinking { message: w.message },
                w.session_id,
            ))
        }
        "tool_start" => {
            let w: WireToolStart = from_record(&record, kind)?;
            Some(ParsedFrame::new(
                ChatEvent::ToolStart {
                    tool_name: w.tool_name,
                    status: w.status,
                },
                w.session_id,
            ))
        }
        "tool_complete" => {
            let w: WireToolComplete = from_record(&record, kind)?;
            Some(ParsedFrame::new(
                ChatEvent::ToolComplete {
                    tool_name: w.tool_name,
                },
                w.session_id,
            ))
        }
        "conversation_chunk" => {
            let w: WireChunk = from_record(&record, kind)?;
            Some(ParsedFrame::new(
                ChatEvent::ConversationChunk {
                    message: w.message,
                    stage: w.stage,
                },
                w.session_id,
            ))
        }
        "response" => {
            let w: WireResponse = from_record(&record, kind)?;
            Some(ParsedFrame::new(
                ChatEvent::FinalResponse {
                    content: w.content,
                    payload: None,
                    context_type: None,
                },
                w.session_id,
            ))
        }
        "tool_result" => {
            let w: WireToolResult = from_record(&record, kind)?;
            Some(ParsedFrame::new(
                ChatEvent::FinalResponse {
                    content: String::new(),
                    payload: Some(w.data),
                    context_type: w.context_type,
                },
                w.session_id,
            ))
        }
        "raw_products" | "products" => {
            let w: WireProducts = from_record(&record, kind)?;
            Some(ParsedFrame::new(
                ChatEvent::RawProducts {
                    products: w.products,
                },
                w.session_id,
            ))
        }
        "raw_cart" => {
            let w: WireRawCart = from_record(&record, kind)?;
            Some(ParsedFrame::new(
                ChatEvent::RawCart {
                    items: w.items,
                    summary: w.summary,
                },
                w.session_id,
            ))
        }
        "cart_update" => {
            let w: WireCartUpdate = from_record(&record, kind)?;
            Some(ParsedFrame::new(
                ChatEvent::RawCart {
                    items: Vec::new(),
                    summary: w.summary,
                },
                w.session_id,
            ))
        }
        "success" => {
            let w: WireSuccess = from_record(&record, kind)?;
            Some(ParsedFrame::new(
                ChatEvent::Success { message: w.message },
                w.session_id,
            ))
        }
        "error" => {
            let w: WireServerError = from_record(&record, kind)?;
            Some(ParsedFrame::new(
                ChatEvent::ServerError {
                    message: w.message,
                    retry_suggestion: w.retry_suggestion,
                },
                w.session_id,
            ))
        }
        "done" => Some(ParsedFrame::new(ChatEvent::Done, None)),
        _ => None,
    };

    Ok(parsed)
}

fn from_record<T: serde::de::DeserializeOwned>(record: &Value, kind: &str) -> BackendResult<T> {
    serde_json::from_value(record.clone())
        .map_err(|err| BackendError::parse(format!("Failed to parse {kind} frame: {err}")))
}
