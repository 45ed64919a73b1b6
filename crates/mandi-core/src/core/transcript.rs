//! Append-only chat transcript with per-request reconciliation.
//!
//! Entries fall into three classes. Transient entries (thinking, tool
//! execution, conversation chunks) are replaced in place within their
//! originating request and swept when that request ends. Latest-wins entries
//! (product lists, cart views) keep a single live instance per request;
//! entries of the same kind owned by settled prior requests persist in
//! history. Everything else is pure append and survives forever.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::backend::BackendError;
use crate::core::events::{CartItem, CartTotals, ChatEvent, Product};

/// Identity of one request/response exchange. Minted locally when a message
/// is sent; every entry produced by that stream carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable identity of a transcript entry, for in-place replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

/// Reconciliation class of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    BotText,
    Thinking,
    ToolExecuting,
    ConversationChunk,
    ProductList,
    CartView,
    CheckoutStage,
    OrderConfirmation,
    PaymentInitiated,
    Success,
    Error,
}

impl EntryKind {
    /// Transient entries are replaced within their request and removed when
    /// the request reaches any terminal state.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Thinking | Self::ToolExecuting | Self::ConversationChunk
        )
    }

    /// Latest-wins entries keep exactly one live instance per request.
    pub fn is_latest_wins(self) -> bool {
        matches!(self, Self::ProductList | Self::CartView)
    }
}

/// Payload of a transcript entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryBody {
    User { text: String },
    BotText { text: String },
    Thinking { message: String },
    ToolExecuting { tool_name: String, status: Option<String> },
    ConversationChunk { message: String },
    ProductList { products: Vec<Product> },
    CartView { items: Vec<CartItem>, summary: CartTotals },
    CheckoutStage { details: Value },
    OrderConfirmation { details: Value },
    PaymentInitiated { message: String },
    Success { message: String },
    Error { message: String },
}

impl EntryBody {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::User { .. } => EntryKind::User,
            Self::BotText { .. } => EntryKind::BotText,
            Self::Thinking { .. } => EntryKind::Thinking,
            Self::ToolExecuting { .. } => EntryKind::ToolExecuting,
            Self::ConversationChunk { .. } => EntryKind::ConversationChunk,
            Self::ProductList { .. } => EntryKind::ProductList,
            Self::CartView { .. } => EntryKind::CartView,
            Self::CheckoutStage { .. } => EntryKind::CheckoutStage,
            Self::OrderConfirmation { .. } => EntryKind::OrderConfirmation,
            Self::PaymentInitiated { .. } => EntryKind::PaymentInitiated,
            Self::Success { .. } => EntryKind::Success,
            Self::Error { .. } => EntryKind::Error,
        }
    }
}

/// One line of the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub request: Option<RequestId>,
    pub created_at: DateTime<Utc>,
    pub body: EntryBody,
}

/// An observable change to the transcript, emitted in application order.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptMutation {
    Appended(Entry),
    /// Same entry id, new body and timestamp.
    Replaced(Entry),
    Removed(EntryId),
    /// Cart aggregates changed. Not a transcript entry.
    CartSummary(CartTotals),
}

// Responses to bootstrap messages carry no user-facing content.
const SESSION_BOOTSTRAP_MARKER: &str = "session initialized";

// The backend announces a payment handoff only in prose. Fragile, but it is
// the sole signal the wire offers; revisit once a raw_payment event ships.
const PAYMENT_MARKER: &str = "order has been initialized";

/// The single-writer transcript state.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    next_id: u64,
    cart_summary: CartTotals,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn cart_summary(&self) -> &CartTotals {
        &self.cart_summary
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn mint_id(&mut self) -> EntryId {
        self.next_id += 1;
        EntryId(self.next_id)
    }

    fn append(&mut self, request: Option<RequestId>, body: EntryBody) -> TranscriptMutation {
        let entry = Entry {
            id: self.mint_id(),
            request,
            created_at: Utc::now(),
            body,
        };
        self.entries.push(entry.clone());
        TranscriptMutation::Appended(entry)
    }

    /// Replaces the transient entry of the same kind within `request`, or
    /// appends if none exists yet.
    fn upsert_transient(&mut self, request: RequestId, body: EntryBody) -> TranscriptMutation {
        let kind = body.kind();
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.request == Some(request) && e.body.kind() == kind);
        match slot {
            Some(entry) => {
                entry.body = body;
                entry.created_at = Utc::now();
                TranscriptMutation::Replaced(entry.clone())
            }
            None => self.append(Some(request), body),
        }
    }

    /// Removes this request's prior entry of the same latest-wins kind, then
    /// appends the fresh one at the tail. Entries owned by other requests
    /// are untouched.
    fn latest_wins(&mut self, request: RequestId, body: EntryBody) -> Vec<TranscriptMutation> {
        let kind = body.kind();
        let mut mutations = Vec::new();
        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.request == Some(request) && e.body.kind() == kind)
        {
            let removed = self.entries.remove(pos);
            mutations.push(TranscriptMutation::Removed(removed.id));
        }
        mutations.push(self.append(Some(request), body));
        mutations
    }

    /// Records the outbound user message.
    pub fn push_user(&mut self, request: RequestId, text: &str) -> TranscriptMutation {
        self.append(
            Some(request),
            EntryBody::User {
                text: text.to_string(),
            },
        )
    }

    /// Applies one in-flight event from `request` and returns the resulting
    /// mutations in order.
    pub fn apply(&mut self, request: RequestId, event: ChatEvent) -> Vec<TranscriptMutation> {
        match event {
            ChatEvent::Thinking { message } => {
                vec![self.upsert_transient(request, EntryBody::Thinking { message })]
            }
            ChatEvent::ToolStart { tool_name, status } => {
                vec![self.upsert_transient(request, EntryBody::ToolExecuting { tool_name, status })]
            }
            ChatEvent::ToolComplete { .. } => self.remove_transient(request, EntryKind::ToolExecuting),
            ChatEvent::ConversationChunk { message, .. } => {
                vec![self.upsert_transient(request, EntryBody::ConversationChunk { message })]
            }
            ChatEvent::RawProducts { products } => {
                self.latest_wins(request, EntryBody::ProductList { products })
            }
            ChatEvent::RawCart { items, summary } => self.apply_cart(request, items, summary),
            ChatEvent::Success { message } => {
                vec![self.append(Some(request), EntryBody::Success { message })]
            }
            ChatEvent::ServerError {
                message,
                retry_suggestion,
            } => {
                let mut mutations = self.sweep(request);
                let text = match retry_suggestion {
                    Some(hint) => format!("{message} ({hint})"),
                    None => message,
                };
                mutations.push(self.append(Some(request), EntryBody::Error { message: text }));
                mutations
            }
            ChatEvent::FinalResponse {
                content,
                payload,
                context_type,
            } => self.fold_final_response(request, &content, payload, context_type.as_deref()),
            // Terminal markers never reach the transcript as events.
            ChatEvent::Done => Vec::new(),
        }
    }

    fn remove_transient(&mut self, request: RequestId, kind: EntryKind) -> Vec<TranscriptMutation> {
        match self
            .entries
            .iter()
            .position(|e| e.request == Some(request) && e.body.kind() == kind)
        {
            Some(pos) => {
                let removed = self.entries.remove(pos);
                vec![TranscriptMutation::Removed(removed.id)]
            }
            None => Vec::new(),
        }
    }

    fn apply_cart(
        &mut self,
        request: RequestId,
        items: Vec<CartItem>,
        summary: CartTotals,
    ) -> Vec<TranscriptMutation> {
        self.cart_summary = summary.clone();
        let mut mutations = Vec::new();
        // Summary-only updates adjust aggregates without touching entries.
        if !items.is_empty() {
            mutations.extend(self.latest_wins(
                request,
                EntryBody::CartView {
                    items,
                    summary: summary.clone(),
                },
            ));
        }
        mutations.push(TranscriptMutation::CartSummary(summary));
        mutations
    }

    /// Terminal response handling: sweep the request's transients, then
    /// expand the payload into durable entries by context type.
    fn fold_final_response(
        &mut self,
        request: RequestId,
        content: &str,
        payload: Option<Value>,
        context_type: Option<&str>,
    ) -> Vec<TranscriptMutation> {
        let mut mutations = self.sweep(request);

        match (context_type, payload) {
            (Some("products"), Some(data)) => {
                let products = extract_products(&data);
                mutations.extend(self.latest_wins(request, EntryBody::ProductList { products }));
            }
            (Some("cart"), Some(data)) => {
                let (items, summary) = extract_cart(&data);
                mutations.extend(self.apply_cart(request, items, summary));
            }
            (Some("order"), Some(data)) => {
                mutations
                    .push(self.append(Some(request), EntryBody::OrderConfirmation { details: data }));
            }
            (Some("checkout"), Some(data)) => {
                mutations
                    .push(self.append(Some(request), EntryBody::CheckoutStage { details: data }));
            }
            _ => {}
        }

        let lowered = content.to_lowercase();
        if content.is_empty() || lowered.contains(SESSION_BOOTSTRAP_MARKER) {
            // Nothing user-facing to say.
        } else if lowered.contains(PAYMENT_MARKER) {
            mutations.push(self.append(
                Some(request),
                EntryBody::PaymentInitiated {
                    message: content.to_string(),
                },
            ));
        } else {
            mutations.push(self.append(
                Some(request),
                EntryBody::BotText {
                    text: content.to_string(),
                },
            ));
        }

        mutations
    }

    /// Removes every transient entry belonging to `request`. Called on all
    /// terminal paths, including cancellation.
    pub fn sweep(&mut self, request: RequestId) -> Vec<TranscriptMutation> {
        let mut mutations = Vec::new();
        self.entries.retain(|e| {
            let stale = e.request == Some(request) && e.body.kind().is_transient();
            if stale {
                mutations.push(TranscriptMutation::Removed(e.id));
            }
            !stale
        });
        mutations
    }

    /// Terminal failure handling: sweep, then record a durable error entry
    /// if the transcript already held content worth preserving.
    pub fn record_failure(
        &mut self,
        request: RequestId,
        error: &BackendError,
    ) -> Vec<TranscriptMutation> {
        let mut mutations = self.sweep(request);
        if !self.entries.is_empty() {
            mutations.push(self.append(
                Some(request),
                EntryBody::Error {
                    message: error.to_string(),
                },
            ));
        }
        mutations
    }
}

fn extract_products(data: &Value) -> Vec<Product> {
    let list = data
        .get("products")
        .cloned()
        .unwrap_or_else(|| data.clone());
    serde_json::from_value(list).unwrap_or_default()
}

fn extract_cart(data: &Value) -> (Vec<CartItem>, CartTotals) {
    let items = data
        .get("cart_items")
        .or_else(|| data.get("items"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let summary = data
        .get("cart_summary")
        .or_else(|| data.get("summary"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    (items, summary)
}
