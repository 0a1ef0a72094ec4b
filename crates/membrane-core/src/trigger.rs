//! Canonical trigger model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Multi-valued HTTP headers, keyed by header name.
///
/// Values keep the order in which they were received.
pub type Headers = HashMap<String, Vec<String>>;

/// Multi-valued query string parameters.
pub type QueryParams = HashMap<String, Vec<String>>;

/// Kind of a trigger, for logging and routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// HTTP-shaped request.
    Http,
    /// Event delivered on a topic.
    Event,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// A normalized inbound invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// HTTP-shaped request.
    Http(HttpRequest),
    /// Event-shaped delivery.
    Event(Event),
}

impl Trigger {
    /// Get the trigger kind.
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Http(_) => TriggerKind::Http,
            Self::Event(_) => TriggerKind::Event,
        }
    }
}

impl From<HttpRequest> for Trigger {
    fn from(request: HttpRequest) -> Self {
        Self::Http(request)
    }
}

impl From<Event> for Trigger {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

/// Canonical HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method, as sent by the client (e.g. "GET").
    pub method: String,
    /// Request path, without the query string.
    pub path: String,
    /// Query string parameters.
    pub query: QueryParams,
    /// Request headers.
    pub headers: Headers,
    /// Raw request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Create a new request with no headers, query or body.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Append a header value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Append a query parameter value.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get the first value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        first_header(&self.headers, name)
    }
}

/// Canonical HTTP response produced by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a response with the given status and no headers or body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Append a header value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Set the response body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get the first value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        first_header(&self.headers, name)
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new(200)
    }
}

/// Canonical event delivered on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Topic the event was published to.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Content type of the payload.
    pub content_type: String,
    /// Identifier unique per delivery attempt.
    pub request_id: String,
}

impl Event {
    /// Create a new event with a freshly generated request ID.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            content_type: "application/octet-stream".to_string(),
            request_id: generate_request_id(),
        }
    }

    /// Set the payload content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set the request ID (e.g. the platform's delivery ID).
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Acknowledgement of an event by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAck {
    /// Request ID of the acknowledged event.
    pub request_id: String,
    /// Whether the function handled the event.
    pub success: bool,
}

/// Generate a request ID for an event delivery.
///
/// Unique within this process; platforms that carry their own delivery ID
/// should use it instead via [`Event::with_request_id`].
pub fn generate_request_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{:x}-{:x}", nanos, COUNTER.fetch_add(1, Ordering::Relaxed))
}

fn first_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(|v| v.as_str())
}
