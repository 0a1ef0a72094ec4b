//! Wire messages.

use membrane_core::{Event, Headers, HttpRequest, HttpResponse, QueryParams};
use serde::{Deserialize, Serialize};

/// Messages sent from the membrane to a function process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledges the function's `init` message.
    InitResponse(InitResponse),
    /// HTTP-shaped invocation.
    HttpRequest(HttpRequestMessage),
    /// Event-shaped invocation.
    Event(EventMessage),
}

/// Messages sent from a function process to the membrane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message on every stream.
    Init(InitRequest),
    /// Reply to an `http_request`.
    HttpResponse(HttpResponseMessage),
    /// Reply to an `event`.
    EventResponse(EventResponseMessage),
}

impl ClientMessage {
    /// Short name of the message, for logs and protocol errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::HttpResponse(_) => "http_response",
            Self::EventResponse(_) => "event_response",
        }
    }
}

/// Registration request from a function process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    /// Language runtime of the function (informational).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

/// Registration acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResponse {}

/// Wire form of an HTTP-shaped invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequestMessage {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: QueryParams,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, with = "base64_bytes")]
    pub body: Vec<u8>,
}

impl From<HttpRequest> for HttpRequestMessage {
    fn from(request: HttpRequest) -> Self {
        Self {
            method: request.method,
            path: request.path,
            query: request.query,
            headers: request.headers,
            body: request.body,
        }
    }
}

impl From<HttpRequestMessage> for HttpRequest {
    fn from(message: HttpRequestMessage) -> Self {
        Self {
            method: message.method,
            path: message.path,
            query: message.query,
            headers: message.headers,
            body: message.body,
        }
    }
}

/// Wire form of an event-shaped invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub topic: String,
    pub request_id: String,
    pub content_type: String,
    #[serde(default, with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl From<Event> for EventMessage {
    fn from(event: Event) -> Self {
        Self {
            topic: event.topic,
            request_id: event.request_id,
            content_type: event.content_type,
            payload: event.payload,
        }
    }
}

impl From<EventMessage> for Event {
    fn from(message: EventMessage) -> Self {
        Self {
            topic: message.topic,
            payload: message.payload,
            content_type: message.content_type,
            request_id: message.request_id,
        }
    }
}

/// Wire form of a function's HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponseMessage {
    pub status: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, with = "base64_bytes")]
    pub body: Vec<u8>,
}

impl From<HttpResponseMessage> for HttpResponse {
    fn from(message: HttpResponseMessage) -> Self {
        Self {
            status: message.status,
            headers: message.headers,
            body: message.body,
        }
    }
}

impl From<HttpResponse> for HttpResponseMessage {
    fn from(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
        }
    }
}

/// Acknowledgement of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponseMessage {
    pub success: bool,
}

/// Serde adapter for byte fields carried as base64 strings.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
