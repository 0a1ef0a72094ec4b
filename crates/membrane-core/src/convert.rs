//! Conversion contracts between platform types and canonical triggers.
//!
//! Gateways reject malformed platform input before conversion, so
//! `ToCanonical` is infallible. `FromCanonical` can fail when the platform
//! type is stricter than the canonical one (e.g. header name syntax), but it
//! never rewrites header values or body bytes.

use crate::trigger::{EventAck, Headers, HttpRequest, HttpResponse, QueryParams, Trigger};

/// Platform request to canonical trigger.
pub trait ToCanonical {
    /// Convert into a canonical trigger.
    fn to_canonical(self) -> Trigger;
}

/// Canonical reply to platform reply.
pub trait FromCanonical: Sized {
    /// Error raised when the platform type cannot represent the reply.
    type Error;

    /// Build a platform reply from a worker's HTTP response.
    fn from_http_response(response: HttpResponse) -> Result<Self, Self::Error>;

    /// Build a platform reply from an event acknowledgement.
    fn from_event_ack(ack: EventAck) -> Result<Self, Self::Error>;
}

impl ToCanonical for http::Request<Vec<u8>> {
    fn to_canonical(self) -> Trigger {
        let (parts, body) = self.into_parts();

        Trigger::Http(HttpRequest {
            method: parts.method.as_str().to_string(),
            path: parts.uri.path().to_string(),
            query: parse_query(parts.uri.query().unwrap_or_default()),
            headers: headers_from_map(&parts.headers),
            body,
        })
    }
}

impl FromCanonical for http::Response<Vec<u8>> {
    type Error = http::Error;

    fn from_http_response(response: HttpResponse) -> Result<Self, Self::Error> {
        let mut builder = http::Response::builder().status(response.status);
        for (name, values) in &response.headers {
            for value in values {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        builder.body(response.body)
    }

    fn from_event_ack(ack: EventAck) -> Result<Self, Self::Error> {
        let status = if ack.success { 200 } else { 500 };
        http::Response::builder()
            .status(status)
            .header("x-request-id", ack.request_id)
            .body(Vec::new())
    }
}

/// Collect an `http::HeaderMap` into multi-valued canonical headers.
///
/// Bytes outside UTF-8 (obs-text) are kept, decoded lossily with U+FFFD.
pub fn headers_from_map(map: &http::HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    headers
}

/// Split a raw query string into multi-valued parameters.
///
/// Values are kept as they appear on the wire, without percent-decoding.
pub fn parse_query(query: &str) -> QueryParams {
    let mut params = QueryParams::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }
    params
}
