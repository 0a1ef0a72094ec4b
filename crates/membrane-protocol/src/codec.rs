//! Length-delimited JSON framing.

use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::message::{ClientMessage, ServerMessage};

/// Largest frame accepted in either direction.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Errors raised while framing or parsing wire messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Unexpected message: {0}")]
    Unexpected(String),

    #[error("Stream closed")]
    Closed,
}

/// Codec that frames each message as a 4-byte big-endian length followed by
/// a JSON document.
///
/// `D` is the decoded (inbound) message type, `E` the encoded (outbound) one.
#[derive(Debug)]
pub struct WireCodec<D, E> {
    frames: LengthDelimitedCodec,
    max_frame_length: usize,
    _types: PhantomData<fn(E) -> D>,
}

/// Codec used by the membrane side of a stream.
pub type ServerCodec = WireCodec<ClientMessage, ServerMessage>;

/// Codec used by the function side of a stream.
pub type ClientCodec = WireCodec<ServerMessage, ClientMessage>;

impl<D, E> WireCodec<D, E> {
    /// Create a codec with the default frame limit.
    pub fn new() -> Self {
        Self::with_max_frame_length(MAX_FRAME_LENGTH)
    }

    /// Create a codec with a custom frame limit.
    pub fn with_max_frame_length(max: usize) -> Self {
        Self {
            frames: frame_codec(max),
            max_frame_length: max,
            _types: PhantomData,
        }
    }
}

/// Length-prefix codec for bodies produced by [`encode_body`].
pub fn frame_codec(max: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max)
        .new_codec()
}

/// Serialize `item` into a frame body no longer than `max` bytes.
pub fn encode_body<T: Serialize>(item: &T, max: usize) -> Result<Bytes, CodecError> {
    let body = serde_json::to_vec(item)?;
    if body.len() > max {
        return Err(CodecError::TooLarge {
            size: body.len(),
            limit: max,
        });
    }
    Ok(Bytes::from(body))
}

impl<D, E> Default for WireCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned, E> Decoder for WireCodec<D, E> {
    type Item = D;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.frames.decode(src)? {
            Some(frame) => Ok(Some(serde_json::from_slice(&frame)?)),
            None => Ok(None),
        }
    }
}

impl<D, E: Serialize> Encoder<E> for WireCodec<D, E> {
    type Error = CodecError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = encode_body(&item, self.max_frame_length)?;
        self.frames.encode(body, dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{EventResponseMessage, InitRequest};

    #[test]
    fn test_frame_has_length_prefix() {
        let mut codec = ClientCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(ClientMessage::Init(InitRequest::default()), &mut buf)
            .unwrap();

        let body = br#"{"init":{}}"#;
        assert_eq!(&buf[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&buf[4..], body);
    }

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let mut client = ClientCodec::new();
        let mut server = ServerCodec::new();
        let mut buf = BytesMut::new();
        client
            .encode(
                ClientMessage::EventResponse(EventResponseMessage { success: true }),
                &mut buf,
            )
            .unwrap();

        let mut partial = buf.split_to(6);
        assert!(server.decode(&mut partial).unwrap().is_none());

        partial.unsplit(buf);
        let decoded = server.decode(&mut partial).unwrap();
        assert_eq!(
            decoded,
            Some(ClientMessage::EventResponse(EventResponseMessage { success: true }))
        );
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let mut server = ServerCodec::new();
        let mut buf = BytesMut::new();
        LengthDelimitedCodec::new()
            .encode(Bytes::from_static(b"{nope"), &mut buf)
            .unwrap();

        assert!(matches!(server.decode(&mut buf), Err(CodecError::Json(_))));
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut client = ClientCodec::new();
        let mut server = ServerCodec::with_max_frame_length(8);
        let mut buf = BytesMut::new();
        client
            .encode(ClientMessage::Init(InitRequest::default()), &mut buf)
            .unwrap();

        assert!(matches!(server.decode(&mut buf), Err(CodecError::Io(_))));
    }

    #[test]
    fn test_oversized_message_is_not_encoded() {
        let mut client = ClientCodec::with_max_frame_length(8);
        let mut buf = BytesMut::new();

        let err = client
            .encode(ClientMessage::Init(InitRequest::default()), &mut buf)
            .unwrap_err();

        assert!(matches!(err, CodecError::TooLarge { size: 11, limit: 8 }));
        assert!(buf.is_empty());
    }
}
