//! Function side of the protocol.
//!
//! Used by function runtimes written in Rust and by the membrane's own
//! tests to stand in for a real function process.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use membrane_core::{Event, HttpRequest, HttpResponse};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::adapter::{BoxedReader, BoxedWriter};
use crate::codec::{ClientCodec, CodecError};
use crate::message::{
    ClientMessage, EventResponseMessage, InitRequest, ServerMessage,
};

/// Handles triggers delivered to a function.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// Answer an HTTP-shaped trigger.
    async fn on_http_request(&self, request: HttpRequest) -> HttpResponse;

    /// Handle an event; `false` reports it as not acknowledged.
    async fn on_event(&self, event: Event) -> bool;
}

/// A registered connection from a function to the membrane.
pub struct FunctionClient {
    reader: FramedRead<BoxedReader, ClientCodec>,
    writer: FramedWrite<BoxedWriter, ClientCodec>,
}

impl FunctionClient {
    /// Connect to a membrane over TCP and register.
    pub async fn connect(address: &str, runtime: Option<String>) -> Result<Self, CodecError> {
        let stream = TcpStream::connect(address).await?;
        let (reader, writer) = stream.into_split();
        Self::register(reader, writer, runtime).await
    }

    /// Register over an existing stream.
    pub async fn register<R, W>(
        reader: R,
        writer: W,
        runtime: Option<String>,
    ) -> Result<Self, CodecError>
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let mut client = Self {
            reader: FramedRead::new(Box::pin(reader) as BoxedReader, ClientCodec::new()),
            writer: FramedWrite::new(Box::pin(writer) as BoxedWriter, ClientCodec::new()),
        };

        client
            .writer
            .send(ClientMessage::Init(InitRequest { runtime }))
            .await?;

        match client.reader.next().await {
            Some(Ok(ServerMessage::InitResponse(_))) => Ok(client),
            Some(Ok(other)) => Err(CodecError::Unexpected(format!("{:?}", other))),
            Some(Err(e)) => Err(e),
            None => Err(CodecError::Closed),
        }
    }

    /// Receive the next trigger, or `None` once the membrane closes the stream.
    pub async fn next_message(&mut self) -> Option<Result<ServerMessage, CodecError>> {
        self.reader.next().await
    }

    /// Send a raw message.
    pub async fn send(&mut self, message: ClientMessage) -> Result<(), CodecError> {
        self.writer.send(message).await
    }

    /// Answer triggers with `handler` until the membrane closes the stream.
    pub async fn serve<H>(mut self, handler: &H) -> Result<(), CodecError>
    where
        H: FunctionHandler + ?Sized,
    {
        while let Some(message) = self.next_message().await {
            let reply = match message? {
                ServerMessage::HttpRequest(request) => {
                    let response = handler.on_http_request(request.into()).await;
                    ClientMessage::HttpResponse(response.into())
                }
                ServerMessage::Event(event) => {
                    let success = handler.on_event(event.into()).await;
                    ClientMessage::EventResponse(EventResponseMessage { success })
                }
                ServerMessage::InitResponse(_) => {
                    return Err(CodecError::Unexpected(
                        "duplicate init_response".to_string(),
                    ));
                }
            };
            self.send(reply).await?;
        }

        debug!("membrane closed the function stream");
        Ok(())
    }
}
