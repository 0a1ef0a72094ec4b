//! Single-flight worker over one function stream.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use membrane_core::{Event, HttpRequest, HttpResponse, MembraneError, Worker, WorkerId};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{encode_body, frame_codec, CodecError, ServerCodec, MAX_FRAME_LENGTH};
use crate::message::{ClientMessage, ServerMessage};

/// Read half of a function stream, type-erased.
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// Write half of a function stream, type-erased.
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Framed inbound messages from a function.
pub type MessageReader = FramedRead<BoxedReader, ServerCodec>;

/// Framed outbound messages to a function.
pub type MessageWriter = FramedWrite<BoxedWriter, ServerCodec>;

type FrameWriter = FramedWrite<BoxedWriter, LengthDelimitedCodec>;

/// Terminal result of a worker's listen loop.
///
/// `Ok(())` means the function closed the stream cleanly or the worker was
/// closed locally.
pub type ListenOutcome = Result<(), MembraneError>;

/// Reply kind a pending trigger is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyKind {
    Http,
    Event,
}

struct Pending {
    kind: ReplyKind,
    reply: oneshot::Sender<Result<ClientMessage, MembraneError>>,
}

/// Request slot. `Waiting` is the busy flag.
enum Slot {
    Idle,
    Waiting(Pending),
    Closed,
}

/// Both halves of the stream, owned by the listen loop once it runs.
struct Io {
    reader: MessageReader,
    writer: FrameWriter,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

/// Worker backed by one bidirectional stream to a function process.
///
/// At most one trigger is outstanding at a time: a second trigger issued
/// before the first reply is read fails with [`MembraneError::WorkerBusy`].
/// Frames are written by the listen loop, not by the caller, so a caller
/// that stops waiting neither truncates a frame nor frees the stream early.
/// The busy flag is released when the reply is read or the stream ends.
pub struct FaasWorker {
    id: WorkerId,
    runtime: Option<String>,
    max_frame_length: usize,
    outbound: mpsc::UnboundedSender<Bytes>,
    io: Mutex<Option<Io>>,
    slot: Mutex<Slot>,
    shutdown: CancellationToken,
}

impl FaasWorker {
    /// Wrap an already-handshaken stream.
    pub fn new(reader: MessageReader, writer: MessageWriter, runtime: Option<String>) -> Self {
        Self::with_max_frame_length(reader, writer, runtime, MAX_FRAME_LENGTH)
    }

    /// Wrap a stream whose outbound frames are limited to `max` bytes.
    pub fn with_max_frame_length(
        reader: MessageReader,
        writer: MessageWriter,
        runtime: Option<String>,
        max: usize,
    ) -> Self {
        let (outbound, rx) = mpsc::unbounded_channel();
        let writer = FramedWrite::new(writer.into_inner(), frame_codec(max));
        Self {
            id: WorkerId::next(),
            runtime,
            max_frame_length: max,
            outbound,
            io: Mutex::new(Some(Io {
                reader,
                writer,
                outbound: rx,
            })),
            slot: Mutex::new(Slot::Idle),
            shutdown: CancellationToken::new(),
        }
    }

    /// Runtime reported by the function during the handshake.
    pub fn runtime(&self) -> Option<&str> {
        self.runtime.as_deref()
    }

    /// Whether a trigger is currently outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Waiting(_))
    }

    /// Whether the stream has terminated.
    pub fn is_closed(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Closed)
    }

    /// Stop the listen loop without reporting an error.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Own the stream until it terminates.
    ///
    /// Outbound triggers are written from here and inbound replies are
    /// handed to the pending trigger. When the stream ends, any pending
    /// trigger fails with [`MembraneError::Stream`] and the outcome is sent
    /// to `sink`, whose owner is expected to unregister this worker.
    pub async fn listen(self: Arc<Self>, sink: oneshot::Sender<ListenOutcome>) {
        let io = self.io.lock().take();
        let Some(Io {
            mut reader,
            mut writer,
            mut outbound,
        }) = io
        else {
            let _ = sink.send(Err(MembraneError::Protocol(
                "worker is already listening".to_string(),
            )));
            return;
        };

        let outcome = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break Ok(()),
                frame = reader.next() => match frame {
                    None => break Ok(()),
                    Some(Err(e)) => break Err(MembraneError::Stream(e.to_string())),
                    Some(Ok(message)) => {
                        if let Err(e) = self.deliver(message) {
                            break Err(e);
                        }
                    }
                },
                Some(frame) = outbound.recv() => {
                    let sent = tokio::select! {
                        _ = self.shutdown.cancelled() => break Ok(()),
                        sent = writer.send(frame) => sent,
                    };
                    if let Err(e) = sent {
                        let reason = format!("failed to write trigger: {}", e);
                        break Err(MembraneError::Stream(reason));
                    }
                }
            }
        };

        self.terminate(&outcome);
        match &outcome {
            Ok(()) => debug!(worker_id = %self.id, "function stream closed"),
            Err(e) => warn!(worker_id = %self.id, error = %e, "function stream failed"),
        }
        let _ = sink.send(outcome);
    }

    /// Hand an inbound reply to the pending trigger.
    fn deliver(&self, message: ClientMessage) -> Result<(), MembraneError> {
        let kind = match &message {
            ClientMessage::HttpResponse(_) => ReplyKind::Http,
            ClientMessage::EventResponse(_) => ReplyKind::Event,
            ClientMessage::Init(_) => {
                return Err(MembraneError::Protocol(
                    "unexpected init after handshake".to_string(),
                ));
            }
        };

        let pending = {
            let mut slot = self.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Waiting(pending) => pending,
                other => {
                    *slot = other;
                    return Err(MembraneError::Protocol(format!(
                        "received {} with no outstanding trigger",
                        message.name()
                    )));
                }
            }
        };

        if pending.kind != kind {
            let err = format!("received {} for a {:?} trigger", message.name(), pending.kind);
            let _ = pending.reply.send(Err(MembraneError::Protocol(err.clone())));
            return Err(MembraneError::Protocol(err));
        }

        // The caller may have given up; the slot is released either way.
        let _ = pending.reply.send(Ok(message));
        Ok(())
    }

    /// Mark the stream closed and fail any pending trigger.
    fn terminate(&self, outcome: &ListenOutcome) {
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Closed);
        if let Slot::Waiting(pending) = previous {
            let reason = match outcome {
                Ok(()) => "stream closed while awaiting reply".to_string(),
                Err(e) => e.to_string(),
            };
            let _ = pending.reply.send(Err(MembraneError::Stream(reason)));
        }
    }

    /// Queue one trigger for the listen loop and wait for its reply.
    ///
    /// An oversized trigger is rejected before the slot is taken and leaves
    /// the stream untouched.
    async fn dispatch(
        &self,
        message: ServerMessage,
        kind: ReplyKind,
    ) -> Result<ClientMessage, MembraneError> {
        let frame = encode_body(&message, self.max_frame_length).map_err(|e| match e {
            CodecError::TooLarge { size, limit } => MembraneError::TriggerTooLarge { size, limit },
            other => MembraneError::Protocol(format!("could not encode trigger: {}", other)),
        })?;

        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.slot.lock();
            match *slot {
                Slot::Closed => {
                    return Err(MembraneError::Stream("stream is closed".to_string()));
                }
                Slot::Waiting(_) => return Err(MembraneError::WorkerBusy),
                Slot::Idle => {
                    if self.outbound.send(frame).is_err() {
                        return Err(MembraneError::Stream("stream is closed".to_string()));
                    }
                    *slot = Slot::Waiting(Pending { kind, reply: tx });
                }
            }
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(MembraneError::Stream(
                "stream closed while awaiting reply".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for FaasWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaasWorker")
            .field("id", &self.id)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Worker for FaasWorker {
    fn id(&self) -> WorkerId {
        self.id
    }

    async fn handle_http_request(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse, MembraneError> {
        let reply = self
            .dispatch(ServerMessage::HttpRequest(request.into()), ReplyKind::Http)
            .await?;
        match reply {
            ClientMessage::HttpResponse(response) => Ok(response.into()),
            other => Err(MembraneError::Protocol(format!(
                "expected http_response, received {}",
                other.name()
            ))),
        }
    }

    async fn handle_event(&self, event: Event) -> Result<(), MembraneError> {
        let request_id = event.request_id.clone();
        let reply = self
            .dispatch(ServerMessage::Event(event.into()), ReplyKind::Event)
            .await?;
        match reply {
            ClientMessage::EventResponse(ack) if ack.success => Ok(()),
            ClientMessage::EventResponse(_) => Err(MembraneError::Stream(format!(
                "event was not acknowledged by the function (request {})",
                request_id
            ))),
            other => Err(MembraneError::Protocol(format!(
                "expected event_response, received {}",
                other.name()
            ))),
        }
    }
}
