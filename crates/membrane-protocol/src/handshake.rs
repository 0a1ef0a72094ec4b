//! Registration handshake.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use membrane_core::MembraneError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::adapter::{BoxedReader, BoxedWriter, FaasWorker, MessageReader, MessageWriter};
use crate::codec::ServerCodec;
use crate::message::{ClientMessage, InitResponse, ServerMessage};

/// Time a new stream has to send its `init` message.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Complete the handshake on a freshly accepted stream and wrap it as a
/// worker.
///
/// The first frame must be `init`; anything else, a closed stream, or
/// silence beyond `timeout` rejects the stream.
pub async fn accept_worker<R, W>(
    reader: R,
    writer: W,
    timeout: Duration,
) -> Result<FaasWorker, MembraneError>
where
    R: AsyncRead + Send + 'static,
    W: AsyncWrite + Send + 'static,
{
    let mut reader: MessageReader =
        FramedRead::new(Box::pin(reader) as BoxedReader, ServerCodec::new());
    let mut writer: MessageWriter =
        FramedWrite::new(Box::pin(writer) as BoxedWriter, ServerCodec::new());

    let first = tokio::time::timeout(timeout, reader.next())
        .await
        .map_err(|_| MembraneError::Protocol(format!("no init message within {:?}", timeout)))?;

    let init = match first {
        Some(Ok(ClientMessage::Init(init))) => init,
        Some(Ok(other)) => {
            return Err(MembraneError::Protocol(format!(
                "expected init, received {}",
                other.name()
            )));
        }
        Some(Err(e)) => return Err(MembraneError::Stream(e.to_string())),
        None => {
            return Err(MembraneError::Stream(
                "stream closed before init".to_string(),
            ));
        }
    };

    writer
        .send(ServerMessage::InitResponse(InitResponse::default()))
        .await
        .map_err(|e| MembraneError::Stream(e.to_string()))?;

    Ok(FaasWorker::new(reader, writer, init.runtime))
}
