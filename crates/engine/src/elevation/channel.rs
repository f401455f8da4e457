//! Newline-delimited JSON framing shared by broker and peer

use serde::de::DeserializeOwned;
use serde::Serialize;
use strap_errors::{ElevationError, Error};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write one message followed by a newline and flush
///
/// # Errors
///
/// Returns `ElevationError::PeerLost` if the other side is gone.
pub async fn write_message<T, W>(writer: &mut W, message: &T) -> Result<(), Error>
where
    T: Serialize,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .map_err(|_| ElevationError::PeerLost)?;
    writer.flush().await.map_err(|_| ElevationError::PeerLost)?;
    Ok(())
}

/// Read one message
///
/// Returns `Ok(None)` on a clean end of stream.
///
/// # Errors
///
/// Returns `ElevationError::PeerLost` on a read failure and
/// `ElevationError::Protocol` for a line that is not a valid message.
pub async fn read_message<T, R>(reader: &mut R) -> Result<Option<T>, Error>
where
    T: DeserializeOwned,
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|_| ElevationError::PeerLost)?;
        if read == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            break;
        }
    }
    serde_json::from_str(line.trim_end())
        .map(Some)
        .map_err(|e| {
            ElevationError::Protocol {
                message: e.to_string(),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::protocol::{PeerRequest, PeerResponse};
    use tokio::io::BufReader;

    #[tokio::test]
    async fn messages_cross_a_duplex_pipe() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(near);

        write_message(&mut far, &PeerResponse::Ready { pid: 7 })
            .await
            .unwrap();
        write_message(&mut far, &PeerRequest::Shutdown).await.unwrap();
        drop(far);

        let first: Option<PeerResponse> = read_message(&mut reader).await.unwrap();
        assert!(matches!(first, Some(PeerResponse::Ready { pid: 7 })));
        let second: Option<PeerRequest> = read_message(&mut reader).await.unwrap();
        assert!(matches!(second, Some(PeerRequest::Shutdown)));
        let end: Option<PeerRequest> = read_message(&mut reader).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn garbage_is_a_protocol_error() {
        let mut input: &[u8] = b"\n{not json}\n";
        let err = read_message::<PeerResponse, _>(&mut input)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Elevation(ElevationError::Protocol { .. })
        ));
    }
}
