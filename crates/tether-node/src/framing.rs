//! Length-prefixed framing over an async byte stream.
//!
//! Frame format:
//!   [u32 big-endian length][payload bytes...]

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

pub const MAX_FRAME_LEN: u32 = tether_core::rpc::MAX_ENVELOPE_SIZE as u32;

fn map_io_err(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::Closed
    } else {
        TransportError::Io(e)
    }
}

/// Read one frame. Returns `Ok(None)` when the peer closed the stream
/// cleanly between frames; a stream that ends partway through the length
/// prefix or payload is [`TransportError::Closed`].
pub async fn read_frame<R>(io: &mut R) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    if io.read(&mut len_buf[..1]).await? == 0 {
        return Ok(None);
    }
    io.read_exact(&mut len_buf[1..]).await.map_err(map_io_err)?;

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len as usize];
    io.read_exact(&mut payload).await.map_err(map_io_err)?;

    Ok(Some(payload))
}

pub async fn write_frame<W>(io: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or(TransportError::FrameTooLarge {
            len: u32::try_from(payload.len()).unwrap_or(u32::MAX),
            max: MAX_FRAME_LEN,
        })?;

    io.write_all(&len.to_be_bytes()).await.map_err(map_io_err)?;
    io.write_all(payload).await.map_err(map_io_err)?;
    io.flush().await.map_err(map_io_err)?;

    Ok(())
}
