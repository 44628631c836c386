//! JSON codec and length-prefixed framing.
//!
//! Every payload is UTF-8 JSON. On byte streams a payload is preceded by its
//! length as a little-endian `u32`; the same framing is used in both
//! directions.

use std::time::Duration;

use serde::Serialize;
use serde::de::{Deserialize, DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::NetError;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Encode a value to JSON bytes.
///
/// # Errors
///
/// Returns [`NetError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, NetError> {
    serde_json::to_vec(value).map_err(NetError::Encode)
}

/// Decode a value from JSON bytes.
///
/// # Errors
///
/// Returns [`NetError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, NetError> {
    serde_json::from_slice(bytes).map_err(NetError::Decode)
}

/// Write one length-prefixed frame and flush.
///
/// # Errors
///
/// Returns [`NetError::FrameTooLarge`] if `payload` does not fit a `u32`
/// length, or [`NetError::Io`] if the write fails.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| NetError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// Partial reads are retried until the frame is complete. A zero-byte read
/// before that means the peer hung up.
///
/// # Errors
///
/// Returns [`NetError::PeerClosed`] on a premature close,
/// [`NetError::FrameTooLarge`] if the prefix exceeds `max_len`, or
/// [`NetError::Io`] if the read fails.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, NetError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
    fill(reader, &mut prefix).await?;

    let len = u32::from_le_bytes(prefix) as usize;
    if len > max_len {
        return Err(NetError::FrameTooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    fill(reader, &mut payload).await?;
    Ok(payload)
}

async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), NetError>
where
    R: AsyncRead + Unpin,
{
    let mut read = 0;
    while read < buf.len() {
        let n = reader.read(&mut buf[read..]).await?;
        if n == 0 {
            return Err(NetError::PeerClosed {
                read,
                expected: buf.len(),
            });
        }
        read += n;
    }
    Ok(())
}

/// Read one frame, giving up after `timeout`.
///
/// # Errors
///
/// Returns [`NetError::TimedOut`] if the whole frame has not arrived in time,
/// otherwise the errors of [`read_frame`].
pub async fn read_frame_within<R>(
    reader: &mut R,
    max_len: usize,
    timeout: Duration,
) -> Result<Vec<u8>, NetError>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, read_frame(reader, max_len))
        .await
        .map_err(|_| NetError::TimedOut { after: timeout })?
}

/// Encode `message` and write it as one frame.
///
/// # Errors
///
/// Returns [`NetError`] if encoding or writing fails.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = encode(message)?;
    write_frame(writer, &payload).await
}

/// Read one frame and decode it.
///
/// # Errors
///
/// Returns [`NetError`] if reading or decoding fails.
pub async fn read_message<R, T>(reader: &mut R, max_len: usize) -> Result<T, NetError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let payload = read_frame(reader, max_len).await?;
    decode(&payload)
}
