//! Frame Codec
//!
//! Length-prefixed framing over a byte stream: a 4-byte little-endian
//! `u32` length, then exactly that many payload bytes.
//!
//! ```text
//! ┌────────────────┬──────────────────────────┐
//! │ len: u32 (LE)  │ payload: [u8; len]       │
//! └────────────────┴──────────────────────────┘
//! ```
//!
//! The transport may hand back any number of bytes per read, so the payload
//! is accumulated until the declared length is reached or the stream ends.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Length of the frame header.
pub const HEADER_LEN: usize = 4;

/// Largest payload accepted (1 MiB). Guards allocation against bogus headers.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Framing errors.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The 4-byte length header could not be read in full.
    #[error("Failed to read frame header: {0}")]
    HeaderRead(#[source] io::Error),

    /// The stream ended or failed before the declared payload arrived.
    #[error("Frame truncated: expected {expected} bytes, received {received}")]
    Truncated {
        /// Declared payload length.
        expected: usize,
        /// Bytes received before the stream ended.
        received: usize,
    },

    /// Declared or supplied payload exceeds `MAX_FRAME_SIZE`.
    #[error("Frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// Offending size.
        size: usize,
        /// Configured maximum.
        max: u32,
    },

    /// Writing a frame failed.
    #[error("Failed to write frame: {0}")]
    Write(#[source] io::Error),
}

/// Encode a payload as a complete frame.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_FRAME_SIZE as usize {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Read one frame and return its payload.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .await
        .map_err(FrameError::HeaderRead)?;

    let size = u32::from_le_bytes(header);
    if size > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: size as usize,
            max: MAX_FRAME_SIZE,
        });
    }

    let expected = size as usize;
    let mut payload = vec![0u8; expected];
    let mut received = 0;
    while received < expected {
        match reader.read(&mut payload[received..]).await {
            Ok(0) => return Err(FrameError::Truncated { expected, received }),
            Ok(n) => received += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return Err(FrameError::Truncated { expected, received }),
        }
    }

    Ok(payload)
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await.map_err(FrameError::Write)?;
    writer.flush().await.map_err(FrameError::Write)?;
    Ok(())
}
