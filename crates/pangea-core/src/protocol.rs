//! Wire framing for the three media kinds.
//!
//! All three framings are big-endian and explicit-length-prefixed so a
//! reader can safely pre-allocate the exact payload buffer it needs.
//!
//! - **Chat**: 4-byte length prefix, then that many bytes of JSON.
//! - **Video**: fixed 12-byte header, 4-byte length prefix, then payload.
//! - **Voice**: fixed 8-byte header, 4-byte length prefix, then payload.
//!
//! Every decoder reads exactly the bytes required for each field in order;
//! a short read is terminal. A declared length above the kind's ceiling
//! (see [`crate::wire`]) is a protocol violation — the decoder returns
//! before touching the payload bytes at all, so the caller can tear the
//! stream down without draining an oversize frame off the wire.

use crate::error::ProtocolError;
use crate::types::{AudioChunk, ChatRecord, Timestamp, VideoFrame};
use crate::wire::{AUDIO_HEADER_LEN, CHAT_MAX_PAYLOAD, VIDEO_HEADER_LEN, VIDEO_MAX_PAYLOAD, VOICE_MAX_PAYLOAD};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

async fn read_len<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32, ProtocolError> {
    let mut buf = [0u8; 4];
    match reader.read_exact(&mut buf).await {
        Ok(_) => Ok(u32::from_be_bytes(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => Err(ProtocolError::Io(e)),
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Reads one chat frame: 4-byte length prefix, then that many bytes of JSON.
///
/// Does not normalize `from`/`timestamp` against the transport identity —
/// that is the reader task's job (see [`crate::service`]), not the codec's.
pub async fn read_chat<R: AsyncRead + Unpin>(reader: &mut R) -> Result<ChatRecord, ProtocolError> {
    let length = read_len(reader).await?;
    if length > CHAT_MAX_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: CHAT_MAX_PAYLOAD,
        });
    }
    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await?;
    let record: ChatRecord = serde_json::from_slice(&payload)?;
    Ok(record)
}

/// Writes one chat frame.
pub async fn write_chat<W: AsyncWrite + Unpin>(
    writer: &mut W,
    record: &ChatRecord,
) -> Result<(), ProtocolError> {
    let payload = serde_json::to_vec(record)?;
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// Reads one video frame: 12-byte header, 4-byte length prefix, then payload.
///
/// `timestamp` is stamped with the local wall clock on receipt, per the data
/// model — the wire carries no timestamp for video.
pub async fn read_video<R: AsyncRead + Unpin>(reader: &mut R) -> Result<VideoFrame, ProtocolError> {
    let mut header = [0u8; VIDEO_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let frame_id = u32::from_be_bytes(header[0..4].try_into().unwrap());
    let width = u16::from_be_bytes(header[4..6].try_into().unwrap());
    let height = u16::from_be_bytes(header[6..8].try_into().unwrap());
    let quality = header[8];
    // header[9..12] is reserved, ignored on read.

    let length = read_len(reader).await?;
    if length > VIDEO_MAX_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: VIDEO_MAX_PAYLOAD,
        });
    }
    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await?;

    Ok(VideoFrame {
        frame_id,
        width,
        height,
        quality,
        payload,
        timestamp: Timestamp::now(),
    })
}

/// Writes one video frame. Reserved header bytes are written as zero.
pub async fn write_video<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &VideoFrame,
) -> Result<(), ProtocolError> {
    let mut header = [0u8; VIDEO_HEADER_LEN];
    header[0..4].copy_from_slice(&frame.frame_id.to_be_bytes());
    header[4..6].copy_from_slice(&frame.width.to_be_bytes());
    header[6..8].copy_from_slice(&frame.height.to_be_bytes());
    header[8] = frame.quality;
    // header[9..12] stays zero (reserved).

    writer.write_all(&header).await?;
    writer
        .write_all(&(frame.payload.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(&frame.payload).await?;
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// Reads one audio chunk: 8-byte header, 4-byte length prefix, then payload.
pub async fn read_voice<R: AsyncRead + Unpin>(reader: &mut R) -> Result<AudioChunk, ProtocolError> {
    let mut header = [0u8; AUDIO_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let sample_rate = u32::from_be_bytes(header[0..4].try_into().unwrap());
    let channels = header[4];
    // header[5..8] is reserved, ignored on read.

    let length = read_len(reader).await?;
    if length > VOICE_MAX_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: VOICE_MAX_PAYLOAD,
        });
    }
    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await?;

    Ok(AudioChunk {
        sample_rate,
        channels,
        payload,
        timestamp: Timestamp::now(),
    })
}

/// Writes one audio chunk. Reserved header bytes are written as zero.
pub async fn write_voice<W: AsyncWrite + Unpin>(
    writer: &mut W,
    chunk: &AudioChunk,
) -> Result<(), ProtocolError> {
    let mut header = [0u8; AUDIO_HEADER_LEN];
    header[0..4].copy_from_slice(&chunk.sample_rate.to_be_bytes());
    header[4] = chunk.channels;
    // header[5..8] stays zero (reserved).

    writer.write_all(&header).await?;
    writer
        .write_all(&(chunk.payload.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(&chunk.payload).await?;
    writer.flush().await?;
    Ok(())
}
