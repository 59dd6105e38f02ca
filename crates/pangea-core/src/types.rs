//! Domain types for the Pangea communication service.
//!
//! Identities are modeled as newtypes — thin wrappers around `String` — so
//! a `PeerId` can never be accidentally substituted for a `MessageId` even
//! though both are strings underneath.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PeerId — the transport-authenticated identity of a remote endpoint
// ---------------------------------------------------------------------------

/// Uniquely identifies a peer, as supplied by the `Host` (see [`crate::host`]).
///
/// The service never invents or validates peer identities — it trusts
/// whatever the host hands it as the remote side of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// MessageId — uniquely identifies a single chat record
// ---------------------------------------------------------------------------

/// A locally-unique identifier for a [`ChatRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh id (UUID v4) for an outbound record.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Timestamp — Unix milliseconds since epoch
// ---------------------------------------------------------------------------

/// A point in time, represented as milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Kind — selects protocol id, framing, and callback slot
// ---------------------------------------------------------------------------

/// One of the three media kinds the service multiplexes.
///
/// Selects the wire protocol id (see [`crate::wire`]), the frame codec, and
/// which callback slot a decoded frame is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Chat,
    Video,
    Voice,
}

impl Kind {
    pub const ALL: [Kind; 3] = [Kind::Chat, Kind::Video, Kind::Voice];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Chat => "chat",
            Kind::Video => "video",
            Kind::Voice => "voice",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ChatRecord — a single chat message, sent or received
// ---------------------------------------------------------------------------

/// A chat message exchanged between two peers.
///
/// Serialized as JSON both on the wire (see [`crate::protocol`]) and on disk
/// (see [`crate::history`]) — the two formats are deliberately identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: MessageId,
    pub from: PeerId,
    pub to: PeerId,
    pub content: String,
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// VideoFrame — one frame of an inbound or outbound video stream
// ---------------------------------------------------------------------------

/// One video frame.
///
/// `frame_id` is monotonic per sender but wraps freely on overflow; it must
/// not be assumed monotonic across reconnects (a fresh stream may restart
/// the counter from whatever the sender's encoder happens to be at).
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub frame_id: u32,
    pub width: u16,
    pub height: u16,
    /// Opaque 0-255 quality hint; interpretation is left to the codec stack.
    pub quality: u8,
    pub payload: Vec<u8>,
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// AudioChunk — one chunk of an inbound or outbound voice stream
// ---------------------------------------------------------------------------

/// One chunk of audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub sample_rate: u32,
    pub channels: u8,
    pub payload: Vec<u8>,
    pub timestamp: Timestamp,
}
