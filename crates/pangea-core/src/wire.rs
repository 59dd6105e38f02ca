//! Protocol identifiers and framing ceilings for the three media kinds.
//!
//! These constants pin protocol version `1.0.0` for each kind. There is no
//! in-band version byte in any of the three framings (see the Open Question
//! in the design notes) — a future incompatible wire change requires minting
//! a new protocol id rather than bumping a field inside this module.

use crate::types::Kind;

pub const CHAT_PROTOCOL: &str = "/pangea/chat/1.0.0";
pub const VIDEO_PROTOCOL: &str = "/pangea/video/1.0.0";
pub const VOICE_PROTOCOL: &str = "/pangea/voice/1.0.0";

/// Maximum chat payload length: 1 MiB.
pub const CHAT_MAX_PAYLOAD: u32 = 1 << 20;
/// Maximum video payload length: 10 MiB.
pub const VIDEO_MAX_PAYLOAD: u32 = 10 << 20;
/// Maximum voice payload length: 1 MiB.
pub const VOICE_MAX_PAYLOAD: u32 = 1 << 20;

/// Fixed video header size: frame id (4) + width (2) + height (2) + quality (1) + reserved (3).
pub const VIDEO_HEADER_LEN: usize = 12;
/// Fixed audio header size: sample rate (4) + channels (1) + reserved (3).
pub const AUDIO_HEADER_LEN: usize = 8;

pub fn protocol_id(kind: Kind) -> &'static str {
    match kind {
        Kind::Chat => CHAT_PROTOCOL,
        Kind::Video => VIDEO_PROTOCOL,
        Kind::Voice => VOICE_PROTOCOL,
    }
}

pub fn max_payload(kind: Kind) -> u32 {
    match kind {
        Kind::Chat => CHAT_MAX_PAYLOAD,
        Kind::Video => VIDEO_MAX_PAYLOAD,
        Kind::Voice => VOICE_MAX_PAYLOAD,
    }
}
