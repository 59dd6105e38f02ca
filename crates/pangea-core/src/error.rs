//! Error taxonomy for the Pangea communication service.
//!
//! Two enums carry the policy from the error-handling design: [`ProtocolError`]
//! covers the frame codec (transport I/O, oversize, malformed chat JSON), and
//! [`ServiceError`] covers everything a `Send*` call can fail with, wrapping
//! the failing step (serialize, dial, write-header, write-length,
//! write-payload) so callers get a descriptive cause. History and
//! connected-peers accessors are infallible and have no corresponding error
//! type.

use thiserror::Error;

/// Errors from encoding/decoding a single frame on a stream.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("frame payload too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("malformed chat record: {0}")]
    MalformedChatRecord(#[from] serde_json::Error),
}

/// Errors from the `Host` boundary (dialing, registering handlers).
#[derive(Debug, Error)]
pub enum HostError {
    #[error("dial to peer {peer} on {protocol} timed out")]
    DialTimeout { peer: String, protocol: String },

    #[error("dial to peer {peer} on {protocol} failed: {source}")]
    DialFailed {
        peer: String,
        protocol: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no route to peer {peer}")]
    NoRoute { peer: String },
}

/// Errors a `Send*` call can return, naming the step that failed.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to dial peer: {0}")]
    Dial(#[from] HostError),

    #[error("failed to serialize chat record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write frame header: {0}")]
    WriteHeader(#[source] std::io::Error),

    #[error("failed to write frame length: {0}")]
    WriteLength(#[source] std::io::Error),

    #[error("failed to write frame payload: {0}")]
    WritePayload(#[source] std::io::Error),

    #[error("payload of {size} bytes exceeds the {max}-byte ceiling for this kind")]
    PayloadTooLarge { size: usize, max: u32 },
}

impl From<ProtocolError> for ServiceError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => ServiceError::WritePayload(e),
            ProtocolError::ConnectionClosed => {
                ServiceError::WritePayload(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection closed by peer",
                ))
            }
            ProtocolError::FrameTooLarge { size, max } => {
                ServiceError::PayloadTooLarge { size: size as usize, max }
            }
            ProtocolError::MalformedChatRecord(e) => ServiceError::Serialize(e),
        }
    }
}
