//! # pangea-core
//!
//! Peer-to-peer chat, video, and voice streaming over a host-provided
//! transport. This crate owns the wire framing, the in-memory/on-disk chat
//! history, the live stream registry, and the service that ties them
//! together; it does not own peer discovery, NAT traversal, or encryption —
//! those live behind the [`host`] module's `Host` trait, implemented by
//! whatever P2P library the embedding application chooses.

pub mod config;
pub mod error;
pub mod history;
pub mod host;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod testing;
pub mod types;
pub mod wire;

pub use error::{HostError, ProtocolError, ServiceError};
pub use host::Host;
pub use service::CommunicationService;
pub use types::{AudioChunk, ChatRecord, Kind, MessageId, PeerId, Timestamp, VideoFrame};
