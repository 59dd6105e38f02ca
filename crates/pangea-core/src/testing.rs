//! An in-process [`Host`] double for exercising the service without a real
//! P2P transport.
//!
//! `LoopbackHost` instances share a directory (a peer id → host map). Dialing
//! a peer looks the target up in the directory, invokes its registered
//! handler for the requested protocol with one end of a fresh
//! `tokio::io::duplex` pipe, and hands the other end back to the dialer —
//! the same shape a real host would give both sides of a stream.
//!
//! This module is not behind `#[cfg(test)]` so integration tests under
//! `tests/` can use it too; it is not meant to be used outside test code.

use crate::error::HostError;
use crate::host::{BoxedStream, Host, InboundHandler};
use crate::types::PeerId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Shared registry of every `LoopbackHost` reachable from the others.
pub type Directory = Arc<Mutex<HashMap<PeerId, Arc<LoopbackHost>>>>;

/// An in-process stand-in for a real P2P host, backed by `tokio::io::duplex`.
pub struct LoopbackHost {
    local_id: PeerId,
    handlers: RwLock<HashMap<&'static str, InboundHandler>>,
    directory: Directory,
}

/// Default buffer size for the in-memory duplex pipes `LoopbackHost` creates.
const LOOPBACK_BUFFER: usize = 64 * 1024;

impl LoopbackHost {
    /// Creates a fresh, empty directory for a group of loopback hosts.
    pub fn new_directory() -> Directory {
        Arc::new(Mutex::new(HashMap::new()))
    }

    /// Creates a host with the given identity and registers it in `directory`
    /// so other hosts sharing that directory can dial it.
    pub fn new(local_id: impl Into<PeerId>, directory: Directory) -> Arc<Self> {
        let local_id = local_id.into();
        let host = Arc::new(Self {
            local_id: local_id.clone(),
            handlers: RwLock::new(HashMap::new()),
            directory: directory.clone(),
        });
        directory
            .lock()
            .expect("loopback directory lock poisoned")
            .insert(local_id, host.clone());
        host
    }
}

#[async_trait]
impl Host for LoopbackHost {
    fn local_peer_id(&self) -> PeerId {
        self.local_id.clone()
    }

    fn set_stream_handler(&self, protocol: &'static str, handler: InboundHandler) {
        self.handlers
            .write()
            .expect("loopback handlers lock poisoned")
            .insert(protocol, handler);
    }

    async fn new_stream(
        &self,
        peer: PeerId,
        protocol: &'static str,
        _deadline: Duration,
    ) -> Result<BoxedStream, HostError> {
        let target = {
            let directory = self.directory.lock().expect("loopback directory lock poisoned");
            directory.get(&peer).cloned()
        };
        let target = target.ok_or_else(|| HostError::NoRoute { peer: peer.to_string() })?;

        let handler = {
            let handlers = target.handlers.read().expect("loopback handlers lock poisoned");
            handlers.get(protocol).cloned()
        };
        let handler = handler.ok_or_else(|| HostError::NoRoute { peer: peer.to_string() })?;

        let (local_half, remote_half) = tokio::io::duplex(LOOPBACK_BUFFER);
        handler(self.local_id.clone(), Box::new(remote_half));
        Ok(Box::new(local_half))
    }
}
