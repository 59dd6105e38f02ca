//! Stream registry.
//!
//! Three logically identical tables — one per [`Kind`] — mapping a peer
//! identity to its live stream. All three share one mutex; contention is
//! low because the hot path (reading and writing frames) never touches the
//! registry, only lookup/insert/remove do.

use crate::types::{Kind, PeerId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// A registered stream's identity, assigned once at dial or accept time.
///
/// `Remove` is keyed by this id rather than just `(kind, peer)` so a stream
/// that has already been replaced by a newer one (the simultaneous-open
/// race) cannot be removed out from under its replacement by a stale
/// reader task that is only now noticing its own stream died.
pub type StreamId = u64;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh, process-unique stream id.
pub fn next_stream_id() -> StreamId {
    NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed)
}

struct Entry<S> {
    id: StreamId,
    stream: S,
}

/// One table per kind, all guarded by a single mutex.
pub struct StreamRegistry<S> {
    tables: Mutex<Tables<S>>,
}

struct Tables<S> {
    chat: HashMap<PeerId, Entry<S>>,
    video: HashMap<PeerId, Entry<S>>,
    voice: HashMap<PeerId, Entry<S>>,
}

impl<S> Default for StreamRegistry<S> {
    fn default() -> Self {
        Self {
            tables: Mutex::new(Tables {
                chat: HashMap::new(),
                video: HashMap::new(),
                voice: HashMap::new(),
            }),
        }
    }
}

impl<S: Clone> StreamRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the live stream for `(kind, peer)`, if any.
    pub fn get(&self, kind: Kind, peer: &PeerId) -> Option<S> {
        let tables = self.tables.lock().expect("registry lock poisoned");
        table(&tables, kind).get(peer).map(|e| e.stream.clone())
    }

    /// Installs `stream` under `(kind, peer)`, tagging it with a fresh id
    /// and returning that id alongside whatever entry it replaced, if any.
    ///
    /// The caller is responsible for closing a returned replaced stream —
    /// `Insert` never does so itself, per the "install first, then close
    /// the old one you retrieved" protocol.
    pub fn insert(&self, kind: Kind, peer: PeerId, stream: S) -> (StreamId, Option<S>) {
        let id = next_stream_id();
        let replaced = self.insert_with_id(kind, peer, id, stream);
        (id, replaced)
    }

    /// Like [`Self::insert`], but with the id assigned by the caller ahead
    /// of time — used when a reader task must be spawned (and its abort
    /// handle captured) before the entry it belongs to can be registered.
    pub fn insert_with_id(&self, kind: Kind, peer: PeerId, id: StreamId, stream: S) -> Option<S> {
        let mut tables = self.tables.lock().expect("registry lock poisoned");
        table_mut(&mut tables, kind)
            .insert(peer, Entry { id, stream })
            .map(|e| e.stream)
    }

    /// Removes the entry for `(kind, peer)` only if it is still tagged with
    /// `expected_id`. No-op (and returns `false`) if the entry has already
    /// been replaced or was never present — idempotent by construction.
    pub fn remove(&self, kind: Kind, peer: &PeerId, expected_id: StreamId) -> bool {
        let mut tables = self.tables.lock().expect("registry lock poisoned");
        let map = table_mut(&mut tables, kind);
        if map.get(peer).map(|e| e.id) == Some(expected_id) {
            map.remove(peer);
            true
        } else {
            false
        }
    }

    /// Peer identities currently present in `kind`'s table, as owned copies.
    pub fn connected_peers(&self, kind: Kind) -> Vec<PeerId> {
        let tables = self.tables.lock().expect("registry lock poisoned");
        table(&tables, kind).keys().cloned().collect()
    }

    /// Drains every table, returning all live streams so the caller can
    /// close them during shutdown. Leaves all three tables empty.
    pub fn drain_all(&self) -> Vec<S> {
        let mut tables = self.tables.lock().expect("registry lock poisoned");
        tables
            .chat
            .drain()
            .chain(tables.video.drain())
            .chain(tables.voice.drain())
            .map(|(_, e)| e.stream)
            .collect()
    }
}

fn table<S>(tables: &Tables<S>, kind: Kind) -> &HashMap<PeerId, Entry<S>> {
    match kind {
        Kind::Chat => &tables.chat,
        Kind::Video => &tables.video,
        Kind::Voice => &tables.voice,
    }
}

fn table_mut<S>(tables: &mut Tables<S>, kind: Kind) -> &mut HashMap<PeerId, Entry<S>> {
    match kind {
        Kind::Chat => &mut tables.chat,
        Kind::Video => &mut tables.video,
        Kind::Voice => &mut tables.voice,
    }
}
