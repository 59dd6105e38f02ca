//! Durable chat history.
//!
//! Keeps an in-memory per-peer ring of [`ChatRecord`]s, capped at
//! [`HISTORY_CAP_PER_PEER`] entries, and mirrors it to a single JSON file on
//! disk. Readers get independent copies; nothing outside this module ever
//! sees the live `VecDeque`.
//!
//! # Persistence
//!
//! Every successful `append` bumps a generation counter and wakes a
//! background task that serializes the whole map and writes it via
//! temp-file-then-rename, so a crash mid-write can never leave a
//! half-written file behind. Bursts of appends coalesce onto a single
//! write: the task only persists once the counter has been still for one
//! debounce interval, and only if it hasn't already persisted that exact
//! generation. The background task and an explicit [`HistoryStore::flush`]
//! (shutdown calls both into being, racing each other) serialize through
//! one `persist_lock` so two writers never open the same temp path at once.

use crate::types::{ChatRecord, PeerId};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::Duration;

/// Maximum number of records kept per peer; the oldest is dropped on overflow.
pub const HISTORY_CAP_PER_PEER: usize = 1000;

const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(500);

/// File mode for the persisted history file, per the persisted-state contract.
#[cfg(unix)]
const HISTORY_FILE_MODE: u32 = 0o644;
/// Directory mode for the history file's parent directory, created if absent.
#[cfg(unix)]
const HISTORY_DIR_MODE: u32 = 0o755;

/// Disambiguates concurrent temp files so two persists racing past
/// `persist_lock` (there should never be more than one, but the nonce costs
/// nothing and removes any doubt) can never collide on the same path.
static TEMP_NONCE: AtomicU64 = AtomicU64::new(0);

type HistoryMap = HashMap<PeerId, VecDeque<ChatRecord>>;

/// In-memory chat history with debounced, atomic disk persistence.
pub struct HistoryStore {
    records: Arc<RwLock<HistoryMap>>,
    path: PathBuf,
    generation: Arc<AtomicU64>,
    persisted_generation: Arc<AtomicU64>,
    dirty: Arc<Notify>,
    /// Serializes every persistence attempt (background task and `flush`
    /// alike) so two writers can never open the same temp path at once —
    /// the single lock §4.2 calls for over "the map and all persistence
    /// operations."
    persist_lock: Arc<AsyncMutex<()>>,
}

impl HistoryStore {
    /// Loads history from `path` (missing file → empty, unparseable file →
    /// logged and empty) and starts the background persistence task.
    pub async fn open(path: PathBuf) -> Self {
        let records = load_from_disk(&path).await;
        let store = Self {
            records: Arc::new(RwLock::new(records)),
            path,
            generation: Arc::new(AtomicU64::new(0)),
            persisted_generation: Arc::new(AtomicU64::new(0)),
            dirty: Arc::new(Notify::new()),
            persist_lock: Arc::new(AsyncMutex::new(())),
        };
        store.spawn_persistence_task();
        store
    }

    fn spawn_persistence_task(&self) {
        let records = self.records.clone();
        let path = self.path.clone();
        let generation = self.generation.clone();
        let persisted_generation = self.persisted_generation.clone();
        let dirty = self.dirty.clone();
        let persist_lock = self.persist_lock.clone();

        tokio::spawn(async move {
            loop {
                dirty.notified().await;
                let settled_at = loop {
                    let before = generation.load(Ordering::SeqCst);
                    tokio::time::sleep(DEBOUNCE_INTERVAL).await;
                    let after = generation.load(Ordering::SeqCst);
                    if after == before {
                        break after;
                    }
                    // More appends landed mid-sleep; keep debouncing.
                };

                if settled_at == persisted_generation.load(Ordering::SeqCst) {
                    continue;
                }
                let snapshot = records.read().expect("history lock poisoned").clone();
                let _guard = persist_lock.lock().await;
                match persist_snapshot(&path, &snapshot).await {
                    Ok(()) => persisted_generation.store(settled_at, Ordering::SeqCst),
                    Err(e) => {
                        tracing::warn!(error = %e, path = %path.display(), "failed to persist chat history");
                    }
                }
            }
        });
    }

    /// Appends a record under `peer` (the other party in the exchange — the
    /// sender for inbound, the recipient for outbound) and schedules a
    /// persistence pass. Drops the oldest record for that peer if the cap
    /// is exceeded.
    pub async fn append(&self, peer: PeerId, record: ChatRecord) {
        {
            let mut records = self.records.write().expect("history lock poisoned");
            let entry = records.entry(peer).or_insert_with(VecDeque::new);
            entry.push_back(record);
            if entry.len() > HISTORY_CAP_PER_PEER {
                entry.pop_front();
            }
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.dirty.notify_one();
    }

    /// Returns an independent copy of the history for one peer, oldest first.
    pub async fn get_for_peer(&self, peer: &PeerId) -> Vec<ChatRecord> {
        let records = self.records.read().expect("history lock poisoned");
        records
            .get(peer)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns an independent deep copy of the entire history mapping.
    pub async fn get_all(&self) -> HashMap<PeerId, Vec<ChatRecord>> {
        let records = self.records.read().expect("history lock poisoned");
        records
            .iter()
            .map(|(peer, ring)| (peer.clone(), ring.iter().cloned().collect()))
            .collect()
    }

    /// Forces an immediate persistence pass, bypassing the debounce window.
    /// Used on graceful shutdown so the last burst of appends isn't lost to
    /// a process exit racing the background task's sleep.
    pub async fn flush(&self) {
        let generation = self.generation.load(Ordering::SeqCst);
        if generation == self.persisted_generation.load(Ordering::SeqCst) {
            return;
        }
        let snapshot = self.records.read().expect("history lock poisoned").clone();
        let _guard = self.persist_lock.lock().await;
        match persist_snapshot(&self.path, &snapshot).await {
            Ok(()) => self.persisted_generation.store(generation, Ordering::SeqCst),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "failed to flush chat history");
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

async fn persist_snapshot(path: &Path, snapshot: &HistoryMap) -> Result<(), PersistError> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            create_history_dir(dir).await?;
        }
    }
    let nonce = TEMP_NONCE.fetch_add(1, Ordering::Relaxed);
    let tmp_name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => format!(".{name}.{nonce}.tmp"),
        None => format!(".history.{nonce}.tmp"),
    };
    let tmp_path = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp_path, &json).await?;
    set_history_file_mode(&tmp_path).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(unix)]
async fn create_history_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    builder.mode(HISTORY_DIR_MODE);
    builder.create(dir).await
}

#[cfg(not(unix))]
async fn create_history_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}

#[cfg(unix)]
async fn set_history_file_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(HISTORY_FILE_MODE)).await
}

#[cfg(not(unix))]
async fn set_history_file_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

async fn load_from_disk(path: &Path) -> HistoryMap {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<HistoryMap>(&bytes) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    "chat history file is unparseable, starting with empty history"
                );
                HashMap::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %path.display(),
                "failed to read chat history file, starting with empty history"
            );
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageId, Timestamp};

    fn record(content: &str) -> ChatRecord {
        ChatRecord {
            id: MessageId::generate(),
            from: PeerId::new("A"),
            to: PeerId::new("B"),
            content: content.to_string(),
            timestamp: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("history.json")).await;
        assert!(store.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn append_and_get_for_peer() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("history.json")).await;
        let peer = PeerId::new("B");
        store.append(peer.clone(), record("hi")).await;
        store.append(peer.clone(), record("there")).await;

        let history = store.get_for_peer(&peer).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[1].content, "there");
    }

    #[tokio::test]
    async fn get_for_peer_returns_independent_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("history.json")).await;
        let peer = PeerId::new("B");
        store.append(peer.clone(), record("hi")).await;

        let mut copy = store.get_for_peer(&peer).await;
        copy.push(record("forged"));

        let fresh = store.get_for_peer(&peer).await;
        assert_eq!(fresh.len(), 1);
    }

    #[tokio::test]
    async fn cap_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("history.json")).await;
        let peer = PeerId::new("X");
        for i in 0..(HISTORY_CAP_PER_PEER + 500) {
            store.append(peer.clone(), record(&i.to_string())).await;
        }
        let history = store.get_for_peer(&peer).await;
        assert_eq!(history.len(), HISTORY_CAP_PER_PEER);
        assert_eq!(history.first().unwrap().content, "500");
        assert_eq!(
            history.last().unwrap().content,
            (HISTORY_CAP_PER_PEER + 499).to_string()
        );
    }

    #[tokio::test]
    async fn flush_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let peer = PeerId::new("B");

        {
            let store = HistoryStore::open(path.clone()).await;
            store.append(peer.clone(), record("persisted")).await;
            store.flush().await;
        }

        let reopened = HistoryStore::open(path).await;
        let history = reopened.get_for_peer(&peer).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "persisted");
    }

    #[tokio::test]
    async fn unparseable_file_starts_empty_without_clobbering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        tokio::fs::write(&path, b"not json at all").await.unwrap();

        let store = HistoryStore::open(path.clone()).await;
        assert!(store.get_all().await.is_empty());

        let on_disk = tokio::fs::read(&path).await.unwrap();
        assert_eq!(on_disk, b"not json at all");
    }
}
