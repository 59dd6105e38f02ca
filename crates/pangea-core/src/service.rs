//! The communication service: ties the wire framing, stream registry,
//! chat history, and `Host` boundary into the public API described in the
//! service contract.
//!
//! Callers share one service behind an `Arc<CommunicationService<H>>` — the
//! service has no separate event-loop task to front, so there is nothing to
//! clone a handle to. `start`/`send_*` take `&Arc<Self>` so they can hand
//! out further clones of that same `Arc` to spawned reader tasks and
//! host-invoked inbound handlers.

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::history::HistoryStore;
use crate::host::{BoxedStream, Host};
use crate::protocol;
use crate::registry::{StreamId, StreamRegistry};
use crate::types::{AudioChunk, ChatRecord, Kind, MessageId, PeerId, Timestamp, VideoFrame};
use crate::wire::{self, AUDIO_HEADER_LEN, CHAT_MAX_PAYLOAD, VIDEO_HEADER_LEN, VIDEO_MAX_PAYLOAD, VOICE_MAX_PAYLOAD};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::{AbortHandle, JoinSet};

/// How long an outbound dial is allowed to take before it's a failure.
const DIAL_DEADLINE: Duration = Duration::from_secs(10);
/// How long `stop` waits for reader tasks to drain before giving up on them.
const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_secs(5);

pub type ChatCallback = Arc<dyn Fn(ChatRecord) + Send + Sync>;
pub type VideoCallback = Arc<dyn Fn(PeerId, VideoFrame) + Send + Sync>;
pub type VoiceCallback = Arc<dyn Fn(PeerId, AudioChunk) + Send + Sync>;

/// Peer identities currently present in each kind's stream table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectedPeers {
    pub chat: Vec<PeerId>,
    pub video: Vec<PeerId>,
    pub voice: Vec<PeerId>,
}

struct ServiceState {
    running: bool,
    chat_callback: Option<ChatCallback>,
    video_callback: Option<VideoCallback>,
    voice_callback: Option<VoiceCallback>,
}

/// The write half of a registered stream, plus the abort handle for the
/// reader task that owns its read half. Closing a stream means aborting
/// the reader (which drops its read half) and shutting the write half down.
#[derive(Clone)]
struct StreamHandle {
    write: Arc<AsyncMutex<WriteHalf<BoxedStream>>>,
    abort: AbortHandle,
}

async fn close_stream_handle(handle: StreamHandle) {
    handle.abort.abort();
    let mut write = handle.write.lock().await;
    let _ = write.shutdown().await;
}

/// Peer-to-peer chat, video, and voice service built on a [`Host`].
pub struct CommunicationService<H: Host> {
    host: Arc<H>,
    state: RwLock<ServiceState>,
    registry: StreamRegistry<StreamHandle>,
    history: HistoryStore,
    readers: std::sync::Mutex<JoinSet<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl<H: Host + 'static> CommunicationService<H> {
    /// Loads chat history from `config`'s resolved path and constructs a new
    /// service, not yet started.
    pub async fn new(host: Arc<H>, config: ServiceConfig) -> Arc<Self> {
        let history = HistoryStore::open(config.history_path()).await;
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            host,
            state: RwLock::new(ServiceState {
                running: false,
                chat_callback: None,
                video_callback: None,
                voice_callback: None,
            }),
            registry: StreamRegistry::new(),
            history,
            readers: std::sync::Mutex::new(JoinSet::new()),
            shutdown_tx,
        })
    }

    /// Registers inbound handlers for the three protocol ids. Idempotent —
    /// a second call while already running is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        let was_running = {
            let mut state = self.state.write().expect("service state lock poisoned");
            let was = state.running;
            state.running = true;
            was
        };
        if was_running {
            return Ok(());
        }
        let _ = self.shutdown_tx.send(false);

        for kind in Kind::ALL {
            let this = Arc::clone(self);
            let protocol_id = wire::protocol_id(kind);
            self.host.set_stream_handler(
                protocol_id,
                Arc::new(move |peer, stream| {
                    let this = Arc::clone(&this);
                    tokio::spawn(async move {
                        this.install_stream(kind, peer, stream).await;
                    });
                }),
            );
        }
        Ok(())
    }

    /// Stops accepting and serving traffic. Idempotent. Closes every live
    /// stream, waits up to five seconds for reader tasks to drain, then
    /// flushes chat history to disk synchronously before returning.
    pub async fn stop(self: &Arc<Self>) -> Result<(), ServiceError> {
        let was_running = {
            let mut state = self.state.write().expect("service state lock poisoned");
            let was = state.running;
            state.running = false;
            was
        };
        if !was_running {
            return Ok(());
        }
        let _ = self.shutdown_tx.send(true);

        for handle in self.registry.drain_all() {
            close_stream_handle(handle).await;
        }

        let mut readers = {
            let mut guard = self.readers.lock().expect("readers lock poisoned");
            std::mem::replace(&mut *guard, JoinSet::new())
        };
        let drained = tokio::time::timeout(SHUTDOWN_DRAIN_DEADLINE, async {
            while readers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("timed out waiting for reader tasks to drain on shutdown");
        }

        self.history.flush().await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.read().expect("service state lock poisoned").running
    }

    pub fn set_chat_callback(&self, callback: impl Fn(ChatRecord) + Send + Sync + 'static) {
        self.state.write().expect("service state lock poisoned").chat_callback = Some(Arc::new(callback));
    }

    pub fn set_video_callback(&self, callback: impl Fn(PeerId, VideoFrame) + Send + Sync + 'static) {
        self.state.write().expect("service state lock poisoned").video_callback = Some(Arc::new(callback));
    }

    pub fn set_voice_callback(&self, callback: impl Fn(PeerId, AudioChunk) + Send + Sync + 'static) {
        self.state.write().expect("service state lock poisoned").voice_callback = Some(Arc::new(callback));
    }

    pub async fn get_chat_history(&self, peer: &PeerId) -> Vec<ChatRecord> {
        self.history.get_for_peer(peer).await
    }

    pub async fn get_all_chat_history(&self) -> HashMap<PeerId, Vec<ChatRecord>> {
        self.history.get_all().await
    }

    pub fn get_connected_peers(&self) -> ConnectedPeers {
        ConnectedPeers {
            chat: self.registry.connected_peers(Kind::Chat),
            video: self.registry.connected_peers(Kind::Video),
            voice: self.registry.connected_peers(Kind::Voice),
        }
    }

    /// Sends a chat message, dialing a fresh stream if none is registered
    /// for `peer` yet. Appends the outbound record to history on success.
    pub async fn send_chat_message(self: &Arc<Self>, peer: PeerId, content: String) -> Result<(), ServiceError> {
        let record = ChatRecord {
            id: MessageId::generate(),
            from: self.host.local_peer_id(),
            to: peer.clone(),
            content,
            timestamp: Timestamp::now(),
        };
        let write = self.get_or_dial(Kind::Chat, peer.clone()).await?;
        {
            let mut guard = write.lock().await;
            write_chat_frame(&mut *guard, &record).await?;
        }
        self.history.append(peer, record).await;
        Ok(())
    }

    pub async fn send_video_frame(self: &Arc<Self>, peer: PeerId, frame: VideoFrame) -> Result<(), ServiceError> {
        let write = self.get_or_dial(Kind::Video, peer).await?;
        let mut guard = write.lock().await;
        write_video_frame(&mut *guard, &frame).await
    }

    pub async fn send_voice_chunk(self: &Arc<Self>, peer: PeerId, chunk: AudioChunk) -> Result<(), ServiceError> {
        let write = self.get_or_dial(Kind::Voice, peer).await?;
        let mut guard = write.lock().await;
        write_voice_frame(&mut *guard, &chunk).await
    }

    async fn get_or_dial(
        self: &Arc<Self>,
        kind: Kind,
        peer: PeerId,
    ) -> Result<Arc<AsyncMutex<WriteHalf<BoxedStream>>>, ServiceError> {
        if let Some(handle) = self.registry.get(kind, &peer) {
            return Ok(handle.write);
        }
        let protocol_id = wire::protocol_id(kind);
        let stream = self
            .host
            .new_stream(peer.clone(), protocol_id, DIAL_DEADLINE)
            .await
            .map_err(ServiceError::Dial)?;
        Ok(self.install_stream(kind, peer, stream).await)
    }

    /// Splits `stream`, spawns a reader task on the read half tagged with a
    /// fresh stream id, registers the write half under that same id, and
    /// closes out whatever entry it replaced (the tie-break loser in a
    /// simultaneous-open race). Returns the write half for an immediate
    /// send, if the caller is the dialing side.
    async fn install_stream(
        self: &Arc<Self>,
        kind: Kind,
        peer: PeerId,
        stream: BoxedStream,
    ) -> Arc<AsyncMutex<WriteHalf<BoxedStream>>> {
        let (read_half, write_half) = tokio::io::split(stream);
        let write = Arc::new(AsyncMutex::new(write_half));
        let id = crate::registry::next_stream_id();

        let abort = {
            let this = Arc::clone(self);
            let reader_peer = peer.clone();
            let mut readers = self.readers.lock().expect("readers lock poisoned");
            readers.spawn(async move {
                this.run_reader(kind, reader_peer, id, read_half).await;
            })
        };

        let handle = StreamHandle {
            write: write.clone(),
            abort,
        };
        if let Some(replaced) = self.registry.insert_with_id(kind, peer, id, handle) {
            close_stream_handle(replaced).await;
        }
        write
    }

    /// Decodes frames from one stream until shutdown, EOF, or a terminal
    /// protocol error, dispatching each successfully decoded frame to its
    /// callback and, for chat, normalizing `from`/`timestamp` and appending
    /// to history first.
    async fn run_reader(self: Arc<Self>, kind: Kind, peer: PeerId, id: StreamId, mut read_half: ReadHalf<BoxedStream>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return;
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    tracing::debug!(peer = %peer, kind = %kind, "reader task observed shutdown");
                    break;
                }
                outcome = decode_one(kind, &mut read_half) => {
                    match outcome {
                        Ok(Decoded::Chat(mut record)) => {
                            record.from = peer.clone();
                            record.timestamp = Timestamp::now();
                            self.history.append(peer.clone(), record.clone()).await;
                            if let Some(callback) = self.chat_callback() {
                                callback(record);
                            }
                        }
                        Ok(Decoded::Video(frame)) => {
                            if let Some(callback) = self.video_callback() {
                                callback(peer.clone(), frame);
                            }
                        }
                        Ok(Decoded::Voice(chunk)) => {
                            if let Some(callback) = self.voice_callback() {
                                callback(peer.clone(), chunk);
                            }
                        }
                        Err(ReaderOutcome::NonTerminal(e)) => {
                            tracing::warn!(peer = %peer, kind = %kind, error = %e, "discarding malformed frame");
                        }
                        Err(ReaderOutcome::Terminal(e)) => {
                            tracing::debug!(peer = %peer, kind = %kind, error = %e, "stream closed");
                            break;
                        }
                    }
                }
            }
        }

        self.registry.remove(kind, &peer, id);
    }

    fn chat_callback(&self) -> Option<ChatCallback> {
        self.state.read().expect("service state lock poisoned").chat_callback.clone()
    }

    fn video_callback(&self) -> Option<VideoCallback> {
        self.state.read().expect("service state lock poisoned").video_callback.clone()
    }

    fn voice_callback(&self) -> Option<VoiceCallback> {
        self.state.read().expect("service state lock poisoned").voice_callback.clone()
    }
}

enum Decoded {
    Chat(ChatRecord),
    Video(VideoFrame),
    Voice(AudioChunk),
}

enum ReaderOutcome {
    NonTerminal(crate::error::ProtocolError),
    Terminal(crate::error::ProtocolError),
}

async fn decode_one(kind: Kind, read_half: &mut ReadHalf<BoxedStream>) -> Result<Decoded, ReaderOutcome> {
    use crate::error::ProtocolError;
    match kind {
        Kind::Chat => match protocol::read_chat(read_half).await {
            Ok(record) => Ok(Decoded::Chat(record)),
            Err(e @ ProtocolError::MalformedChatRecord(_)) => Err(ReaderOutcome::NonTerminal(e)),
            Err(e) => Err(ReaderOutcome::Terminal(e)),
        },
        Kind::Video => protocol::read_video(read_half)
            .await
            .map(Decoded::Video)
            .map_err(ReaderOutcome::Terminal),
        Kind::Voice => protocol::read_voice(read_half)
            .await
            .map(Decoded::Voice)
            .map_err(ReaderOutcome::Terminal),
    }
}

// ---------------------------------------------------------------------------
// Sender-side frame writers.
//
// These mirror the encodings in `protocol.rs` but write header, length, and
// payload as three distinguishable steps so a failure names which one broke,
// per the service contract's "write-header, write-length, write-payload"
// error taxonomy. `protocol.rs`'s single-call writers remain the public,
// tested encoders for callers that don't need that granularity.
// ---------------------------------------------------------------------------

async fn write_chat_frame<W: AsyncWrite + Unpin>(writer: &mut W, record: &ChatRecord) -> Result<(), ServiceError> {
    let payload = serde_json::to_vec(record).map_err(ServiceError::Serialize)?;
    if payload.len() as u32 > CHAT_MAX_PAYLOAD {
        return Err(ServiceError::PayloadTooLarge {
            size: payload.len(),
            max: CHAT_MAX_PAYLOAD,
        });
    }
    writer
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .map_err(ServiceError::WriteLength)?;
    writer.write_all(&payload).await.map_err(ServiceError::WritePayload)?;
    writer.flush().await.map_err(ServiceError::WritePayload)?;
    Ok(())
}

async fn write_video_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &VideoFrame) -> Result<(), ServiceError> {
    if frame.payload.len() as u32 > VIDEO_MAX_PAYLOAD {
        return Err(ServiceError::PayloadTooLarge {
            size: frame.payload.len(),
            max: VIDEO_MAX_PAYLOAD,
        });
    }
    let mut header = [0u8; VIDEO_HEADER_LEN];
    header[0..4].copy_from_slice(&frame.frame_id.to_be_bytes());
    header[4..6].copy_from_slice(&frame.width.to_be_bytes());
    header[6..8].copy_from_slice(&frame.height.to_be_bytes());
    header[8] = frame.quality;
    writer.write_all(&header).await.map_err(ServiceError::WriteHeader)?;
    writer
        .write_all(&(frame.payload.len() as u32).to_be_bytes())
        .await
        .map_err(ServiceError::WriteLength)?;
    writer.write_all(&frame.payload).await.map_err(ServiceError::WritePayload)?;
    writer.flush().await.map_err(ServiceError::WritePayload)?;
    Ok(())
}

async fn write_voice_frame<W: AsyncWrite + Unpin>(writer: &mut W, chunk: &AudioChunk) -> Result<(), ServiceError> {
    if chunk.payload.len() as u32 > VOICE_MAX_PAYLOAD {
        return Err(ServiceError::PayloadTooLarge {
            size: chunk.payload.len(),
            max: VOICE_MAX_PAYLOAD,
        });
    }
    let mut header = [0u8; AUDIO_HEADER_LEN];
    header[0..4].copy_from_slice(&chunk.sample_rate.to_be_bytes());
    header[4] = chunk.channels;
    writer.write_all(&header).await.map_err(ServiceError::WriteHeader)?;
    writer
        .write_all(&(chunk.payload.len() as u32).to_be_bytes())
        .await
        .map_err(ServiceError::WriteLength)?;
    writer.write_all(&chunk.payload).await.map_err(ServiceError::WritePayload)?;
    writer.flush().await.map_err(ServiceError::WritePayload)?;
    Ok(())
}
