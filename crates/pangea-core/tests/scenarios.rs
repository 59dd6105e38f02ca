//! End-to-end scenarios exercising two `CommunicationService` instances
//! wired together through `LoopbackHost`, with no real transport involved.

use pangea_core::config::ServiceConfig;
use pangea_core::service::CommunicationService;
use pangea_core::testing::LoopbackHost;
use pangea_core::{ChatRecord, PeerId, VideoFrame, Timestamp};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

struct Harness {
    a: Arc<CommunicationService<LoopbackHost>>,
    b: Arc<CommunicationService<LoopbackHost>>,
    _dir_a: tempfile::TempDir,
    _dir_b: tempfile::TempDir,
}

async fn connected_pair() -> Harness {
    let directory = LoopbackHost::new_directory();
    let host_a = LoopbackHost::new("A", directory.clone());
    let host_b = LoopbackHost::new("B", directory);

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let a = CommunicationService::new(
        host_a,
        ServiceConfig {
            data_dir: Some(dir_a.path().to_path_buf()),
        },
    )
    .await;
    let b = CommunicationService::new(
        host_b,
        ServiceConfig {
            data_dir: Some(dir_b.path().to_path_buf()),
        },
    )
    .await;
    a.start().unwrap();
    b.start().unwrap();

    Harness {
        a,
        b,
        _dir_a: dir_a,
        _dir_b: dir_b,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// S1 — a chat message sent by A is delivered to B's callback and recorded
/// in both sides' history under the counterpart's key.
#[tokio::test]
async fn s1_chat_delivery() {
    let h = connected_pair().await;

    let received: Arc<Mutex<Vec<ChatRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    h.b.set_chat_callback(move |record| received_clone.lock().unwrap().push(record));

    h.a.send_chat_message(PeerId::new("B"), "hello".to_string())
        .await
        .unwrap();
    settle().await;

    let delivered = received.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].from, PeerId::new("A"));
    assert_eq!(delivered[0].to, PeerId::new("B"));
    assert_eq!(delivered[0].content, "hello");
    drop(delivered);

    let a_history = h.a.get_chat_history(&PeerId::new("B")).await;
    assert_eq!(a_history.len(), 1);
    assert_eq!(a_history[0].content, "hello");
    assert_eq!(a_history[0].from, PeerId::new("A"));

    let b_history = h.b.get_chat_history(&PeerId::new("A")).await;
    assert_eq!(b_history.len(), 1);
    assert_eq!(b_history[0].content, "hello");
    assert_eq!(b_history[0].from, PeerId::new("A"));
}

/// S2 — messages sent in order on one stream arrive in that same order.
#[tokio::test]
async fn s2_bidirectional_per_stream_ordering() {
    let h = connected_pair().await;

    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    h.b.set_chat_callback(move |record| received_clone.lock().unwrap().push(record.content));

    for content in ["m1", "m2", "m3"] {
        h.a.send_chat_message(PeerId::new("B"), content.to_string())
            .await
            .unwrap();
    }
    settle().await;

    assert_eq!(*received.lock().unwrap(), vec!["m1", "m2", "m3"]);
}

/// S3 — an oversize chat frame written directly onto a raw dialed stream
/// tears down B's reader without invoking the chat callback; a subsequent
/// `SendChatMessage` from the real service re-opens a fresh stream and
/// delivers normally.
#[tokio::test]
async fn s3_oversize_rejection_then_fresh_stream_recovers() {
    use pangea_core::Host;

    let directory = LoopbackHost::new_directory();
    let host_a = LoopbackHost::new("A", directory.clone());
    let host_b = LoopbackHost::new("B", directory);

    let dir_b = tempfile::tempdir().unwrap();
    let service_b = CommunicationService::new(
        host_b,
        ServiceConfig {
            data_dir: Some(dir_b.path().to_path_buf()),
        },
    )
    .await;
    service_b.start().unwrap();

    let callback_count = Arc::new(AtomicUsize::new(0));
    let callback_count_clone = callback_count.clone();
    service_b.set_chat_callback(move |_| {
        callback_count_clone.fetch_add(1, Ordering::SeqCst);
    });

    // Dial B's chat protocol directly through the host, bypassing any
    // service on A's side, and write a declared length over the ceiling
    // without ever writing a payload.
    let mut raw_stream = host_a
        .new_stream(PeerId::new("B"), pangea_core::wire::CHAT_PROTOCOL, Duration::from_secs(1))
        .await
        .unwrap();
    let oversize = pangea_core::wire::CHAT_MAX_PAYLOAD + 1;
    raw_stream.write_all(&oversize.to_be_bytes()).await.unwrap();
    drop(raw_stream);
    settle().await;

    assert_eq!(callback_count.load(Ordering::SeqCst), 0);
    assert!(service_b.get_connected_peers().chat.is_empty());

    // A real service sharing the same "A" identity sends normally next.
    let dir_a = tempfile::tempdir().unwrap();
    let service_a = CommunicationService::new(
        host_a,
        ServiceConfig {
            data_dir: Some(dir_a.path().to_path_buf()),
        },
    )
    .await;
    service_a.start().unwrap();
    service_a
        .send_chat_message(PeerId::new("B"), "recovered".to_string())
        .await
        .unwrap();
    settle().await;

    assert_eq!(callback_count.load(Ordering::SeqCst), 1);
}

/// S4 — `Stop` drains reader tasks even with a slow callback, and leaves
/// the stream tables empty with history persisted to a parseable file.
#[tokio::test]
async fn s4_stop_drains_readers() {
    let h = connected_pair().await;

    h.b.set_chat_callback(|_record| {
        std::thread::sleep(Duration::from_millis(10));
    });

    h.a.send_chat_message(PeerId::new("B"), "hi".to_string())
        .await
        .unwrap();
    h.a.send_video_frame(
        PeerId::new("B"),
        VideoFrame {
            frame_id: 1,
            width: 320,
            height: 240,
            quality: 100,
            payload: vec![0, 1, 2],
            timestamp: Timestamp::now(),
        },
    )
    .await
    .unwrap();
    settle().await;

    h.a.stop().await.unwrap();

    let connected = h.a.get_connected_peers();
    assert!(connected.chat.is_empty());
    assert!(connected.video.is_empty());
    assert!(connected.voice.is_empty());

    let history_path = h._dir_a.path().join("chat_history.json");
    let contents = tokio::fs::read_to_string(&history_path).await.unwrap();
    let _: serde_json::Value = serde_json::from_str(&contents).unwrap();
}

/// S6 — a simultaneous outbound dial and inbound accept for the same
/// (kind, peer) settle to exactly one live entry on each side, and a
/// subsequent send is delivered exactly once.
#[tokio::test]
async fn s6_simultaneous_open_settles_to_one_stream() {
    let h = connected_pair().await;

    // Establish one direction first so both sides already know of each
    // other, then fire two dials for the same (video, peer) concurrently
    // from each side to provoke the tie-break.
    let received = Arc::new(Mutex::new(0usize));
    let received_clone = received.clone();
    h.b.set_video_callback(move |_peer, _frame| {
        *received_clone.lock().unwrap() += 1;
    });

    let frame_a = VideoFrame {
        frame_id: 1,
        width: 100,
        height: 100,
        quality: 50,
        payload: vec![9],
        timestamp: Timestamp::now(),
    };
    // Both sends race to dial-and-install the same (video, "B") entry; the
    // tie-break loser's write may fail if it lands after its stream was
    // closed out from under it — that race is exactly what's under test,
    // so only the settled state and the next send are asserted on.
    let _ = tokio::join!(
        h.a.send_video_frame(PeerId::new("B"), frame_a.clone()),
        h.a.send_video_frame(PeerId::new("B"), frame_a.clone())
    );
    settle().await;

    assert_eq!(h.a.get_connected_peers().video.len(), 1);
    assert_eq!(h.b.get_connected_peers().video.len(), 1);

    h.a.send_video_frame(PeerId::new("B"), frame_a).await.unwrap();
    settle().await;
    assert!(*received.lock().unwrap() >= 1);
}
