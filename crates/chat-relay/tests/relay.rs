//! End-to-end relay tests over loopback TCP

use chat_relay::{Host, Participant, Pulse, Relay, RelayConfig, RelayError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const BOT_ID: u32 = 99;

#[derive(Default)]
struct RecordingHost {
    lines: Mutex<Vec<String>>,
}

impl RecordingHost {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Host for RecordingHost {
    fn broadcast(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }

    fn is_host_controlled(&self, participant: &Participant) -> bool {
        participant.id == BOT_ID
    }
}

fn config(period_ms: u64) -> RelayConfig {
    RelayConfig {
        heartbeat_period_ms: period_ms,
        ..RelayConfig::with_listen("127.0.0.1", 0)
    }
}

async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn connect_peer(relay: &Arc<Relay>) -> (TcpStream, u64) {
    let bridge = relay.current().await.expect("bridge running");
    let addr = bridge.local_addr().await.expect("listener bound");
    let before = bridge.connection().await.map(|c| c.id);

    let stream = TcpStream::connect(addr).await.unwrap();
    for _ in 0..200 {
        if let Some(info) = bridge.connection().await {
            if Some(info.id) != before {
                return (stream, info.id);
            }
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("peer was never installed");
}

async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("timed out reading from bridge")
        .unwrap();
    buf
}

async fn nothing_pending(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    timeout(Duration::from_millis(50), stream.read(&mut buf))
        .await
        .is_err()
}

#[tokio::test]
async fn test_host_events_reach_peer() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(60_000), host.clone());
    relay.initialize().await.unwrap();
    let (mut peer, _) = connect_peer(&relay).await;

    let alice = Participant::new(1, "alice");
    let bot = Participant::new(BOT_ID, "Bot");

    relay.on_participant_connected(&alice).await;
    relay.on_participant_connected(&bot).await;
    let expected = b"CONNECT\nalice\r\n";
    assert_eq!(read_exactly(&mut peer, expected.len()).await, expected);
    assert!(nothing_pending(&mut peer).await);

    relay
        .on_chat_broadcast(&alice, "Incoming!~wfx/misc/incoming.wav")
        .await;
    let expected = b"MESSAGE\nalice\nIncoming!\r\n";
    assert_eq!(read_exactly(&mut peer, expected.len()).await, expected);

    relay.on_chat_broadcast(&alice, "   ").await;
    assert!(nothing_pending(&mut peer).await);

    relay.on_canned_chat(&alice, "VGA", "Attack!~wattack.wav").await;
    let expected = b"MESSAGE\nalice\n[VGA] Attack!\r\n";
    assert_eq!(read_exactly(&mut peer, expected.len()).await, expected);

    relay
        .on_participant_disconnected(&alice, "left the game")
        .await;
    let expected = b"DISCONNECT\nalice\r\n";
    assert_eq!(read_exactly(&mut peer, expected.len()).await, expected);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_peer_frames_are_broadcast() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(60_000), host.clone());
    relay.initialize().await.unwrap();
    let (mut peer, _) = connect_peer(&relay).await;

    peer.write_all(b"MESSAGE\r\nalice\r\nlobby\r\nhello world\r\n")
        .await
        .unwrap();

    let host_ref = host.clone();
    assert!(
        eventually(|| {
            let host = host_ref.clone();
            async move { !host.lines().is_empty() }
        })
        .await
    );
    assert_eq!(host.lines(), ["[lobby] alice: hello world"]);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_second_peer_evicts_first() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(60_000), host.clone());
    relay.initialize().await.unwrap();

    let (mut first, first_id) = connect_peer(&relay).await;
    // Half a frame on the first connection
    first.write_all(b"MESSAGE\nghost\n").await.unwrap();
    sleep(Duration::from_millis(20)).await;

    let (mut second, second_id) = connect_peer(&relay).await;
    assert_ne!(first_id, second_id);

    // First peer sees end of stream
    let mut buf = Vec::new();
    let read = timeout(Duration::from_secs(2), first.read_to_end(&mut buf))
        .await
        .expect("evicted peer was not closed");
    assert!(matches!(read, Ok(0)) || read.is_err());

    // Second peer frames decode from a clean accumulator
    second
        .write_all(b"MESSAGE\nbob\nirc\nhi there\n")
        .await
        .unwrap();
    let host_ref = host.clone();
    assert!(
        eventually(|| {
            let host = host_ref.clone();
            async move { !host.lines().is_empty() }
        })
        .await
    );
    assert_eq!(host.lines(), ["[irc] bob: hi there"]);

    relay
        .on_chat_broadcast(&Participant::new(2, "carol"), "only b")
        .await;
    let expected = b"MESSAGE\ncarol\nonly b\r\n";
    assert_eq!(read_exactly(&mut second, expected.len()).await, expected);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_tick_with_absent_bridge_reinitializes_once() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(60_000), host);
    let original = relay.initialize().await.unwrap();

    relay.discard().await;
    assert!(relay.current().await.is_none());

    assert_eq!(relay.tick(None).await, Pulse::Reinitialized);
    assert_eq!(relay.reinitializations(), 1);

    let bridge = relay.current().await.expect("bridge rebuilt");
    assert_ne!(bridge.instance(), original.instance());
    assert!(bridge.is_healthy().await);
    assert!(bridge.local_addr().await.is_some());
    assert!(bridge.heartbeat_pending().await);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_reinitialize_replaces_healthy_bridge() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(60_000), host);
    let original = relay.initialize().await.unwrap();
    let (mut peer, _) = connect_peer(&relay).await;

    let rebuilt = relay.reinitialize().await;
    assert_ne!(rebuilt.instance(), original.instance());
    assert_eq!(relay.reinitializations(), 1);
    assert!(!original.is_healthy().await);
    assert!(rebuilt.is_healthy().await);
    assert!(rebuilt.heartbeat_pending().await);
    assert!(rebuilt.connection().await.is_none());

    // The old peer is dropped with the old bridge
    let mut buf = Vec::new();
    let read = timeout(Duration::from_secs(2), peer.read_to_end(&mut buf))
        .await
        .expect("old peer was not closed");
    assert!(matches!(read, Ok(0)) || read.is_err());

    relay.shutdown().await;
}

#[tokio::test]
async fn test_stalled_peer_does_not_wedge_relay() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(60_000), host);
    let bridge = relay.initialize().await.unwrap();

    // A peer with a tiny buffer that never reads
    let (local, _stalled) = tokio::io::duplex(64);
    let (read, write) = tokio::io::split(local);
    bridge.supervisor().attach("10.0.0.9:7000", read, write).await;

    let alice = Participant::new(1, "alice");
    let big = "a".repeat(4096);
    timeout(Duration::from_secs(2), relay.on_chat_broadcast(&alice, &big))
        .await
        .expect("host hook blocked on a stalled peer");

    let (mut second, _) = timeout(Duration::from_secs(5), connect_peer(&relay))
        .await
        .expect("second peer was not installed");

    let pulse = timeout(Duration::from_secs(2), relay.tick(None))
        .await
        .expect("heartbeat tick blocked on a stalled peer");
    assert_eq!(pulse, Pulse::AlreadyArmed);

    let expected = b"HEARTBEAT\r\n";
    assert_eq!(read_exactly(&mut second, expected.len()).await, expected);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_healthy_tick_does_not_stack_timers() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(60_000), host);
    let bridge = relay.initialize().await.unwrap();
    assert!(bridge.heartbeat_pending().await);

    assert_eq!(relay.tick(None).await, Pulse::AlreadyArmed);
    assert_eq!(relay.tick(None).await, Pulse::AlreadyArmed);
    assert_eq!(relay.reinitializations(), 0);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_stray_fire_is_ignored() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(60_000), host);
    let bridge = relay.initialize().await.unwrap();

    assert_eq!(relay.tick(Some(bridge.instance() + 100)).await, Pulse::Ignored);
    let current = relay.current().await.unwrap();
    assert_eq!(current.instance(), bridge.instance());

    relay.shutdown().await;
    assert_eq!(relay.tick(None).await, Pulse::Ignored);
}

#[tokio::test]
async fn test_dead_listener_triggers_reinitialize() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(60_000), host);
    let bridge = relay.initialize().await.unwrap();

    bridge.supervisor().stop().await;
    assert!(!bridge.is_healthy().await);

    assert_eq!(relay.tick(None).await, Pulse::Reinitialized);
    let rebuilt = relay.current().await.unwrap();
    assert_ne!(rebuilt.instance(), bridge.instance());
    assert!(rebuilt.is_healthy().await);
    assert!(!bridge.heartbeat_pending().await);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_self_heals() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(20), host);
    let bridge = relay.initialize().await.unwrap();

    bridge.supervisor().stop().await;

    let relay_ref = relay.clone();
    let original = bridge.instance();
    assert!(
        eventually(|| {
            let relay = relay_ref.clone();
            async move {
                match relay.current().await {
                    Some(current) => {
                        current.instance() != original && current.is_healthy().await
                    }
                    None => false,
                }
            }
        })
        .await,
        "bridge was not rebuilt by the heartbeat"
    );
    assert!(relay.reinitializations() >= 1);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_periodic_heartbeat_on_wire() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(20), host);
    relay.initialize().await.unwrap();
    let (mut peer, _) = connect_peer(&relay).await;

    let expected = b"HEARTBEAT\r\nHEARTBEAT\r\n";
    assert_eq!(read_exactly(&mut peer, expected.len()).await, expected);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_initialize_reports_bind_error() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();

    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(RelayConfig::with_listen("127.0.0.1", port), host);

    let result = relay.initialize().await;
    assert!(matches!(result, Err(RelayError::Bind(_))));
    assert!(relay.current().await.is_none());
}

#[tokio::test]
async fn test_initialize_keeps_healthy_bridge() {
    let host = Arc::new(RecordingHost::default());
    let relay = Relay::new(config(60_000), host);
    let first = relay.initialize().await.unwrap();
    let second = relay.initialize().await.unwrap();
    assert_eq!(first.instance(), second.instance());

    relay.shutdown().await;
}
