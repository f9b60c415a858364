//! Presence heartbeat against a stub directory

mod test_utils;

use std::sync::Arc;
use std::time::{Duration, Instant};

use buddychat_core::{
    ClientState, HeartbeatOutcome, LocalIdentity, PeerRecord, PresenceService, PresenceStatus,
};
use test_utils::{fast_presence, StubDirectory};
use tokio::net::UdpSocket;

fn logged_in_state() -> Arc<ClientState> {
    let state = Arc::new(ClientState::new());
    state.set_identity(LocalIdentity::new("scott1", PresenceStatus::Online));
    state
}

async fn service_for(directory: &StubDirectory, state: Arc<ClientState>) -> PresenceService {
    PresenceService::bind_to(directory.addr, fast_presence(), 1248, state)
        .await
        .unwrap()
}

// ----------------------------------------------------------------------------
// Single Cycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_heartbeat_replaces_buddy_list() {
    let directory = StubDirectory::start(Some(
        "alice 100 ONLINE 127.0.0.1 1248\n\
         broken line\n\
         bob 101 OFFLINE 127.0.0.1 1249\n",
    ))
    .await;
    let state = logged_in_state();
    state.replace_peers(vec![PeerRecord::new("stale", 100, "ONLINE", "10.0.0.1", 1)]);
    let service = service_for(&directory, state.clone()).await;

    let outcome = service.heartbeat().await.unwrap();
    assert_eq!(
        outcome,
        HeartbeatOutcome::Updated {
            peers: 2,
            discarded: 1
        }
    );

    let peers = state.peers();
    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0], PeerRecord::new("alice", 100, "ONLINE", "127.0.0.1", 1248));
    assert!(!peers[1].is_online());
    assert!(state.find_peer("stale").is_none());

    let received = directory.received().await;
    assert_eq!(received, vec!["SET scott1 100 ONLINE 1248", "GET scott1"]);
}

#[tokio::test]
async fn test_empty_reply_clears_list() {
    let directory = StubDirectory::start(Some("")).await;
    let state = logged_in_state();
    state.replace_peers(vec![PeerRecord::new("alice", 100, "ONLINE", "127.0.0.1", 1248)]);
    let service = service_for(&directory, state.clone()).await;

    let outcome = service.heartbeat().await.unwrap();
    assert_eq!(
        outcome,
        HeartbeatOutcome::Updated {
            peers: 0,
            discarded: 0
        }
    );
    assert!(state.peers().is_empty());
}

#[tokio::test]
async fn test_timeout_keeps_previous_list() {
    let directory = StubDirectory::start(None).await;
    let state = logged_in_state();
    let known = vec![PeerRecord::new("alice", 100, "ONLINE", "127.0.0.1", 1248)];
    state.replace_peers(known.clone());
    let service = service_for(&directory, state.clone()).await;

    let started = Instant::now();
    let outcome = service.heartbeat().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, HeartbeatOutcome::TimedOut);
    assert_eq!(*state.peers(), known);
    assert!(elapsed >= Duration::from_millis(900));
    assert!(elapsed < Duration::from_secs(3));
}

#[tokio::test]
async fn test_reply_from_stranger_is_ignored() {
    let directory = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let state = logged_in_state();
    let service = PresenceService::bind_to(
        directory.local_addr().unwrap(),
        fast_presence(),
        1248,
        state.clone(),
    )
    .await
    .unwrap();

    let fake_directory = tokio::spawn(async move {
        let mut buf = [0u8; 256];
        let (_, client) = directory.recv_from(&mut buf).await.unwrap();
        let _ = directory.recv_from(&mut buf).await.unwrap();
        stranger
            .send_to(b"mallory 100 ONLINE 6.6.6.6 666", client)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        directory
            .send_to(b"alice 100 ONLINE 127.0.0.1 1248", client)
            .await
            .unwrap();
    });

    let outcome = service.heartbeat().await.unwrap();
    fake_directory.await.unwrap();

    assert_eq!(
        outcome,
        HeartbeatOutcome::Updated {
            peers: 1,
            discarded: 0
        }
    );
    assert!(state.find_peer("mallory").is_none());
    assert!(state.find_peer("alice").is_some());
}

#[tokio::test]
async fn test_truncated_reply_drops_cut_line() {
    // carol's record straddles the 1024-byte receive limit
    let alice = "alice 100 ONLINE 127.0.0.1 1248\n";
    let carol = "carol 100 ONLINE 127.0.0.1 12480\n";
    let filler = format!("{}\n", "x".repeat(1024 - 29 - alice.len() - 1));
    let reply = format!("{}{}{}", alice, filler, carol);
    assert_eq!(alice.len() + filler.len() + 29, 1024);

    let directory = StubDirectory::start(Some(reply.as_str())).await;
    let state = logged_in_state();
    let service = service_for(&directory, state.clone()).await;

    let outcome = service.heartbeat().await.unwrap();
    assert_eq!(
        outcome,
        HeartbeatOutcome::Updated {
            peers: 1,
            discarded: 1
        }
    );
    assert!(state.find_peer("alice").is_some());
    assert!(state.find_peer("carol").is_none());
}

#[tokio::test]
async fn test_reply_filling_buffer_exactly_is_kept() {
    let alice = "alice 100 ONLINE 127.0.0.1 1248\n";
    let filler = format!("{}\n", "x".repeat(1024 - alice.len() - 1 - alice.len()));
    let reply = format!("{}{}{}", alice, filler, alice.replace("alice", "bobby"));
    assert_eq!(reply.len(), 1024);

    let directory = StubDirectory::start(Some(reply.as_str())).await;
    let state = logged_in_state();
    let service = service_for(&directory, state.clone()).await;

    service.heartbeat().await.unwrap();
    assert_eq!(
        state.find_peer("bobby"),
        Some(PeerRecord::new("bobby", 100, "ONLINE", "127.0.0.1", 1248))
    );
}

#[tokio::test]
async fn test_late_reply_is_not_taken_for_next_answer() {
    let directory = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let state = logged_in_state();
    let service = PresenceService::bind_to(
        directory.local_addr().unwrap(),
        fast_presence(),
        1248,
        state.clone(),
    )
    .await
    .unwrap();

    let (first_done_tx, first_done_rx) = tokio::sync::oneshot::channel::<()>();
    let fake_directory = tokio::spawn(async move {
        let mut buf = [0u8; 256];
        // First cycle: SET and GET, answered only after the poll gave up
        let (_, client) = directory.recv_from(&mut buf).await.unwrap();
        directory.recv_from(&mut buf).await.unwrap();
        first_done_rx.await.unwrap();
        directory
            .send_to(b"bob 100 ONLINE 127.0.0.1 1249", client)
            .await
            .unwrap();

        // Second cycle is answered on time
        directory.recv_from(&mut buf).await.unwrap();
        directory.recv_from(&mut buf).await.unwrap();
        directory
            .send_to(b"alice 100 ONLINE 127.0.0.1 1248", client)
            .await
            .unwrap();
    });

    assert_eq!(service.heartbeat().await.unwrap(), HeartbeatOutcome::TimedOut);
    first_done_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let outcome = service.heartbeat().await.unwrap();
    fake_directory.await.unwrap();

    assert_eq!(
        outcome,
        HeartbeatOutcome::Updated {
            peers: 1,
            discarded: 0
        }
    );
    assert!(state.find_peer("alice").is_some());
    assert!(state.find_peer("bob").is_none());
}

#[tokio::test]
async fn test_repeated_announce_is_idempotent() {
    let directory = StubDirectory::start(None).await;
    let state = logged_in_state();
    let service = service_for(&directory, state).await;

    for _ in 0..5 {
        service.announce().await.unwrap();
    }
    assert!(directory.wait_for(|_| true, Duration::from_secs(1)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let received = directory.received().await;
    assert_eq!(received.len(), 5);
    assert!(received.iter().all(|d| d == "SET scott1 100 ONLINE 1248"));
    assert_eq!(directory.status_count().await, 1);
    assert_eq!(
        directory.status_of("scott1").await.as_deref(),
        Some("100 ONLINE 1248")
    );
}

// ----------------------------------------------------------------------------
// Loop
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_loop_polls_and_stops_on_shutdown() {
    let directory = StubDirectory::start(Some("alice 100 ONLINE 127.0.0.1 1248\n")).await;
    let state = logged_in_state();
    let service = service_for(&directory, state.clone()).await;
    let task = tokio::spawn(service.run());

    assert!(
        directory
            .wait_for(|d| d == "GET scott1", Duration::from_secs(3))
            .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(state.find_peer("alice").is_some());

    // Logging out before shutdown is announced on the way out
    state.set_status(PresenceStatus::Offline);
    state.shutdown();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("presence loop must exit promptly")
        .unwrap()
        .unwrap();

    assert!(
        directory
            .wait_for(|d| d == "SET scott1 101 OFFLINE 1248", Duration::from_secs(1))
            .await
    );
}

#[tokio::test]
async fn test_loop_idle_until_logged_in() {
    let directory = StubDirectory::start(Some("")).await;
    let state = Arc::new(ClientState::new());
    let service = service_for(&directory, state.clone()).await;
    let task = tokio::spawn(service.run());

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(directory.received().await.is_empty());

    state.set_identity(LocalIdentity::new("scott2", PresenceStatus::Online));
    assert!(
        directory
            .wait_for(|d| d == "GET scott2", Duration::from_secs(3))
            .await
    );

    state.shutdown();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("presence loop must exit promptly")
        .unwrap()
        .unwrap();
}
