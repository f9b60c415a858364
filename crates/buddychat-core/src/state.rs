//! Process-wide client state
//!
//! One `ClientState` is shared (behind an `Arc`) by the presence service,
//! the connection listener and the command layer. Nothing in here is
//! guarded by a lock held across an await point:
//! - the buddy list is an immutable snapshot swapped atomically, so a reader
//!   sees either the previous poll or the next one, never a mix
//! - the local identity is swapped the same way
//! - `running` goes from true to false exactly once, and the shutdown watch
//!   channel wakes every loop that is parked on I/O when it does

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio::sync::watch;
use tracing::info;

use crate::errors::{BuddyError, BuddyResult};
use crate::types::{LocalIdentity, PeerRecord, PresenceStatus};

/// Shared client state
pub struct ClientState {
    identity: ArcSwapOption<LocalIdentity>,
    peers: ArcSwap<Vec<PeerRecord>>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl ClientState {
    /// Fresh state: not logged in, empty buddy list, running
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            identity: ArcSwapOption::const_empty(),
            peers: ArcSwap::from_pointee(Vec::new()),
            running: AtomicBool::new(true),
            shutdown_tx,
        }
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    /// Current login, if any
    pub fn identity(&self) -> Option<Arc<LocalIdentity>> {
        self.identity.load_full()
    }

    /// Current login, or `NotLoggedIn` for commands that need one
    pub fn require_identity(&self) -> BuddyResult<Arc<LocalIdentity>> {
        self.identity().ok_or(BuddyError::NotLoggedIn)
    }

    /// Set (or replace) the login after register/login
    pub fn set_identity(&self, identity: LocalIdentity) {
        info!(
            "Local identity set to {} ({})",
            identity.user_id, identity.status
        );
        self.identity.store(Some(Arc::new(identity)));
    }

    /// Change the announced status, keeping the user id. No-op when logged out.
    pub fn set_status(&self, status: PresenceStatus) {
        self.identity
            .rcu(|current| current.as_ref().map(|id| Arc::new(id.with_status(status))));
    }

    // ------------------------------------------------------------------------
    // Buddy list
    // ------------------------------------------------------------------------

    /// Snapshot of the last successful poll
    pub fn peers(&self) -> Arc<Vec<PeerRecord>> {
        self.peers.load_full()
    }

    /// Swap in a complete new buddy list
    pub fn replace_peers(&self, peers: Vec<PeerRecord>) {
        self.peers.store(Arc::new(peers));
    }

    /// Look up one buddy in the current snapshot
    pub fn find_peer(&self, peer_id: &str) -> Option<PeerRecord> {
        self.peers
            .load()
            .iter()
            .find(|record| record.peer_id == peer_id)
            .cloned()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flip `running` to false and wake every loop. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Shutdown requested");
            self.shutdown_tx.send_replace(true);
        }
    }

    /// Resolves once `shutdown` has been called, including before this call
    pub async fn stopped(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientState")
            .field("identity", &self.identity())
            .field("peers", &self.peers.load().len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(id: &str, code: u16) -> PeerRecord {
        PeerRecord::new(id, code, "ONLINE", "127.0.0.1", 1248)
    }

    #[test]
    fn test_initial_state() {
        let state = ClientState::new();
        assert!(state.identity().is_none());
        assert!(state.peers().is_empty());
        assert!(state.is_running());
    }

    #[test]
    fn test_set_status_requires_identity() {
        let state = ClientState::new();
        state.set_status(PresenceStatus::Offline);
        assert!(state.identity().is_none());

        state.set_identity(LocalIdentity::new("scott", PresenceStatus::Online));
        state.set_status(PresenceStatus::Offline);
        let identity = state.identity().unwrap();
        assert_eq!(identity.user_id, "scott");
        assert_eq!(identity.status, PresenceStatus::Offline);
    }

    #[test]
    fn test_require_identity() {
        let state = ClientState::new();
        assert!(matches!(
            state.require_identity(),
            Err(BuddyError::NotLoggedIn)
        ));

        state.set_identity(LocalIdentity::new("scott", PresenceStatus::Online));
        assert_eq!(state.require_identity().unwrap().user_id, "scott");
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let state = ClientState::new();
        state.replace_peers(vec![record("alice", 100)]);
        let before = state.peers();

        state.replace_peers(vec![record("bob", 100), record("carol", 101)]);

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].peer_id, "alice");
        assert_eq!(state.peers().len(), 2);
        assert!(state.find_peer("alice").is_none());
        assert_eq!(state.find_peer("carol").unwrap().status_code, 101);
    }

    #[test]
    fn test_shutdown_is_one_way() {
        let state = ClientState::new();
        state.shutdown();
        state.shutdown();
        assert!(!state.is_running());
    }

    #[tokio::test]
    async fn test_stopped_after_shutdown() {
        let state = Arc::new(ClientState::new());
        state.shutdown();
        tokio::time::timeout(Duration::from_secs(1), state.stopped())
            .await
            .expect("stopped() must resolve when shutdown already happened");
    }

    #[tokio::test]
    async fn test_stopped_wakes_waiter() {
        let state = Arc::new(ClientState::new());
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.stopped().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        state.shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter must wake")
            .unwrap();
    }

    #[test]
    fn test_concurrent_readers_see_whole_lists() {
        let state = Arc::new(ClientState::new());
        let small: Vec<PeerRecord> = (0..3).map(|i| record(&format!("a{}", i), 100)).collect();
        let large: Vec<PeerRecord> = (0..50).map(|i| record(&format!("b{}", i), 101)).collect();
        state.replace_peers(small.clone());

        let writer = {
            let state = state.clone();
            let small = small.clone();
            let large = large.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    if i % 2 == 0 {
                        state.replace_peers(large.clone());
                    } else {
                        state.replace_peers(small.clone());
                    }
                }
            })
        };

        for _ in 0..500 {
            let snapshot = state.peers();
            assert!(*snapshot == small || *snapshot == large);
        }
        writer.join().unwrap();
    }
}
