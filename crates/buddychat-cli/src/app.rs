//! buddychat application wiring
//!
//! Owns the shared client state and the two long-lived background tasks
//! (presence heartbeat and connection listener). Either task may fail to
//! start; the other keeps running and the menu stays usable.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use buddychat_core::{
    BuddyResult, ClientState, ConnectionListener, DirectoryClient, PendingConnections,
    PresenceService, PresenceStatus,
};

use crate::config::AppConfig;

/// How long shutdown waits for each background task
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Running client: configuration, shared state and background tasks
pub struct BuddyChatApp {
    config: AppConfig,
    state: Arc<ClientState>,
    pending: Arc<PendingConnections>,
    directory: DirectoryClient,
    tasks: Vec<(&'static str, JoinHandle<BuddyResult<()>>)>,
}

impl BuddyChatApp {
    pub fn new(config: AppConfig) -> Self {
        let directory = DirectoryClient::new(&config.directory);
        let pending = Arc::new(PendingConnections::new(config.peer.pending_capacity));
        Self {
            config,
            state: Arc::new(ClientState::new()),
            pending,
            directory,
            tasks: Vec::new(),
        }
    }

    /// Start the presence heartbeat and the connection listener. A component
    /// that cannot set up its socket is reported and left out.
    pub async fn start(&mut self) {
        let client_config = self.config.client_config();

        match PresenceService::bind(&client_config, self.state.clone()).await {
            Ok(service) => {
                info!("Presence heartbeat targets {}", service.directory_addr());
                self.tasks.push(("presence", tokio::spawn(service.run())));
            }
            Err(e) => error!("Presence service not started: {}", e),
        }

        match ConnectionListener::bind(
            self.config.peer.listen_port,
            self.pending.clone(),
            self.state.clone(),
        )
        .await
        {
            Ok(listener) => self.tasks.push(("listener", tokio::spawn(listener.run()))),
            Err(e) => error!("Connection listener not started: {}", e),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<ClientState> {
        &self.state
    }

    pub fn pending(&self) -> &Arc<PendingConnections> {
        &self.pending
    }

    pub fn directory(&self) -> &DirectoryClient {
        &self.directory
    }

    /// Names of the background tasks that started
    pub fn running_components(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Go offline, signal every loop to stop and wait for the tasks
    pub async fn shutdown(self) {
        info!("Stopping background tasks");
        self.state.set_status(PresenceStatus::Offline);
        self.state.shutdown();

        for (name, task) in self.tasks {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => debug!("{} task finished", name),
                Ok(Ok(Err(e))) => warn!("{} task ended with error: {}", name, e),
                Ok(Err(e)) => warn!("{} task panicked: {}", name, e),
                Err(_) => warn!("{} task did not stop within {:?}", name, SHUTDOWN_TIMEOUT),
            }
        }

        // Undecided connections are closed here
        while self.pending.take().is_some() {}
    }
}
