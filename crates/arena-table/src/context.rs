//! Process-level wiring: lobby listener, table registry, shared client.
//!
//! The context owns the account-scoped lobby session. Invitations arriving
//! on the player channel create table workers; workers announce their own
//! exit back through the removal channel and are untracked here.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use arena_client::{GameLogic, PlatformClient, RealtimeCredentials};
use arena_common::config::AppConfig;
use arena_common::error::AppResult;
use arena_core::{ChannelName, NotificationEnvelope, NotificationMessage, PlayerId, TableId};
use arena_transport::{EndpointConfig, NotificationHub, NotificationSink, SessionConfig};

use crate::registry::TableRegistry;
use crate::worker::TableWorker;

struct LobbyDelivery {
    channel: ChannelName,
    payload: Value,
}

/// Everything the running process shares.
pub struct AppContext {
    config: Arc<AppConfig>,
    client: Arc<PlatformClient>,
    logic: Arc<dyn GameLogic>,
    registry: TableRegistry,
    hub: NotificationHub,
    player: PlayerId,
    player_channel: ChannelName,
    removal_tx: mpsc::UnboundedSender<TableId>,
    removal_rx: mpsc::UnboundedReceiver<TableId>,
    lobby_sink: NotificationSink,
    lobby_rx: mpsc::UnboundedReceiver<LobbyDelivery>,
}

impl AppContext {
    #[must_use]
    pub fn new(config: AppConfig, logic: Arc<dyn GameLogic>) -> Self {
        let config = Arc::new(config);
        let client = Arc::new(PlatformClient::new(
            config.platform.base_url.clone(),
            RealtimeCredentials {
                user_id: config.credentials.user_id,
                username: config.credentials.username.clone(),
                credentials: config.credentials.realtime_credentials.clone(),
            },
        ));
        let player = PlayerId::new(config.credentials.user_id);

        let (removal_tx, removal_rx) = mpsc::unbounded_channel();
        let (lobby_tx, lobby_rx) = mpsc::unbounded_channel();
        let lobby_sink: NotificationSink = Arc::new(move |channel, payload, _live| {
            let _ = lobby_tx.send(LobbyDelivery {
                channel: channel.clone(),
                payload,
            });
        });

        Self {
            config,
            client,
            logic,
            registry: TableRegistry::new(),
            hub: NotificationHub::new(),
            player,
            player_channel: ChannelName::player(player),
            removal_tx,
            removal_rx,
            lobby_sink,
            lobby_rx,
        }
    }

    #[must_use]
    pub fn client(&self) -> &Arc<PlatformClient> {
        &self.client
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.registry.len()
    }

    /// Start playing a table. Returns false when it is already being played.
    pub fn watch_table(&self, table: TableId) -> bool {
        if self.registry.contains(table) {
            return false;
        }
        let handle = TableWorker::spawn(
            table,
            Arc::clone(&self.config),
            Arc::clone(&self.client),
            Arc::clone(&self.logic),
            self.removal_tx.clone(),
        );
        self.registry.insert(handle)
    }

    /// Listen for invitations and babysit the registry until shutdown.
    pub async fn run(mut self, shutdown_rx: watch::Receiver<bool>) -> AppResult<()> {
        let endpoint = EndpointConfig::new(
            self.config.platform.realtime_url.clone(),
            self.config.platform.realtime_path.clone(),
        );
        let mut session_config = SessionConfig::new(endpoint)
            .with_auth(self.client.realtime_query())
            .with_auto_restart(true);
        session_config.reconnect_delay =
            Duration::from_millis(self.config.transport.reconnect_delay_ms);
        session_config.probe_timeout =
            Duration::from_millis(self.config.transport.probe_timeout_ms);

        let session = self
            .hub
            .create_session(session_config, Arc::clone(&self.lobby_sink));
        if let Err(err) = session.subscribe(&[self.player_channel.clone()]).await {
            warn!(error = %err, "lobby subscribe deferred");
        }
        info!(player = %self.player, "lobby listener started");

        let dispatch_timeout = Duration::from_millis(self.config.tables.dispatch_timeout_ms);
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            self.hub.dispatch(true, Some(dispatch_timeout)).await;
            self.drain_lobby();
            self.drain_removals().await;
        }

        info!("shutting down");
        self.registry.shutdown_all().await;
        self.hub.cleanup().await;
        Ok(())
    }

    fn drain_lobby(&mut self) {
        let mut invitations = Vec::new();
        while let Ok(delivery) = self.lobby_rx.try_recv() {
            if delivery.channel != self.player_channel {
                debug!(channel = %delivery.channel, "ignoring lobby delivery");
                continue;
            }
            let envelope: NotificationEnvelope = match serde_json::from_value(delivery.payload) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(error = %err, "dropping undecodable lobby envelope");
                    continue;
                }
            };
            for message in &envelope.data {
                match invitation_table(message) {
                    Some(table) => invitations.push(table),
                    None => debug!(kind = %message.kind, "ignoring lobby notification"),
                }
            }
        }
        for table in invitations {
            if self.watch_table(table) {
                info!(%table, "invitation accepted, worker spawned");
            }
        }
    }

    async fn drain_removals(&mut self) {
        while let Ok(table) = self.removal_rx.try_recv() {
            if let Some(handle) = self.registry.remove(table) {
                handle.shutdown().await;
            }
        }
    }
}

/// Table id carried by an invitation on the player channel, if this message
/// is one.
fn invitation_table(message: &NotificationMessage) -> Option<TableId> {
    if message.kind != "tableInvitation" {
        return None;
    }
    let raw = message
        .args
        .get("table_id")
        .or_else(|| message.args.get("id"))?;
    match raw {
        Value::Number(n) => n.as_u64().map(TableId::new),
        Value::String(s) => s.parse().ok().map(TableId::new),
        _ => None,
    }
}
