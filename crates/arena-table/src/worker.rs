//! One table's lifecycle on its own task.
//!
//! The worker listens on two realtime sessions (the main server's general
//! session from birth, the assigned gameserver's session once one exists),
//! sequences inbound envelopes per channel, and drives the table through
//! join, start, play, and finish from the platform's own status reports.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use arena_client::{GameError, GameLogic, PlatformClient, TurnContext};
use arena_common::config::AppConfig;
use arena_core::{
    ChannelName, GameState, Notification, NotificationEnvelope, PlayerId, SeatStatus, TableId,
    TableInfos, TableStatus,
};
use arena_transport::{EndpointConfig, NotificationHub, NotificationSink, SessionConfig};

use crate::registry::TableHandle;

/// One raw notification as forwarded out of the dispatch callback.
struct Delivery {
    channel: ChannelName,
    payload: Value,
    live: bool,
}

/// Worker driving a single table.
pub struct TableWorker {
    table: TableId,
    player: PlayerId,
    table_channel: ChannelName,
    config: Arc<AppConfig>,
    client: Arc<PlatformClient>,
    logic: Arc<dyn GameLogic>,
    hub: NotificationHub,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    sink: NotificationSink,
    game_session_open: bool,
    history_replayed: bool,
    infos: Option<TableInfos>,
    game_state: GameState,
    last_packet: HashMap<ChannelName, u64>,
    accepted_start: bool,
    finished_at: Option<Instant>,
}

impl TableWorker {
    /// Spawn a worker for `table`; the returned handle is what the registry
    /// tracks. The worker announces its own exit on `removal_tx`.
    pub fn spawn(
        table: TableId,
        config: Arc<AppConfig>,
        client: Arc<PlatformClient>,
        logic: Arc<dyn GameLogic>,
        removal_tx: mpsc::UnboundedSender<TableId>,
    ) -> Arc<TableHandle> {
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let sink: NotificationSink = Arc::new(move |channel, payload, live| {
            let _ = delivery_tx.send(Delivery {
                channel: channel.clone(),
                payload,
                live,
            });
        });

        let player = PlayerId::new(config.credentials.user_id);
        let worker = Self {
            table,
            player,
            table_channel: ChannelName::table(table),
            config,
            client,
            logic,
            hub: NotificationHub::new(),
            deliveries: delivery_rx,
            sink,
            game_session_open: false,
            history_replayed: false,
            infos: None,
            game_state: GameState::default(),
            last_packet: HashMap::new(),
            accepted_start: false,
            finished_at: None,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            worker.run(shutdown_rx).await;
            let _ = removal_tx.send(table);
        });
        Arc::new(TableHandle::new(table, shutdown_tx, task))
    }

    async fn run(mut self, shutdown_rx: watch::Receiver<bool>) {
        info!(table = %self.table, "table worker starting");
        if let Err(err) = self.initialize().await {
            error!(table = %self.table, error = %err, "table worker failed to start");
            self.hub.cleanup().await;
            return;
        }

        let dispatch_timeout = Duration::from_millis(self.config.tables.dispatch_timeout_ms);
        let poll_interval = Duration::from_millis(self.config.tables.status_poll_ms);
        let grace = Duration::from_millis(self.config.tables.finish_grace_ms);
        let mut next_poll = Instant::now() + poll_interval;

        loop {
            if *shutdown_rx.borrow() {
                info!(table = %self.table, "table worker shutting down");
                break;
            }

            self.hub.dispatch(true, Some(dispatch_timeout)).await;
            self.drain_deliveries().await;

            if let Some(finished_at) = self.finished_at {
                if finished_at.elapsed() >= grace {
                    info!(table = %self.table, "table finished");
                    break;
                }
                // Trailing notifications only; no need to re-poll status.
                continue;
            }

            if Instant::now() >= next_poll {
                next_poll = Instant::now() + poll_interval;
                if let Err(err) = self.refresh_table_infos().await {
                    warn!(table = %self.table, error = %err, "status poll failed");
                }
            }
        }

        self.hub.cleanup().await;
    }

    /// Open the general session, subscribe the table channel, and take the
    /// first look at the table's status.
    async fn initialize(&mut self) -> Result<(), arena_client::ClientError> {
        let endpoint = EndpointConfig::new(
            self.config.platform.realtime_url.clone(),
            self.config.platform.realtime_path.clone(),
        );
        let session = self
            .hub
            .create_session(self.session_config(endpoint), Arc::clone(&self.sink));
        if let Err(err) = session.subscribe(&[self.table_channel.clone()]).await {
            warn!(table = %self.table, error = %err, "general subscribe deferred");
        }

        self.refresh_table_infos().await
    }

    async fn refresh_table_infos(&mut self) -> Result<(), arena_client::ClientError> {
        let infos = self.client.table_infos(self.table).await?;
        self.apply_table_infos(infos).await;
        Ok(())
    }

    async fn drain_deliveries(&mut self) {
        while let Ok(delivery) = self.deliveries.try_recv() {
            let envelope: NotificationEnvelope = match serde_json::from_value(delivery.payload) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(table = %self.table, error = %err, "dropping undecodable envelope");
                    continue;
                }
            };
            if delivery.channel != self.table_channel {
                debug!(channel = %delivery.channel, "ignoring envelope on foreign channel");
                continue;
            }
            self.handle_envelope(envelope, delivery.live).await;
        }
    }

    async fn handle_envelope(&mut self, envelope: NotificationEnvelope, live: bool) {
        if !self.should_deliver(&envelope.channel, envelope.packet_id) {
            debug!(
                channel = %envelope.channel,
                packet_id = envelope.packet_id,
                "dropping stale notification"
            );
            return;
        }
        for message in &envelope.data {
            match Notification::classify(message) {
                Ok(notification) => self.handle_notification(notification, live).await,
                Err(err) => {
                    warn!(table = %self.table, error = %err, "unusable notification payload");
                }
            }
        }
    }

    /// Packet sequencing: id `0` always delivers; otherwise only ids
    /// strictly greater than the last seen advance the channel.
    fn should_deliver(&mut self, channel: &ChannelName, packet_id: u64) -> bool {
        if packet_id == 0 {
            return true;
        }
        let last = self.last_packet.entry(channel.clone()).or_insert(0);
        if packet_id > *last {
            *last = packet_id;
            true
        } else {
            false
        }
    }

    async fn handle_notification(&mut self, notification: Notification, live: bool) {
        match notification {
            Notification::TableInfosChanged(infos) => Box::pin(self.apply_table_infos(infos)).await,
            Notification::AllPlayersAccepted => {
                if !self.accepted_start {
                    if let Err(err) = self.client.accept_start(self.table).await {
                        warn!(table = %self.table, error = %err, "accept start failed");
                    } else {
                        self.accepted_start = true;
                    }
                }
            }
            Notification::TableDecision(args) => self.consider_decision(&args).await,
            Notification::SimpleNote(note) => {
                info!(table = %self.table, note = note.as_deref().unwrap_or(""), "note");
            }
            Notification::GameStateChange(state) => {
                self.game_state = state;
                if live {
                    self.consider_turn().await;
                }
            }
            Notification::YourTurnAck
            | Notification::WakeupPlayers
            | Notification::UpdateReflexionTime
            | Notification::FinalScore
            | Notification::GameResultNeutralized => {
                debug!(table = %self.table, kind = notification.kind(), "notification");
            }
            Notification::Unhandled { kind } => {
                debug!(table = %self.table, kind = %kind, "unhandled notification type");
            }
        }
    }

    async fn apply_table_infos(&mut self, infos: TableInfos) {
        debug!(table = %self.table, status = ?infos.status, gameserver = %infos.gameserver, "table infos");
        let open_game = !self.game_session_open && infos.has_gameserver();
        self.infos = Some(infos);

        if open_game {
            if let Err(err) = self.open_game_session().await {
                warn!(table = %self.table, error = %err, "could not open game session");
            }
        } else if self.game_session_open && !self.history_replayed {
            // A transient history failure is retried on the fallback poll.
            if let Err(err) = self.replay_history().await {
                warn!(table = %self.table, error = %err, "history replay failed");
            }
        }

        let Some(infos) = self.infos.clone() else {
            return;
        };
        match infos.status {
            TableStatus::Open => {
                match infos.seat(self.player).map(|seat| seat.table_status) {
                    Some(status) if status.needs_join() => {
                        if let Err(err) = self.client.join_game(self.table).await {
                            warn!(table = %self.table, error = %err, "join failed");
                        }
                    }
                    Some(SeatStatus::Play) => {
                        // Seated; waiting for the start button.
                    }
                    other => {
                        debug!(table = %self.table, seat = ?other, "no seat action");
                    }
                }
            }
            TableStatus::Setup => {
                // Invitation was accepted earlier; start confirmation pending.
            }
            TableStatus::Play => {
                self.accepted_start = true;
            }
            TableStatus::AsyncInit => {
                // Turn-based mode is not supported; bail out of the table.
                warn!(table = %self.table, "table switched to turn-based mode, abandoning");
                if let Err(err) = self.client.request_abandon(self.table).await {
                    warn!(table = %self.table, error = %err, "abandon request failed");
                }
            }
            TableStatus::Finished => {
                if self.finished_at.is_none() {
                    info!(table = %self.table, "game finished, entering grace period");
                    self.finished_at = Some(Instant::now());
                }
            }
            TableStatus::Unknown => {
                warn!(table = %self.table, "unknown table status");
            }
        }
    }

    /// First real gameserver assignment: scrape the game page for the
    /// gameserver's realtime endpoint, open a session there, replay missed
    /// history, and look for a turn.
    async fn open_game_session(&mut self) -> Result<(), arena_client::ClientError> {
        let Some(infos) = self.infos.clone() else {
            return Ok(());
        };
        let page = self
            .client
            .game_page(&infos.gameserver, &infos.game_name, self.table)
            .await?;

        if let Some(decision) = &page.decision {
            self.consider_decision(decision).await;
        }

        let endpoint = EndpointConfig::new(page.realtime_url, page.realtime_path);
        let session = self
            .hub
            .create_session(self.session_config(endpoint), Arc::clone(&self.sink));
        if let Err(err) = session.subscribe(&[self.table_channel.clone()]).await {
            warn!(table = %self.table, error = %err, "game subscribe deferred");
        }
        self.game_session_open = true;
        info!(table = %self.table, gameserver = %infos.gameserver, "game session open");

        self.replay_history().await
    }

    /// Replay notifications missed before the game session existed, then
    /// look for a turn. Marks the replay done only on success.
    async fn replay_history(&mut self) -> Result<(), arena_client::ClientError> {
        let Some(infos) = self.infos.clone() else {
            return Ok(());
        };
        let from = self
            .last_packet
            .get(&self.table_channel)
            .copied()
            .unwrap_or(0);
        let history = self
            .client
            .notification_history(&infos.gameserver, &infos.game_name, self.table, from)
            .await?;
        let entries = history.into_entries();
        debug!(table = %self.table, count = entries.len(), "replaying history");
        for envelope in entries {
            self.handle_envelope(envelope, false).await;
        }
        self.history_replayed = true;

        self.consider_turn().await;
        Ok(())
    }

    /// Cast the default vote on a pending decision we have not voted on.
    async fn consider_decision(&mut self, args: &arena_core::DecisionArgs) {
        if !args.is_pending() || args.already_voted() {
            return;
        }
        let Some(vote) = args.default_vote() else {
            warn!(table = %self.table, kind = ?args.decision_type, "unhandled decision type");
            return;
        };
        info!(table = %self.table, kind = ?args.decision_type, vote, "casting table vote");
        if let Err(err) = self.client.decide(self.table, None, u64::from(vote)).await {
            warn!(table = %self.table, error = %err, "vote failed");
        }
    }

    /// Hand the turn to the game logic when the local player is active.
    async fn consider_turn(&mut self) {
        if !self.game_state.is_active(self.player) {
            return;
        }
        let Some(infos) = self.infos.clone() else {
            return;
        };

        if let Err(err) = self
            .client
            .turn_ack(&infos.gameserver, &infos.game_name, self.table)
            .await
        {
            debug!(table = %self.table, error = %err, "turn ack failed");
        }

        let ctx = TurnContext {
            table: self.table,
            gameserver: &infos.gameserver,
            state: &self.game_state,
            client: &self.client,
        };
        match self.logic.on_turn(ctx).await {
            Ok(()) => {}
            Err(GameError::InvalidState(reason)) => {
                warn!(table = %self.table, %reason, "game state invalid, abandoning");
                if let Err(err) = self.client.request_abandon(self.table).await {
                    warn!(table = %self.table, error = %err, "abandon request failed");
                }
            }
            Err(GameError::Client(err)) => {
                warn!(table = %self.table, error = %err, "turn submission failed");
            }
        }
    }

    fn session_config(&self, endpoint: EndpointConfig) -> SessionConfig {
        let mut config = SessionConfig::new(endpoint)
            .with_auth(self.client.realtime_query())
            .with_auto_restart(true);
        config.reconnect_delay = Duration::from_millis(self.config.transport.reconnect_delay_ms);
        config.probe_timeout = Duration::from_millis(self.config.transport.probe_timeout_ms);
        config
    }
}
