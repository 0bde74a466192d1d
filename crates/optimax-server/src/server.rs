//! Routes decoded client traffic to the lobby manager.
//!
//! Transport agnostic: the network loop feeds it connection events and raw packets, and drains
//! the replies it queues on the outbox.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use optimax_core::BotKind;
use optimax_protocol::{ActionRequest, LobbyId};
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::controller::{send, ClientId, Outbox};
use crate::game::GameOutcome;
use crate::lobby::{LobbyManager, Membership};
use crate::protocol::{deserialize_client_message, ActionRejectReason, ClientMessage, ServerMessage};
use crate::sessions::SessionRegistry;

pub struct Server {
    config: ServerConfig,
    sessions: SessionRegistry,
    lobbies: LobbyManager,
    outbox: Outbox,
}

impl Server {
    pub fn new(config: ServerConfig, outbox: Outbox) -> Self {
        let lobbies = LobbyManager::new(&config, outbox.clone());
        Self::assemble(config, outbox, lobbies)
    }

    /// Server whose lobby ids and seeds come from `rng`.
    pub fn with_rng(config: ServerConfig, outbox: Outbox, rng: StdRng) -> Self {
        let lobbies = LobbyManager::with_rng(&config, outbox.clone(), rng);
        Self::assemble(config, outbox, lobbies)
    }

    fn assemble(config: ServerConfig, outbox: Outbox, lobbies: LobbyManager) -> Self {
        Self {
            sessions: SessionRegistry::new(&config.rate_limit),
            config,
            lobbies,
            outbox,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn lobbies(&self) -> &LobbyManager {
        &self.lobbies
    }

    pub fn is_connected(&self, client: ClientId) -> bool {
        self.sessions.is_connected(client)
    }

    pub fn client_connected(&mut self, client: ClientId, now: Instant) {
        info!(client, "client connected");
        self.sessions.connect(client, now);
    }

    /// Forget the client; an agent in a running game forfeits.
    pub fn client_disconnected(&mut self, client: ClientId) {
        if self.sessions.disconnect(client).is_some() {
            info!(client, "client disconnected");
        }
        self.lobbies.leave(client);
    }

    /// Handle one raw packet. Undecodable input is logged and dropped.
    pub fn handle_packet(&mut self, client: ClientId, data: &[u8], now: Instant) {
        let within_limit = self.sessions.check_rate_limit(client, now);

        let message = match deserialize_client_message(data) {
            Ok(message) => message,
            Err(e) => {
                warn!(client, error = %e, "undecodable message");
                return;
            }
        };

        if !within_limit {
            warn!(client, "rate limit exceeded");
            if let ClientMessage::SubmitAction { tick, .. } = message {
                self.reply(
                    client,
                    ServerMessage::ActionRejected {
                        tick,
                        reason: ActionRejectReason::RateLimited,
                    },
                );
            }
            return;
        }

        self.handle_message(client, message);
    }

    pub fn handle_message(&mut self, client: ClientId, message: ClientMessage) {
        match message {
            ClientMessage::JoinLobby { lobby, opponent } => {
                self.handle_join(client, lobby, opponent)
            }
            ClientMessage::Spectate { lobby } => {
                if let Err(e) = self.lobbies.spectate(client, lobby) {
                    warn!(client, error = %e, "spectate rejected");
                    self.reply(client, ServerMessage::JoinRejected { reason: (&e).into() });
                }
            }
            ClientMessage::LeaveLobby => {
                if !self.lobbies.leave(client) {
                    debug!(client, "leave without a lobby");
                }
            }
            ClientMessage::SubmitAction { tick, action } => {
                self.handle_submit(client, tick, action)
            }
            ClientMessage::Ping { timestamp } => {
                let server_timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or_default();
                self.reply(
                    client,
                    ServerMessage::Pong {
                        client_timestamp: timestamp,
                        server_timestamp,
                    },
                );
            }
        }
    }

    fn handle_join(&mut self, client: ClientId, lobby: Option<LobbyId>, opponent: Option<BotKind>) {
        let joined = match opponent {
            Some(bot) => self.lobbies.join_against_bot(client, bot),
            None => self.lobbies.join(client, lobby),
        };
        if let Err(e) = joined {
            warn!(client, error = %e, "join rejected");
            self.reply(client, ServerMessage::JoinRejected { reason: (&e).into() });
        }
    }

    fn handle_submit(&mut self, client: ClientId, tick: u64, action: ActionRequest) {
        match self.lobbies.submit(client, tick, action) {
            Ok(()) => self.reply(client, ServerMessage::ActionAccepted { tick }),
            Err(e) => {
                warn!(client, tick, error = %e, "action rejected");
                self.reply(
                    client,
                    ServerMessage::ActionRejected {
                        tick,
                        reason: (&e).into(),
                    },
                );
            }
        }
    }

    pub fn membership(&self, client: ClientId) -> Option<Membership> {
        self.lobbies.membership(client)
    }

    /// Record finished games and reap expired lobbies. Called once per network frame.
    pub fn maintain(&mut self, now: tokio::time::Instant) -> Vec<GameOutcome> {
        let finished = self.lobbies.poll_outcomes();
        let reaped = self.lobbies.reap(now);
        if reaped > 0 {
            debug!(reaped, "reaped ended lobbies");
        }
        finished
    }

    /// Wait for the next game to end. Used by tests that drive the server without a network.
    pub async fn next_outcome(&mut self) -> Option<GameOutcome> {
        self.lobbies.next_outcome().await
    }

    fn reply(&self, client: ClientId, message: ServerMessage) {
        send(&self.outbox, client, message);
    }
}
