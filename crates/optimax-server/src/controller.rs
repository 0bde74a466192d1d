//! Who drives an agent slot or watches a lobby.
//!
//! The coordinator only talks to [`Controller`]s, so remote clients, server-side bots and
//! spectators are interchangeable from its point of view.

use optimax_core::bots::Bot;
use optimax_protocol::{Action, GameOver, StateUpdate};
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::ServerMessage;

/// Renet client id
pub type ClientId = u64;

/// A message queued for delivery by the network loop
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    pub client: ClientId,
    pub message: ServerMessage,
}

pub type Outbox = mpsc::UnboundedSender<Outbound>;

/// Queue `message` for `client`. Only fails once the network loop has shut down.
pub fn send(outbox: &Outbox, client: ClientId, message: ServerMessage) {
    if outbox.send(Outbound { client, message }).is_err() {
        debug!(client, "outbound queue closed");
    }
}

pub trait Controller: Send {
    /// Network client behind this controller, if any.
    fn client(&self) -> Option<ClientId>;

    /// Action decided locally for `tick`. Remote clients deposit through the mailbox
    /// instead and return `None`.
    fn submit_action(&mut self, tick: u64) -> Option<Action>;

    fn receive_state(&mut self, update: StateUpdate);

    fn receive_game_over(&mut self, game_over: GameOver);
}

/// An agent played by a network client.
pub struct RemoteController {
    client: ClientId,
    outbox: Outbox,
}

impl RemoteController {
    pub fn new(client: ClientId, outbox: Outbox) -> Self {
        Self { client, outbox }
    }
}

impl Controller for RemoteController {
    fn client(&self) -> Option<ClientId> {
        Some(self.client)
    }

    fn submit_action(&mut self, _tick: u64) -> Option<Action> {
        None
    }

    fn receive_state(&mut self, update: StateUpdate) {
        send(&self.outbox, self.client, ServerMessage::StateUpdate(update));
    }

    fn receive_game_over(&mut self, game_over: GameOver) {
        send(&self.outbox, self.client, ServerMessage::GameOver(game_over));
    }
}

/// An agent played by a scripted bot inside the server.
pub struct BotController {
    bot: Box<dyn Bot>,
    latest: Option<StateUpdate>,
}

impl BotController {
    pub fn new(bot: Box<dyn Bot>) -> Self {
        Self { bot, latest: None }
    }
}

impl Controller for BotController {
    fn client(&self) -> Option<ClientId> {
        None
    }

    fn submit_action(&mut self, tick: u64) -> Option<Action> {
        let update = self.latest.as_ref().filter(|u| u.tick == tick)?;
        Some(self.bot.act(update))
    }

    fn receive_state(&mut self, update: StateUpdate) {
        self.latest = Some(update);
    }

    fn receive_game_over(&mut self, game_over: GameOver) {
        debug!(bot = self.bot.name(), ?game_over, "bot game over");
        self.latest = None;
    }
}

/// A read-only observer. Never submits.
pub struct SpectatorController {
    client: ClientId,
    outbox: Outbox,
}

impl SpectatorController {
    pub fn new(client: ClientId, outbox: Outbox) -> Self {
        Self { client, outbox }
    }
}

impl Controller for SpectatorController {
    fn client(&self) -> Option<ClientId> {
        Some(self.client)
    }

    fn submit_action(&mut self, _tick: u64) -> Option<Action> {
        None
    }

    fn receive_state(&mut self, update: StateUpdate) {
        send(&self.outbox, self.client, ServerMessage::StateUpdate(update));
    }

    fn receive_game_over(&mut self, game_over: GameOver) {
        send(&self.outbox, self.client, ServerMessage::GameOver(game_over));
    }
}
