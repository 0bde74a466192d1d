//! Lobby pairing and lifecycle.
//!
//! `WAITING` (0 or 1 agent) -> `ACTIVE` (both seats taken, game running) -> `ENDED`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use optimax_core::{BotKind, GameEngine, RulesConfig, WorldGenError};
use optimax_protocol::{Action, ActionRequest, AgentSlot, GameOver, LobbyId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::controller::{
    send, BotController, ClientId, Controller, Outbox, RemoteController, SpectatorController,
};
use crate::game::{
    supervise, GameOutcome, LobbyCommand, Mailbox, SubmitError, TurnCoordinator, TurnTiming,
};
use crate::protocol::{JoinRejectReason, ServerMessage};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyStatus {
    Waiting,
    Active,
    Ended,
}

/// Who occupies an agent slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seat {
    Remote(ClientId),
    Bot(BotKind),
}

/// Lobby errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("Lobby {0} not found")]
    LobbyNotFound(LobbyId),
    #[error("Lobby {0} is full")]
    LobbyFull(LobbyId),
    #[error("Lobby {0} has ended")]
    LobbyEnded(LobbyId),
    #[error("Lobby {0} has no room for more spectators")]
    SpectatorsFull(LobbyId),
    #[error("Client is already in a lobby")]
    AlreadyInLobby,
    #[error("Lobby {lobby} could not generate its map: {source}")]
    UngeneratableMap {
        lobby: LobbyId,
        #[source]
        source: WorldGenError,
    },
}

/// Channels into a running game
#[derive(Debug)]
struct LobbyHandle {
    mailbox: Arc<Mailbox>,
    commands: mpsc::UnboundedSender<LobbyCommand>,
}

impl LobbyHandle {
    fn command(&self, lobby: LobbyId, command: LobbyCommand) {
        if self.commands.send(command).is_err() {
            warn!(%lobby, "game task already gone");
        }
    }
}

#[derive(Debug)]
pub struct Lobby {
    id: LobbyId,
    seed: u64,
    /// Creation order; "oldest waiting lobby" is decided by this
    created: u64,
    status: LobbyStatus,
    seats: [Option<Seat>; 2],
    spectators: BTreeSet<ClientId>,
    handle: Option<LobbyHandle>,
    ended_at: Option<Instant>,
    result: Option<GameOver>,
}

impl Lobby {
    pub fn new(id: LobbyId, seed: u64, created: u64) -> Self {
        Self {
            id,
            seed,
            created,
            status: LobbyStatus::Waiting,
            seats: [None; 2],
            spectators: BTreeSet::new(),
            handle: None,
            ended_at: None,
            result: None,
        }
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn status(&self) -> LobbyStatus {
        self.status
    }

    pub fn seat(&self, slot: AgentSlot) -> Option<Seat> {
        self.seats[slot.index()]
    }

    pub fn agent_count(&self) -> usize {
        self.seats.iter().flatten().count()
    }

    pub fn is_full(&self) -> bool {
        self.seats.iter().all(Option::is_some)
    }

    pub fn spectators(&self) -> &BTreeSet<ClientId> {
        &self.spectators
    }

    /// How the game ended; `None` while running or when it never started.
    pub fn result(&self) -> Option<GameOver> {
        self.result
    }

    /// Take the first free seat.
    pub fn join(&mut self, seat: Seat) -> Result<AgentSlot, LobbyError> {
        match self.status {
            LobbyStatus::Ended => return Err(LobbyError::LobbyEnded(self.id)),
            LobbyStatus::Active => return Err(LobbyError::LobbyFull(self.id)),
            LobbyStatus::Waiting => {}
        }
        let slot = AgentSlot::ALL
            .into_iter()
            .find(|slot| self.seats[slot.index()].is_none())
            .ok_or(LobbyError::LobbyFull(self.id))?;
        self.seats[slot.index()] = Some(seat);
        Ok(slot)
    }

    /// Free a seat before the game starts.
    pub fn leave(&mut self, slot: AgentSlot) -> Option<Seat> {
        if self.status != LobbyStatus::Waiting {
            return None;
        }
        self.seats[slot.index()].take()
    }

    pub fn add_spectator(&mut self, client: ClientId, max: usize) -> Result<(), LobbyError> {
        if self.status == LobbyStatus::Ended {
            return Err(LobbyError::LobbyEnded(self.id));
        }
        if self.spectators.len() >= max {
            return Err(LobbyError::SpectatorsFull(self.id));
        }
        self.spectators.insert(client);
        Ok(())
    }

    pub fn remove_spectator(&mut self, client: ClientId) -> bool {
        self.spectators.remove(&client)
    }

    /// Network clients attached to this lobby, agents first.
    pub fn members(&self) -> Vec<ClientId> {
        self.seats
            .iter()
            .filter_map(|seat| match seat {
                Some(Seat::Remote(client)) => Some(*client),
                _ => None,
            })
            .chain(self.spectators.iter().copied())
            .collect()
    }

    fn seats_if_full(&self) -> Option<[Seat; 2]> {
        match self.seats {
            [Some(first), Some(second)] => Some([first, second]),
            _ => None,
        }
    }

    fn activate(&mut self, handle: LobbyHandle) {
        self.status = LobbyStatus::Active;
        self.handle = Some(handle);
    }

    fn end(&mut self, now: Instant, result: Option<GameOver>) {
        self.status = LobbyStatus::Ended;
        self.handle = None;
        self.ended_at = Some(now);
        self.result = result;
    }

    fn state_message(&self) -> ServerMessage {
        ServerMessage::LobbyState {
            lobby: self.id,
            status: self.status,
            agents: self.agent_count() as u8,
            spectators: self.spectators.len() as u16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Agent(AgentSlot),
    Spectator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Membership {
    pub lobby: LobbyId,
    pub role: Role,
}

/// Owns every lobby, pairs joining clients and starts one game task per full lobby.
pub struct LobbyManager {
    lobbies: BTreeMap<LobbyId, Lobby>,
    members: HashMap<ClientId, Membership>,
    rules: RulesConfig,
    seed: Option<u64>,
    timing: TurnTiming,
    max_spectators: usize,
    retention: Duration,
    rng: StdRng,
    created: u64,
    outbox: Outbox,
    outcome_tx: mpsc::UnboundedSender<GameOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<GameOutcome>,
}

impl LobbyManager {
    pub fn new(config: &ServerConfig, outbox: Outbox) -> Self {
        Self::with_rng(config, outbox, StdRng::from_entropy())
    }

    pub fn with_rng(config: &ServerConfig, outbox: Outbox, rng: StdRng) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            lobbies: BTreeMap::new(),
            members: HashMap::new(),
            rules: config.rules.clone(),
            seed: config.seed,
            timing: TurnTiming {
                tick_timeout: config.tick_timeout(),
                min_tick_interval: config.min_tick_interval(),
            },
            max_spectators: config.max_spectators,
            retention: config.lobby_retention(),
            rng,
            created: 0,
            outbox,
            outcome_tx,
            outcome_rx,
        }
    }

    pub fn lobby(&self, id: LobbyId) -> Option<&Lobby> {
        self.lobbies.get(&id)
    }

    pub fn lobbies(&self) -> impl Iterator<Item = &Lobby> {
        self.lobbies.values()
    }

    pub fn membership(&self, client: ClientId) -> Option<Membership> {
        self.members.get(&client).copied()
    }

    /// Join lobby `requested`, or the oldest waiting lobby with a free seat (creating one if
    /// none exists). Filling the second seat starts the game.
    pub fn join(
        &mut self,
        client: ClientId,
        requested: Option<LobbyId>,
    ) -> Result<(LobbyId, AgentSlot), LobbyError> {
        if self.members.contains_key(&client) {
            return Err(LobbyError::AlreadyInLobby);
        }
        let id = match requested {
            Some(id) => id,
            None => match self.oldest_waiting() {
                Some(id) => id,
                None => self.create(),
            },
        };
        let lobby = self
            .lobbies
            .get_mut(&id)
            .ok_or(LobbyError::LobbyNotFound(id))?;
        let slot = lobby.join(Seat::Remote(client))?;
        self.seat_taken(client, id, slot)
    }

    /// Open a fresh lobby with a server-side bot in the second seat and start it at once.
    pub fn join_against_bot(
        &mut self,
        client: ClientId,
        bot: BotKind,
    ) -> Result<(LobbyId, AgentSlot), LobbyError> {
        if self.members.contains_key(&client) {
            return Err(LobbyError::AlreadyInLobby);
        }
        let id = self.create();
        let lobby = self
            .lobbies
            .get_mut(&id)
            .ok_or(LobbyError::LobbyNotFound(id))?;
        let slot = lobby.join(Seat::Remote(client))?;
        lobby.join(Seat::Bot(bot))?;
        self.seat_taken(client, id, slot)
    }

    pub fn spectate(&mut self, client: ClientId, id: LobbyId) -> Result<(), LobbyError> {
        if self.members.contains_key(&client) {
            return Err(LobbyError::AlreadyInLobby);
        }
        let lobby = self
            .lobbies
            .get_mut(&id)
            .ok_or(LobbyError::LobbyNotFound(id))?;
        lobby.add_spectator(client, self.max_spectators)?;
        self.members.insert(
            client,
            Membership {
                lobby: id,
                role: Role::Spectator,
            },
        );
        send(&self.outbox, client, ServerMessage::Spectating { lobby: id });
        if let Some(handle) = &lobby.handle {
            let controller = SpectatorController::new(client, self.outbox.clone());
            handle.command(id, LobbyCommand::AttachSpectator(Box::new(controller)));
        }
        info!(%id, client, "spectator attached");
        self.broadcast_state(id);
        Ok(())
    }

    /// Remove `client` from its lobby. An agent leaving a running game forfeits it.
    pub fn leave(&mut self, client: ClientId) -> bool {
        let Some(membership) = self.members.remove(&client) else {
            return false;
        };
        let id = membership.lobby;
        let Some(lobby) = self.lobbies.get_mut(&id) else {
            return true;
        };

        match (lobby.status, membership.role) {
            (LobbyStatus::Waiting, Role::Agent(slot)) => {
                lobby.leave(slot);
                info!(%id, client, %slot, "agent left waiting lobby");
                if lobby.agent_count() == 0 {
                    self.close_empty(id);
                    return true;
                }
            }
            (LobbyStatus::Active, Role::Agent(slot)) => {
                if let Some(handle) = &lobby.handle {
                    handle.command(id, LobbyCommand::Disconnect(slot));
                }
            }
            (LobbyStatus::Waiting, Role::Spectator) => {
                lobby.remove_spectator(client);
            }
            (LobbyStatus::Active, Role::Spectator) => {
                lobby.remove_spectator(client);
                if let Some(handle) = &lobby.handle {
                    handle.command(id, LobbyCommand::DetachSpectator(client));
                }
            }
            (LobbyStatus::Ended, _) => return true,
        }
        self.broadcast_state(id);
        true
    }

    /// Deposit an action for the agent `client` controls.
    pub fn submit(
        &self,
        client: ClientId,
        tick: u64,
        request: ActionRequest,
    ) -> Result<(), SubmitError> {
        let membership = self.members.get(&client).ok_or(SubmitError::NotAnAgent)?;
        let Role::Agent(slot) = membership.role else {
            return Err(SubmitError::NotAnAgent);
        };
        let handle = self
            .lobbies
            .get(&membership.lobby)
            .and_then(|lobby| lobby.handle.as_ref())
            .ok_or(SubmitError::NotActive)?;
        let action = Action::try_from(request)?;
        handle.mailbox.submit(slot, tick, action)
    }

    /// Record outcomes of games that finished since the last call.
    pub fn poll_outcomes(&mut self) -> Vec<GameOutcome> {
        let mut finished = Vec::new();
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.record_outcome(outcome);
            finished.push(outcome);
        }
        finished
    }

    /// Wait for the next game to finish and record it.
    pub async fn next_outcome(&mut self) -> Option<GameOutcome> {
        let outcome = self.outcome_rx.recv().await?;
        self.record_outcome(outcome);
        Some(outcome)
    }

    /// Drop ended lobbies older than the retention period.
    pub fn reap(&mut self, now: Instant) -> usize {
        let retention = self.retention;
        let before = self.lobbies.len();
        self.lobbies.retain(|_, lobby| match lobby.ended_at {
            Some(ended) => now.duration_since(ended) < retention,
            None => true,
        });
        before - self.lobbies.len()
    }

    fn oldest_waiting(&self) -> Option<LobbyId> {
        self.lobbies
            .values()
            .filter(|l| l.status == LobbyStatus::Waiting && !l.is_full())
            .min_by_key(|l| l.created)
            .map(|l| l.id)
    }

    fn create(&mut self) -> LobbyId {
        let id = loop {
            let id = LobbyId(self.rng.gen_range(1..1_000_000));
            if !self.lobbies.contains_key(&id) {
                break id;
            }
        };
        let seed = match self.seed {
            Some(seed) => seed,
            None => self.rng.gen(),
        };
        self.created += 1;
        self.lobbies.insert(id, Lobby::new(id, seed, self.created));
        info!(%id, seed, "lobby created");
        id
    }

    /// Finish a successful seat reservation: register the member, and start the game when
    /// the lobby is full.
    fn seat_taken(
        &mut self,
        client: ClientId,
        id: LobbyId,
        slot: AgentSlot,
    ) -> Result<(LobbyId, AgentSlot), LobbyError> {
        let Some(lobby) = self.lobbies.get_mut(&id) else {
            return Err(LobbyError::LobbyNotFound(id));
        };

        let engine = match lobby.seats_if_full() {
            Some(_) => match GameEngine::new(lobby.seed, self.rules.clone()) {
                Ok(engine) => Some(engine),
                Err(source) => {
                    warn!(%id, error = %source, "map generation failed");
                    let waiting = lobby.members();
                    lobby.end(Instant::now(), None);
                    for member in waiting.into_iter().filter(|&m| m != client) {
                        self.members.remove(&member);
                        send(
                            &self.outbox,
                            member,
                            ServerMessage::JoinRejected {
                                reason: JoinRejectReason::UngeneratableMap,
                            },
                        );
                    }
                    return Err(LobbyError::UngeneratableMap { lobby: id, source });
                }
            },
            None => None,
        };

        self.members.insert(
            client,
            Membership {
                lobby: id,
                role: Role::Agent(slot),
            },
        );
        send(&self.outbox, client, ServerMessage::LobbyJoined { lobby: id, slot });
        info!(%id, client, %slot, "agent joined");

        match engine {
            Some(engine) => self.start(id, engine),
            None => self.broadcast_state(id),
        }
        Ok((id, slot))
    }

    fn start(&mut self, id: LobbyId, engine: GameEngine) {
        let Some(lobby) = self.lobbies.get_mut(&id) else {
            return;
        };
        let Some(seats) = lobby.seats_if_full() else {
            return;
        };

        let agents = AgentSlot::ALL.map(|slot| -> Box<dyn Controller> {
            match seats[slot.index()] {
                Seat::Remote(client) => {
                    Box::new(RemoteController::new(client, self.outbox.clone()))
                }
                Seat::Bot(kind) => Box::new(BotController::new(kind.build(slot, lobby.seed))),
            }
        });
        let spectators = lobby
            .spectators
            .iter()
            .map(|&client| -> Box<dyn Controller> {
                Box::new(SpectatorController::new(client, self.outbox.clone()))
            })
            .collect();

        let mailbox = Arc::new(Mailbox::new());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let coordinator = TurnCoordinator::new(
            id,
            engine,
            agents,
            Arc::clone(&mailbox),
            command_rx,
            self.timing,
        )
        .with_spectators(spectators);

        lobby.activate(LobbyHandle { mailbox, commands });
        self.broadcast_state(id);

        let task = tokio::spawn(coordinator.run());
        tokio::spawn(supervise(id, task, self.outcome_tx.clone()));
    }

    fn record_outcome(&mut self, outcome: GameOutcome) {
        let id = outcome.lobby;
        let Some(lobby) = self.lobbies.get_mut(&id) else {
            return;
        };
        let members = lobby.members();
        if !outcome.announced {
            for &member in &members {
                send(&self.outbox, member, ServerMessage::GameOver(outcome.game_over));
            }
        }
        lobby.end(Instant::now(), Some(outcome.game_over));
        let state = lobby.state_message();
        for member in members {
            send(&self.outbox, member, state.clone());
        }
        self.members.retain(|_, m| m.lobby != id);
        info!(
            %id,
            winner = ?outcome.game_over.winner,
            reason = ?outcome.game_over.reason,
            "lobby ended"
        );
    }

    /// Remove a waiting lobby nobody plays in.
    fn close_empty(&mut self, id: LobbyId) {
        let Some(mut lobby) = self.lobbies.remove(&id) else {
            return;
        };
        lobby.end(Instant::now(), None);
        let state = lobby.state_message();
        for member in lobby.members() {
            self.members.remove(&member);
            send(&self.outbox, member, state.clone());
        }
        info!(%id, "empty lobby removed");
    }

    fn broadcast_state(&self, id: LobbyId) {
        let Some(lobby) = self.lobbies.get(&id) else {
            return;
        };
        let state = lobby.state_message();
        for member in lobby.members() {
            send(&self.outbox, member, state.clone());
        }
    }
}
