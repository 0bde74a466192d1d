//! Per-lobby turn loop.
//!
//! `WAITING_ACTIONS -> RESOLVING -> BROADCASTING -> WAITING_ACTIONS`, until `ENDED`.

use std::sync::Arc;
use std::time::Duration;

use optimax_core::{agent_update, spectator_update, GameEngine, GameStatus, MapMemory};
use optimax_protocol::{Action, AgentSlot, GameOver, GameOverReason, LobbyId, TickEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::mailbox::Mailbox;
use super::GameOutcome;
use crate::controller::{ClientId, Controller};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    WaitingActions,
    Resolving,
    Broadcasting,
    Ended,
}

/// Sent to a running coordinator from the network side.
pub enum LobbyCommand {
    Disconnect(AgentSlot),
    AttachSpectator(Box<dyn Controller>),
    DetachSpectator(ClientId),
}

impl std::fmt::Debug for LobbyCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnect(slot) => f.debug_tuple("Disconnect").field(slot).finish(),
            Self::AttachSpectator(c) => f
                .debug_tuple("AttachSpectator")
                .field(&c.client())
                .finish(),
            Self::DetachSpectator(client) => {
                f.debug_tuple("DetachSpectator").field(client).finish()
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnTiming {
    /// How long a window stays open before missing actions become `Stay`
    pub tick_timeout: Duration,
    /// Minimum wall time between two resolved ticks
    pub min_tick_interval: Duration,
}

struct Watcher {
    controller: Box<dyn Controller>,
    memory: MapMemory,
}

pub struct TurnCoordinator {
    lobby: LobbyId,
    engine: GameEngine,
    agents: [Box<dyn Controller>; 2],
    memories: [MapMemory; 2],
    spectators: Vec<Watcher>,
    mailbox: Arc<Mailbox>,
    commands: mpsc::UnboundedReceiver<LobbyCommand>,
    timing: TurnTiming,
    phase: Phase,
}

impl TurnCoordinator {
    pub fn new(
        lobby: LobbyId,
        engine: GameEngine,
        agents: [Box<dyn Controller>; 2],
        mailbox: Arc<Mailbox>,
        commands: mpsc::UnboundedReceiver<LobbyCommand>,
        timing: TurnTiming,
    ) -> Self {
        Self {
            lobby,
            engine,
            agents,
            memories: [MapMemory::new(), MapMemory::new()],
            spectators: Vec::new(),
            mailbox,
            commands,
            timing,
            phase: Phase::WaitingActions,
        }
    }

    /// Spectators present before the first tick; they get the opening broadcast.
    pub fn with_spectators(mut self, spectators: Vec<Box<dyn Controller>>) -> Self {
        self.spectators
            .extend(spectators.into_iter().map(|controller| Watcher {
                controller,
                memory: MapMemory::new(),
            }));
        self
    }

    /// Play the game to its end.
    pub async fn run(mut self) -> GameOutcome {
        info!(lobby = %self.lobby, seed = self.engine.state().seed(), "game started");
        self.broadcast(&[]);

        let game_over = loop {
            let window_opened = Instant::now();
            let actions = match self.collect_actions().await {
                Ok(actions) => actions,
                Err(game_over) => break game_over,
            };

            self.phase = Phase::Resolving;
            let tick = self.engine.state().tick();
            let report = match self.engine.step(actions) {
                Ok(report) => report,
                Err(err) => {
                    error!(lobby = %self.lobby, tick, error = %err, "tick resolution failed");
                    break GameOver {
                        winner: None,
                        reason: GameOverReason::LobbyFault,
                        final_tick: tick,
                    };
                }
            };
            debug!(
                lobby = %self.lobby,
                tick,
                ?actions,
                events = report.events.len(),
                "tick resolved"
            );

            self.phase = Phase::Broadcasting;
            self.broadcast(&report.events);

            if let GameStatus::Finished { winner, reason } = report.status {
                break GameOver {
                    winner: Some(winner),
                    reason,
                    final_tick: self.engine.state().tick(),
                };
            }

            if let Err(game_over) = self.pace(window_opened + self.timing.min_tick_interval).await {
                break game_over;
            }
        };

        self.finish(game_over)
    }

    /// Open the window for the current tick and wait for the barrier.
    async fn collect_actions(&mut self) -> Result<[Action; 2], GameOver> {
        self.phase = Phase::WaitingActions;
        let tick = self.engine.state().tick();
        let expected = AgentSlot::ALL.map(|slot| self.engine.state().agent(slot).is_alive());
        self.mailbox.open(tick, expected);

        for slot in AgentSlot::ALL {
            if let Some(action) = self.agents[slot.index()].submit_action(tick) {
                if let Err(err) = self.mailbox.submit(slot, tick, action) {
                    warn!(
                        lobby = %self.lobby,
                        %slot,
                        error = %err,
                        "local controller submission dropped"
                    );
                }
            }
        }

        let deadline = Instant::now() + self.timing.tick_timeout;
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => {
                    if let Some(game_over) = self.handle_command(command) {
                        self.mailbox.close();
                        return Err(game_over);
                    }
                }
                _ = self.mailbox.wait_complete() => break,
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(lobby = %self.lobby, tick, "action window timed out");
                    break;
                }
            }
        }
        Ok(self.mailbox.close())
    }

    /// Hold the next window until `not_before`, still honouring disconnects.
    async fn pace(&mut self, not_before: Instant) -> Result<(), GameOver> {
        loop {
            if Instant::now() >= not_before {
                return Ok(());
            }
            tokio::select! {
                biased;
                command = self.commands.recv() => {
                    if let Some(game_over) = self.handle_command(command) {
                        return Err(game_over);
                    }
                }
                _ = tokio::time::sleep_until(not_before) => return Ok(()),
            }
        }
    }

    fn handle_command(&mut self, command: Option<LobbyCommand>) -> Option<GameOver> {
        let final_tick = self.engine.state().tick();
        let Some(command) = command else {
            warn!(lobby = %self.lobby, "lobby handle dropped mid-game");
            return Some(GameOver {
                winner: None,
                reason: GameOverReason::LobbyFault,
                final_tick,
            });
        };

        match command {
            LobbyCommand::Disconnect(slot) => {
                let mut gone = [false; 2];
                gone[slot.index()] = true;
                // Disconnects already queued behind this one land in the same instant.
                while let Ok(next) = self.commands.try_recv() {
                    match next {
                        LobbyCommand::Disconnect(other) => gone[other.index()] = true,
                        other => {
                            self.handle_command(Some(other));
                        }
                    }
                }
                if gone == [true, true] {
                    info!(lobby = %self.lobby, "both agents disconnected");
                    Some(GameOver {
                        winner: None,
                        reason: GameOverReason::BothDisconnected,
                        final_tick,
                    })
                } else {
                    info!(lobby = %self.lobby, %slot, "agent disconnected, forfeit");
                    Some(GameOver {
                        winner: Some(slot.opponent()),
                        reason: GameOverReason::Forfeit,
                        final_tick,
                    })
                }
            }
            LobbyCommand::AttachSpectator(controller) => {
                self.attach(controller);
                None
            }
            LobbyCommand::DetachSpectator(client) => {
                self.spectators
                    .retain(|w| w.controller.client() != Some(client));
                None
            }
        }
    }

    /// Add a spectator and bring it up to date with the full world.
    fn attach(&mut self, controller: Box<dyn Controller>) {
        let mut watcher = Watcher {
            controller,
            memory: MapMemory::new(),
        };
        let update = spectator_update(self.engine.state(), &mut watcher.memory, &[]);
        watcher.controller.receive_state(update);
        self.spectators.push(watcher);
    }

    fn broadcast(&mut self, events: &[TickEvent]) {
        let state = self.engine.state();
        for slot in AgentSlot::ALL {
            let update = agent_update(state, slot, &mut self.memories[slot.index()], events);
            self.agents[slot.index()].receive_state(update);
        }
        for watcher in &mut self.spectators {
            let update = spectator_update(state, &mut watcher.memory, events);
            watcher.controller.receive_state(update);
        }
    }

    fn finish(mut self, game_over: GameOver) -> GameOutcome {
        info!(
            lobby = %self.lobby,
            ended_in = ?self.phase,
            winner = ?game_over.winner,
            reason = ?game_over.reason,
            tick = game_over.final_tick,
            "game over"
        );
        self.phase = Phase::Ended;
        for agent in &mut self.agents {
            agent.receive_game_over(game_over);
        }
        for watcher in &mut self.spectators {
            watcher.controller.receive_game_over(game_over);
        }
        GameOutcome {
            lobby: self.lobby,
            game_over,
            announced: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{BotController, Outbound, RemoteController};
    use crate::protocol::ServerMessage;
    use optimax_core::{BotKind, RulesConfig};

    const TIMING: TurnTiming = TurnTiming {
        tick_timeout: Duration::from_millis(500),
        min_tick_interval: Duration::ZERO,
    };

    struct Harness {
        mailbox: Arc<Mailbox>,
        commands: mpsc::UnboundedSender<LobbyCommand>,
        outbound: mpsc::UnboundedReceiver<Outbound>,
        coordinator: TurnCoordinator,
    }

    fn remote_pair(timing: TurnTiming) -> Harness {
        let (out_tx, outbound) = mpsc::unbounded_channel();
        let (commands, cmd_rx) = mpsc::unbounded_channel();
        let mailbox = Arc::new(Mailbox::new());
        let engine = GameEngine::new(11, RulesConfig::default()).unwrap();
        let agents: [Box<dyn Controller>; 2] = [
            Box::new(RemoteController::new(1, out_tx.clone())),
            Box::new(RemoteController::new(2, out_tx)),
        ];
        let coordinator = TurnCoordinator::new(
            LobbyId(1),
            engine,
            agents,
            Arc::clone(&mailbox),
            cmd_rx,
            timing,
        );
        Harness {
            mailbox,
            commands,
            outbound,
            coordinator,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn last_tick(messages: &[Outbound], client: ClientId) -> Option<u64> {
        messages
            .iter()
            .filter(|o| o.client == client)
            .filter_map(|o| match &o.message {
                ServerMessage::StateUpdate(u) => Some(u.tick),
                _ => None,
            })
            .last()
    }

    #[tokio::test(start_paused = true)]
    async fn silent_agents_default_to_stay_after_timeout() {
        let mut h = remote_pair(TIMING);
        let task = tokio::spawn(h.coordinator.run());

        tokio::time::sleep(Duration::from_millis(1_600)).await;
        let messages = drain(&mut h.outbound);
        // Initial state plus three timed-out ticks.
        assert_eq!(last_tick(&messages, 1), Some(3));
        assert_eq!(last_tick(&messages, 2), Some(3));

        h.commands.send(LobbyCommand::Disconnect(AgentSlot::First)).unwrap();
        let outcome = task.await.unwrap();
        assert_eq!(outcome.game_over.reason, GameOverReason::Forfeit);
        assert_eq!(outcome.game_over.winner, Some(AgentSlot::Second));
        assert_eq!(outcome.game_over.final_tick, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn full_mailbox_resolves_without_waiting() {
        let mut h = remote_pair(TurnTiming {
            tick_timeout: Duration::from_secs(3600),
            min_tick_interval: Duration::ZERO,
        });
        let mailbox = Arc::clone(&h.mailbox);
        let task = tokio::spawn(h.coordinator.run());
        tokio::task::yield_now().await;

        assert_eq!(mailbox.open_tick(), Some(0));
        mailbox.submit(AgentSlot::First, 0, Action::Stay).unwrap();
        mailbox.submit(AgentSlot::Second, 0, Action::Stay).unwrap();
        let started = Instant::now();
        while mailbox.open_tick() != Some(1) {
            tokio::task::yield_now().await;
        }
        assert_eq!(started.elapsed(), Duration::ZERO);

        let messages = drain(&mut h.outbound);
        assert_eq!(last_tick(&messages, 1), Some(1));

        h.commands.send(LobbyCommand::Disconnect(AgentSlot::Second)).unwrap();
        let outcome = task.await.unwrap();
        assert_eq!(outcome.game_over.winner, Some(AgentSlot::First));
    }

    #[tokio::test(start_paused = true)]
    async fn simultaneous_disconnects_have_no_winner() {
        let mut h = remote_pair(TIMING);
        h.commands.send(LobbyCommand::Disconnect(AgentSlot::First)).unwrap();
        h.commands.send(LobbyCommand::Disconnect(AgentSlot::Second)).unwrap();
        let outcome = h.coordinator.run().await;
        assert_eq!(outcome.game_over.winner, None);
        assert_eq!(outcome.game_over.reason, GameOverReason::BothDisconnected);

        let over: Vec<_> = drain(&mut h.outbound)
            .into_iter()
            .filter(|o| matches!(o.message, ServerMessage::GameOver(_)))
            .collect();
        assert_eq!(over.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn min_interval_spaces_out_ticks() {
        let mut h = remote_pair(TurnTiming {
            tick_timeout: Duration::from_millis(10),
            min_tick_interval: Duration::from_millis(100),
        });
        let task = tokio::spawn(h.coordinator.run());

        tokio::time::sleep(Duration::from_millis(350)).await;
        let messages = drain(&mut h.outbound);
        // Windows open at 0, 100, 200 and 300 ms; each times out after 10 ms.
        assert_eq!(last_tick(&messages, 1), Some(4));

        h.commands.send(LobbyCommand::Disconnect(AgentSlot::First)).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn late_spectator_gets_the_whole_world() {
        let mut h = remote_pair(TIMING);
        let (spec_tx, mut spec_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(h.coordinator.run());
        tokio::time::sleep(Duration::from_millis(1_200)).await;

        h.commands
            .send(LobbyCommand::AttachSpectator(Box::new(
                crate::controller::SpectatorController::new(50, spec_tx),
            )))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let first = spec_rx.try_recv().unwrap();
        match first.message {
            ServerMessage::StateUpdate(update) => {
                assert_eq!(update.viewer, None);
                assert_eq!(update.tick, 2);
                assert_eq!(update.agents.len(), 2);
                assert!(!update.maps.is_empty());
                assert!(update.maps.iter().all(|m| m.ladder().is_some()));
            }
            other => panic!("expected a state update, got {other:?}"),
        }

        h.commands.send(LobbyCommand::Disconnect(AgentSlot::First)).unwrap();
        task.await.unwrap();
        let tail: Vec<_> = std::iter::from_fn(|| spec_rx.try_recv().ok()).collect();
        assert!(matches!(
            tail.last().map(|o| &o.message),
            Some(ServerMessage::GameOver(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn bot_submits_without_holding_up_the_remote_window() {
        let (out_tx, mut outbound) = mpsc::unbounded_channel();
        let (commands, cmd_rx) = mpsc::unbounded_channel();
        let engine = GameEngine::new(5, RulesConfig::default()).unwrap();
        let agents: [Box<dyn Controller>; 2] = [
            Box::new(BotController::new(BotKind::Hunter.build(AgentSlot::First, 5))),
            Box::new(RemoteController::new(2, out_tx)),
        ];
        let coordinator = TurnCoordinator::new(
            LobbyId(2),
            engine,
            agents,
            Arc::new(Mailbox::new()),
            cmd_rx,
            TurnTiming {
                tick_timeout: Duration::from_millis(50),
                min_tick_interval: Duration::ZERO,
            },
        );
        let task = tokio::spawn(coordinator.run());

        tokio::time::sleep(Duration::from_millis(260)).await;
        let messages = drain(&mut outbound);
        assert_eq!(last_tick(&messages, 2), Some(5));
        commands.send(LobbyCommand::Disconnect(AgentSlot::Second)).unwrap();
        let outcome = task.await.unwrap();
        assert_eq!(outcome.game_over.winner, Some(AgentSlot::First));
        assert_eq!(outcome.game_over.final_tick, 5);
    }
}
