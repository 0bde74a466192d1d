//! Running games: the action barrier and the per-lobby turn loop.

mod coordinator;
mod mailbox;

pub use coordinator::{LobbyCommand, Phase, TurnCoordinator, TurnTiming};
pub use mailbox::{Mailbox, SubmitError};

use optimax_protocol::{GameOver, GameOverReason, LobbyId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

/// How a lobby's game ended, reported back to the lobby manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameOutcome {
    pub lobby: LobbyId,
    pub game_over: GameOver,
    /// Whether the coordinator already sent `GAME_OVER` to its members
    pub announced: bool,
}

/// Await a coordinator task and report its outcome. A panicked or cancelled task becomes a
/// `LobbyFault` with no winner; other lobbies keep running.
pub async fn supervise(
    lobby: LobbyId,
    task: JoinHandle<GameOutcome>,
    outcomes: mpsc::UnboundedSender<GameOutcome>,
) {
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(%lobby, error = %err, "lobby task failed");
            GameOutcome {
                lobby,
                game_over: GameOver {
                    winner: None,
                    reason: GameOverReason::LobbyFault,
                    final_tick: 0,
                },
                announced: false,
            }
        }
    };
    // The manager only goes away on shutdown.
    let _ = outcomes.send(outcome);
}
