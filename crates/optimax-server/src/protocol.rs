//! Network protocol messages.
//!
//! Wraps the simulation's view types from `optimax-protocol` with lobby and submission traffic.

use optimax_core::BotKind;
use optimax_protocol::{ActionRequest, AgentSlot, GameOver, LobbyId, StateUpdate};
use serde::{Deserialize, Serialize};

use crate::game::SubmitError;
use crate::lobby::{LobbyError, LobbyStatus};

/// Client-to-server messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Join a specific lobby, or the oldest waiting one when `lobby` is `None`.
    /// With `opponent` set, a fresh lobby is opened against a server-side bot.
    JoinLobby {
        lobby: Option<LobbyId>,
        #[serde(default)]
        opponent: Option<BotKind>,
    },
    /// Attach to a lobby as a read-only observer
    Spectate { lobby: LobbyId },
    /// Leave the current lobby; forfeits a running game
    LeaveLobby,
    /// Action for the tick announced by the last state update
    SubmitAction { tick: u64, action: ActionRequest },
    /// Ping for latency measurement
    Ping { timestamp: u64 },
}

/// Server-to-client messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    LobbyJoined { lobby: LobbyId, slot: AgentSlot },
    Spectating { lobby: LobbyId },
    JoinRejected { reason: JoinRejectReason },
    /// Sent to every member when the lobby changes
    LobbyState {
        lobby: LobbyId,
        status: LobbyStatus,
        agents: u8,
        spectators: u16,
    },
    ActionAccepted { tick: u64 },
    /// The submission was discarded; the agent acts as `Stay` unless it resubmits in time.
    ActionRejected { tick: u64, reason: ActionRejectReason },
    StateUpdate(StateUpdate),
    GameOver(GameOver),
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
}

/// Reasons for rejecting a join or spectate request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinRejectReason {
    LobbyNotFound,
    LobbyFull,
    LobbyEnded,
    SpectatorsFull,
    AlreadyInLobby,
    UngeneratableMap,
}

impl From<&LobbyError> for JoinRejectReason {
    fn from(err: &LobbyError) -> Self {
        match err {
            LobbyError::LobbyNotFound(_) => Self::LobbyNotFound,
            LobbyError::LobbyFull(_) => Self::LobbyFull,
            LobbyError::LobbyEnded(_) => Self::LobbyEnded,
            LobbyError::SpectatorsFull(_) => Self::SpectatorsFull,
            LobbyError::AlreadyInLobby => Self::AlreadyInLobby,
            LobbyError::UngeneratableMap { .. } => Self::UngeneratableMap,
        }
    }
}

/// Reasons for rejecting an action submission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionRejectReason {
    /// The tick is not the one currently open
    StaleTick { expected: u64 },
    /// No action window is open (between ticks or after the game)
    WindowClosed,
    /// The sender does not control an agent in a running game
    NotInGame,
    /// Required direction or target missing
    Malformed,
    RateLimited,
}

impl From<&SubmitError> for ActionRejectReason {
    fn from(err: &SubmitError) -> Self {
        match err {
            SubmitError::StaleTick { expected, .. } => Self::StaleTick {
                expected: *expected,
            },
            SubmitError::WindowClosed | SubmitError::NotExpected(_) => Self::WindowClosed,
            SubmitError::NotAnAgent | SubmitError::NotActive => Self::NotInGame,
            SubmitError::Malformed(_) => Self::Malformed,
        }
    }
}

/// Serialize a client message for network transmission
pub fn serialize_client_message(msg: &ClientMessage) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::encode::to_vec_named(msg)
}

/// Deserialize a client message from network data
pub fn deserialize_client_message(data: &[u8]) -> Result<ClientMessage, rmp_serde::decode::Error> {
    rmp_serde::decode::from_slice(data)
}

/// Serialize a server message for network transmission
pub fn serialize_server_message(msg: &ServerMessage) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::encode::to_vec_named(msg)
}

/// Deserialize a server message from network data
pub fn deserialize_server_message(data: &[u8]) -> Result<ServerMessage, rmp_serde::decode::Error> {
    rmp_serde::decode::from_slice(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimax_protocol::{ActionKind, Direction, GameOverReason, Pos};

    #[test]
    fn roundtrip_submit_action() {
        let msg = ClientMessage::SubmitAction {
            tick: 42,
            action: ActionRequest {
                kind: ActionKind::Attack,
                direction: None,
                target: Some(Pos::new(3, 4)),
            },
        };
        let data = serialize_client_message(&msg).unwrap();
        assert_eq!(deserialize_client_message(&data).unwrap(), msg);
    }

    #[test]
    fn join_without_opponent_field_decodes() {
        #[derive(Serialize)]
        #[serde(tag = "type")]
        enum Legacy {
            JoinLobby { lobby: Option<LobbyId> },
        }
        let data = rmp_serde::encode::to_vec_named(&Legacy::JoinLobby {
            lobby: Some(LobbyId(7)),
        })
        .unwrap();
        assert_eq!(
            deserialize_client_message(&data).unwrap(),
            ClientMessage::JoinLobby {
                lobby: Some(LobbyId(7)),
                opponent: None,
            }
        );
    }

    #[test]
    fn roundtrip_game_over() {
        let msg = ServerMessage::GameOver(GameOver {
            winner: Some(AgentSlot::Second),
            reason: GameOverReason::Forfeit,
            final_tick: 17,
        });
        let data = serialize_server_message(&msg).unwrap();
        assert_eq!(deserialize_server_message(&data).unwrap(), msg);
    }

    #[test]
    fn garbage_is_an_error_not_a_panic() {
        assert!(deserialize_client_message(&[0xc1, 0x00, 0xff]).is_err());
        assert!(deserialize_client_message(&[]).is_err());
    }

    #[test]
    fn move_request_keeps_direction() {
        let msg = ClientMessage::SubmitAction {
            tick: 0,
            action: ActionRequest {
                kind: ActionKind::Move,
                direction: Some(Direction::Left),
                target: None,
            },
        };
        let data = serialize_client_message(&msg).unwrap();
        match deserialize_client_message(&data).unwrap() {
            ClientMessage::SubmitAction { action, .. } => {
                assert_eq!(action.direction, Some(Direction::Left));
            }
            other => panic!("Wrong message type: {other:?}"),
        }
    }
}
