use rmp_serde::{decode, encode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{GameOver, StateUpdate};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
}

/// Encode any wire value as MessagePack with named fields.
///
/// Named fields keep internally tagged enums decodable and let readers skip fields they
/// do not know about.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec_named(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_state(update: &StateUpdate) -> Result<Vec<u8>, WireError> {
    encode(update)
}

pub fn deserialize_state(bytes: &[u8]) -> Result<StateUpdate, WireError> {
    decode(bytes)
}

pub fn serialize_game_over(game_over: &GameOver) -> Result<Vec<u8>, WireError> {
    encode(game_over)
}

pub fn deserialize_game_over(bytes: &[u8]) -> Result<GameOver, WireError> {
    decode(bytes)
}

/// Deterministic state hash for replay verification and desync checks.
///
/// Hashes the MessagePack-serialized update using FNV-1a 64-bit.
pub fn state_hash(update: &StateUpdate) -> Result<u64, WireError> {
    let bytes = serialize_state(update)?;
    Ok(hash_bytes_fnv1a64(&bytes))
}

/// Deterministic, stable 64-bit hash for raw bytes (FNV-1a).
pub fn hash_bytes_fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Actor, AgentSlot, AgentStatus, AgentView, AttackOutcome, Cooldown, DungeonView,
        GameOverReason, Pos, TickEvent, TileKind,
    };

    fn sample_update() -> StateUpdate {
        StateUpdate {
            tick: 7,
            viewer: Some(AgentSlot::First),
            maps: vec![DungeonView {
                depth: 0,
                width: 3,
                height: 1,
                tiles: vec![TileKind::Wall, TileKind::Floor, TileKind::Ladder],
            }],
            agents: vec![AgentView {
                slot: AgentSlot::First,
                depth: 0,
                pos: Pos::new(1, 0),
                health: 40,
                max_health: 50,
                mana: 9,
                max_mana: 30,
                damage: 5,
                armor: 0,
                level: 1,
                experience: 3,
                cooldown: Cooldown::OnCooldown(2),
                penalized: false,
                status: AgentStatus::Alive,
            }],
            enemies: vec![],
            items: vec![],
            separation_ticks: 0,
            events: vec![TickEvent::Attacked {
                attacker: Actor::Agent(AgentSlot::First),
                depth: 0,
                target: Pos::new(2, 0),
                mana_spent: 3,
                outcome: AttackOutcome::Whiff,
            }],
        }
    }

    #[test]
    fn state_update_survives_messagepack() {
        let update = sample_update();
        let bytes = serialize_state(&update).unwrap();
        assert_eq!(deserialize_state(&bytes).unwrap(), update);
    }

    #[test]
    fn game_over_survives_messagepack() {
        let over = GameOver {
            winner: None,
            reason: GameOverReason::BothDisconnected,
            final_tick: 12,
        };
        let bytes = serialize_game_over(&over).unwrap();
        assert_eq!(deserialize_game_over(&bytes).unwrap(), over);
    }

    #[test]
    fn state_hash_tracks_content() {
        let a = sample_update();
        let mut b = sample_update();
        assert_eq!(state_hash(&a).unwrap(), state_hash(&b).unwrap());
        b.tick += 1;
        assert_ne!(state_hash(&a).unwrap(), state_hash(&b).unwrap());
    }

    #[test]
    fn fnv1a_known_vectors() {
        assert_eq!(hash_bytes_fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(hash_bytes_fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
    }
}
