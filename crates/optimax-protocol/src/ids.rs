use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two agent seats in a lobby.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentSlot {
    First,
    Second,
}

impl AgentSlot {
    pub const ALL: [AgentSlot; 2] = [AgentSlot::First, AgentSlot::Second];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            AgentSlot::First => 0,
            AgentSlot::Second => 1,
        }
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(AgentSlot::First),
            1 => Some(AgentSlot::Second),
            _ => None,
        }
    }

    #[inline]
    pub const fn opponent(self) -> Self {
        match self {
            AgentSlot::First => AgentSlot::Second,
            AgentSlot::Second => AgentSlot::First,
        }
    }
}

impl fmt::Display for AgentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentSlot::First => f.write_str("agent-1"),
            AgentSlot::Second => f.write_str("agent-2"),
        }
    }
}

/// Lobby identifier, unique per server process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyId(pub u32);

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lobby-{}", self.0)
    }
}

/// Enemy identifier. Never reused within a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnemyId(pub u32);

/// Item identifier. Never reused within a game, so a picked-up item cannot come back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u32);

/// Anything that can act during a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Actor {
    Agent(AgentSlot),
    Enemy(EnemyId),
}

impl Actor {
    pub fn agent(self) -> Option<AgentSlot> {
        match self {
            Actor::Agent(slot) => Some(slot),
            Actor::Enemy(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_each_others_opponent() {
        for slot in AgentSlot::ALL {
            assert_eq!(slot.opponent().opponent(), slot);
            assert_ne!(slot.opponent(), slot);
            assert_eq!(AgentSlot::from_index(slot.index()), Some(slot));
        }
        assert_eq!(AgentSlot::from_index(2), None);
    }
}
