use serde::{Deserialize, Serialize};

use crate::{Actor, AgentSlot, EnemyId, ItemBonus, ItemId, Pos};

/// Why an actor's submitted action was replaced by `Stay` before resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DowngradeReason {
    /// Attack submitted while on cooldown.
    Cooldown,
    /// Acting while penalized for a negated attack.
    Penalized,
    /// Attack target farther than the attack range.
    OutOfRange,
    /// Attack aimed at the attacker's own tile.
    OwnTile,
}

/// How a single `AttackTile` resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AttackOutcome {
    /// Full damage on the tile's post-move occupant.
    Hit { defender: Actor, damage: i32 },
    /// Both sides attacked each other: half damage each, both on cooldown.
    Exchange { defender: Actor, damage: i32 },
    /// Defender held its ground and blocked; the attacker is penalized next tick.
    Negated { defender: Actor },
    /// Defender stepped off the tile before the blow landed.
    Missed { defender: Actor },
    /// Nobody was on the tile.
    Whiff,
}

/// Everything notable that happened while resolving a tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TickEvent {
    ActionDowngraded {
        actor: Actor,
        depth: u32,
        reason: DowngradeReason,
    },
    Moved {
        actor: Actor,
        depth: u32,
        from: Pos,
        to: Pos,
    },
    MoveBlocked {
        actor: Actor,
        depth: u32,
        at: Pos,
        toward: Pos,
    },
    Attacked {
        attacker: Actor,
        depth: u32,
        target: Pos,
        mana_spent: i32,
        outcome: AttackOutcome,
    },
    Healed {
        agent: AgentSlot,
        depth: u32,
        amount: i32,
        mana_spent: i32,
    },
    SeparationDamage {
        agent: AgentSlot,
        depth: u32,
        timer: u32,
        damage: i32,
    },
    AgentDied {
        agent: AgentSlot,
        depth: u32,
        pos: Pos,
    },
    EnemyDied {
        enemy: EnemyId,
        depth: u32,
        pos: Pos,
        killer: Option<AgentSlot>,
    },
    ExperienceGained {
        agent: AgentSlot,
        depth: u32,
        amount: u32,
    },
    LevelUp {
        agent: AgentSlot,
        depth: u32,
        level: u32,
    },
    ItemPickedUp {
        agent: AgentSlot,
        depth: u32,
        item: ItemId,
        bonus: ItemBonus,
    },
    ItemDropped {
        item: ItemId,
        depth: u32,
        pos: Pos,
    },
    EnemySpawned {
        enemy: EnemyId,
        depth: u32,
        pos: Pos,
    },
    Descended {
        agent: AgentSlot,
        depth: u32,
        pos: Pos,
    },
    LadderRevealed {
        agent: AgentSlot,
        depth: u32,
    },
}

impl TickEvent {
    /// Dungeon level the event happened on.
    pub fn depth(&self) -> u32 {
        match self {
            TickEvent::ActionDowngraded { depth, .. }
            | TickEvent::Moved { depth, .. }
            | TickEvent::MoveBlocked { depth, .. }
            | TickEvent::Attacked { depth, .. }
            | TickEvent::Healed { depth, .. }
            | TickEvent::SeparationDamage { depth, .. }
            | TickEvent::AgentDied { depth, .. }
            | TickEvent::EnemyDied { depth, .. }
            | TickEvent::ExperienceGained { depth, .. }
            | TickEvent::LevelUp { depth, .. }
            | TickEvent::ItemPickedUp { depth, .. }
            | TickEvent::ItemDropped { depth, .. }
            | TickEvent::EnemySpawned { depth, .. }
            | TickEvent::Descended { depth, .. }
            | TickEvent::LadderRevealed { depth, .. } => *depth,
        }
    }

    /// Agent the event is primarily about, if any.
    pub fn subject(&self) -> Option<AgentSlot> {
        match self {
            TickEvent::ActionDowngraded { actor, .. } | TickEvent::Moved { actor, .. } => {
                actor.agent()
            }
            TickEvent::MoveBlocked { actor, .. } => actor.agent(),
            TickEvent::Attacked { attacker, .. } => attacker.agent(),
            TickEvent::Healed { agent, .. }
            | TickEvent::SeparationDamage { agent, .. }
            | TickEvent::AgentDied { agent, .. }
            | TickEvent::ExperienceGained { agent, .. }
            | TickEvent::LevelUp { agent, .. }
            | TickEvent::ItemPickedUp { agent, .. }
            | TickEvent::Descended { agent, .. }
            | TickEvent::LadderRevealed { agent, .. } => Some(*agent),
            TickEvent::EnemyDied { killer, .. } => *killer,
            TickEvent::ItemDropped { .. } | TickEvent::EnemySpawned { .. } => None,
        }
    }

    /// Whether an agent standing on `depth` gets to see this event.
    ///
    /// Agents see what happens on their own level plus anything about themselves; ladder
    /// reveals stay private to the agent that found the ladder.
    pub fn visible_to(&self, slot: AgentSlot, depth: u32) -> bool {
        match self {
            TickEvent::LadderRevealed { agent, .. } => *agent == slot,
            _ => self.depth() == depth || self.subject() == Some(slot),
        }
    }
}
