use optimax_protocol::{
    AgentSlot, AgentStatus, AgentView, Cooldown, EnemyId, EnemyView, ItemBonus, ItemId, ItemView,
    Pos,
};
use serde::{Deserialize, Serialize};

use crate::rng::GameRng;
use crate::rules::RulesConfig;

/// Combat stats shared by agents and enemies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Combatant {
    pub health: i32,
    pub max_health: i32,
    pub mana: i32,
    pub max_mana: i32,
    pub damage: i32,
    pub armor: i32,
    pub cooldown: Cooldown,
    /// Negated attack last tick: may neither act nor defend this tick.
    pub penalized: bool,
}

impl Combatant {
    pub fn new(max_health: i32, max_mana: i32, damage: i32, armor: i32) -> Self {
        Self {
            health: max_health,
            max_health,
            mana: max_mana,
            max_mana,
            damage,
            armor,
            cooldown: Cooldown::Ready,
            penalized: false,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Whether a `Stay` this tick would block an incoming attack.
    #[inline]
    pub fn can_defend(&self) -> bool {
        self.cooldown.is_ready() && !self.penalized
    }

    /// Mana committed by an attack or heal: a third of the current pool.
    #[inline]
    pub fn conversion_budget(&self) -> i32 {
        self.mana / 3
    }

    pub fn set_health(&mut self, health: i32) {
        self.health = health.clamp(0, self.max_health);
    }

    pub fn set_mana(&mut self, mana: i32) {
        self.mana = mana.clamp(0, self.max_mana);
    }

    pub fn refill(&mut self) {
        self.health = self.max_health;
        self.mana = self.max_mana;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Agent {
    pub slot: AgentSlot,
    pub depth: u32,
    pub pos: Pos,
    pub stats: Combatant,
    pub level: u32,
    pub experience: u32,
    pub status: AgentStatus,
}

impl Agent {
    pub fn new(slot: AgentSlot, pos: Pos, rules: &RulesConfig) -> Self {
        Self {
            slot,
            depth: 0,
            pos,
            stats: Combatant::new(
                rules.agent_max_health,
                rules.agent_max_mana,
                rules.agent_damage,
                rules.agent_armor,
            ),
            level: 1,
            experience: 0,
            status: AgentStatus::Alive,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.status != AgentStatus::Dead
    }

    pub fn apply_bonus(&mut self, bonus: ItemBonus) {
        let stats = &mut self.stats;
        stats.max_health = (stats.max_health + bonus.max_health).max(1);
        stats.max_mana = (stats.max_mana + bonus.max_mana).max(0);
        stats.damage = (stats.damage + bonus.damage).max(0);
        stats.armor = (stats.armor + bonus.armor).max(0);
        stats.set_health(stats.health + bonus.max_health.max(0));
        stats.set_mana(stats.mana + bonus.max_mana.max(0));
    }

    pub fn view(&self) -> AgentView {
        AgentView {
            slot: self.slot,
            depth: self.depth,
            pos: self.pos,
            health: self.stats.health,
            max_health: self.stats.max_health,
            mana: self.stats.mana,
            max_mana: self.stats.max_mana,
            damage: self.stats.damage,
            armor: self.stats.armor,
            level: self.level,
            experience: self.experience,
            cooldown: self.stats.cooldown,
            penalized: self.stats.penalized,
            status: self.status,
        }
    }
}

/// Which bonus pool a dropped item is rolled from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LootTable {
    Common,
    Rare,
}

impl LootTable {
    pub fn roll(self, rng: &mut GameRng) -> ItemBonus {
        let scale = match self {
            LootTable::Common => 1,
            LootTable::Rare => 3,
        };
        let mut bonus = ItemBonus::default();
        match rng.gen_index(4) {
            0 => bonus.max_health = 5 * scale,
            1 => bonus.max_mana = 4 * scale,
            2 => bonus.damage = scale,
            _ => bonus.armor = scale,
        }
        // Rare items carry a second, smaller roll.
        if self == LootTable::Rare {
            match rng.gen_index(2) {
                0 => bonus.damage += 1,
                _ => bonus.max_health += 5,
            }
        }
        bonus
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Enemy {
    pub id: EnemyId,
    pub depth: u32,
    pub pos: Pos,
    pub stats: Combatant,
    /// Experience granted to the agent credited with the kill.
    pub experience: u32,
    pub loot: LootTable,
}

impl Enemy {
    /// Enemy with stats scaled for `depth`.
    pub fn spawn(id: EnemyId, depth: u32, pos: Pos, loot: LootTable, rules: &RulesConfig) -> Self {
        let d = depth as i32;
        Self {
            id,
            depth,
            pos,
            stats: Combatant::new(
                rules.enemy_health + rules.enemy_health_per_depth * d,
                0,
                rules.enemy_damage + rules.enemy_damage_per_depth * d,
                rules.enemy_armor,
            ),
            experience: rules.enemy_experience + rules.enemy_experience_per_depth * depth,
            loot,
        }
    }

    pub fn view(&self) -> EnemyView {
        EnemyView {
            id: self.id,
            depth: self.depth,
            pos: self.pos,
            health: self.stats.health,
            max_health: self.stats.max_health,
            damage: self.stats.damage,
            cooldown: self.stats.cooldown,
            penalized: self.stats.penalized,
        }
    }
}

/// An item lying in one of a dungeon's fixed slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub depth: u32,
    pub slot: u16,
    pub pos: Pos,
    pub bonus: ItemBonus,
}

impl Item {
    pub fn view(&self) -> ItemView {
        ItemView {
            id: self.id,
            depth: self.depth,
            slot: self.slot,
            pos: self.pos,
            bonus: self.bonus,
        }
    }
}
