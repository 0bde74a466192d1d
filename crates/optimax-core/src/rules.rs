use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every gameplay constant. Missing fields in a loaded config fall back to the defaults below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    // Map
    pub width: u32,
    pub height: u32,
    /// Chance for each interior tile to start as a wall.
    pub wall_density: f32,
    /// Fixed number of item slots per dungeon.
    pub item_slots: u16,
    /// Chance for each item slot to start filled.
    pub initial_item_chance: f32,
    pub max_gen_attempts: u32,
    /// Manhattan distance at which an agent spots the ladder.
    pub ladder_reveal_radius: u32,

    // Agents
    pub agent_max_health: i32,
    pub agent_max_mana: i32,
    pub agent_damage: i32,
    pub agent_armor: i32,
    pub mana_regen_per_tick: i32,

    // Combat
    pub attack_range: u32,
    /// Bonus damage per point of mana spent on an attack.
    pub mana_damage_ratio: i32,
    /// Health restored per point of mana spent on a heal.
    pub heal_ratio: i32,
    /// Ticks a mutual exchange locks both sides out of attacking and defending.
    pub exchange_cooldown: u8,
    pub separation_damage_per_tick: i32,

    // Progression
    pub xp_per_level: u32,
    pub level_health_increment: i32,
    pub level_mana_increment: i32,
    pub level_damage_increment: i32,

    // Enemies
    pub spawn_chance: f32,
    pub max_enemies: usize,
    pub spawn_min_distance: u32,
    pub enemy_health: i32,
    pub enemy_damage: i32,
    pub enemy_armor: i32,
    pub enemy_experience: u32,
    pub enemy_health_per_depth: i32,
    pub enemy_damage_per_depth: i32,
    pub enemy_experience_per_depth: u32,

    // Loot
    pub drop_chance: f32,
    pub rare_loot_chance: f32,
    pub rare_loot_chance_per_depth: f32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            width: 24,
            height: 16,
            wall_density: 0.18,
            item_slots: 6,
            initial_item_chance: 0.5,
            max_gen_attempts: 32,
            ladder_reveal_radius: 4,

            agent_max_health: 100,
            agent_max_mana: 30,
            agent_damage: 10,
            agent_armor: 0,
            mana_regen_per_tick: 1,

            attack_range: 1,
            mana_damage_ratio: 1,
            heal_ratio: 2,
            exchange_cooldown: 3,
            separation_damage_per_tick: 1,

            xp_per_level: 10,
            level_health_increment: 10,
            level_mana_increment: 5,
            level_damage_increment: 2,

            spawn_chance: 0.08,
            max_enemies: 4,
            spawn_min_distance: 4,
            enemy_health: 20,
            enemy_damage: 4,
            enemy_armor: 0,
            enemy_experience: 5,
            enemy_health_per_depth: 6,
            enemy_damage_per_depth: 1,
            enemy_experience_per_depth: 2,

            drop_chance: 0.4,
            rare_loot_chance: 0.05,
            rare_loot_chance_per_depth: 0.05,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RulesError {
    #[error("map must be at least 5x5, got {width}x{height}")]
    MapTooSmall { width: u32, height: u32 },
    #[error("{name} must be within [0, 1], got {value}")]
    BadProbability { name: &'static str, value: f32 },
    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: i32 },
    #[error("{name} must be positive")]
    Zero { name: &'static str },
}

impl RulesConfig {
    pub fn validate(&self) -> Result<(), RulesError> {
        if self.width < 5 || self.height < 5 {
            return Err(RulesError::MapTooSmall {
                width: self.width,
                height: self.height,
            });
        }

        for (name, value) in [
            ("wall_density", self.wall_density),
            ("initial_item_chance", self.initial_item_chance),
            ("spawn_chance", self.spawn_chance),
            ("drop_chance", self.drop_chance),
            ("rare_loot_chance", self.rare_loot_chance),
            ("rare_loot_chance_per_depth", self.rare_loot_chance_per_depth),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RulesError::BadProbability { name, value });
            }
        }

        for (name, value) in [
            ("agent_damage", self.agent_damage),
            ("agent_armor", self.agent_armor),
            ("agent_max_mana", self.agent_max_mana),
            ("mana_regen_per_tick", self.mana_regen_per_tick),
            ("mana_damage_ratio", self.mana_damage_ratio),
            ("heal_ratio", self.heal_ratio),
            ("separation_damage_per_tick", self.separation_damage_per_tick),
            ("enemy_damage", self.enemy_damage),
            ("enemy_armor", self.enemy_armor),
        ] {
            if value < 0 {
                return Err(RulesError::Negative { name, value });
            }
        }

        if self.agent_max_health <= 0 {
            return Err(RulesError::Zero {
                name: "agent_max_health",
            });
        }
        if self.enemy_health <= 0 {
            return Err(RulesError::Zero {
                name: "enemy_health",
            });
        }
        if self.xp_per_level == 0 {
            return Err(RulesError::Zero {
                name: "xp_per_level",
            });
        }
        if self.attack_range == 0 {
            return Err(RulesError::Zero {
                name: "attack_range",
            });
        }
        if self.max_gen_attempts == 0 {
            return Err(RulesError::Zero {
                name: "max_gen_attempts",
            });
        }
        Ok(())
    }

    /// Chance for an enemy spawned at `depth` to carry the rare loot table.
    pub fn rare_chance_at(&self, depth: u32) -> f32 {
        (self.rare_loot_chance + self.rare_loot_chance_per_depth * depth as f32).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(RulesConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let rules: RulesConfig = serde_json::from_str(r#"{"width": 40, "spawn_chance": 0.5}"#)
            .expect("parse partial rules");
        assert_eq!(rules.width, 40);
        assert_eq!(rules.spawn_chance, 0.5);
        assert_eq!(rules.height, RulesConfig::default().height);
    }

    #[test]
    fn rejects_bad_values() {
        let rules = RulesConfig {
            drop_chance: 1.5,
            ..RulesConfig::default()
        };
        assert!(matches!(
            rules.validate(),
            Err(RulesError::BadProbability {
                name: "drop_chance",
                ..
            })
        ));

        let rules = RulesConfig {
            width: 3,
            ..RulesConfig::default()
        };
        assert!(matches!(
            rules.validate(),
            Err(RulesError::MapTooSmall { .. })
        ));
    }

    #[test]
    fn rare_chance_grows_with_depth() {
        let rules = RulesConfig::default();
        assert!(rules.rare_chance_at(3) > rules.rare_chance_at(0));
        assert!(rules.rare_chance_at(1000) <= 1.0);
    }
}
