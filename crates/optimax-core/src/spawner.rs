//! Enemy behaviour, enemy spawning and loot drops.

use std::collections::BTreeSet;

use optimax_protocol::{Action, Actor, AgentSlot, Direction, Pos, TickEvent};
use tracing::trace;

use crate::entities::{Enemy, Item, LootTable};
use crate::state::GameState;

/// Choose an action for every enemy from the pre-tick state.
///
/// Each enemy targets the nearest living agent on its depth (lower slot on ties). In range it
/// attacks the agent's current tile; otherwise it steps along the axis with the larger gap,
/// falling back to the other axis, and stays put when both are blocked.
pub fn enemy_actions(state: &GameState) -> Vec<(Actor, Action)> {
    let range = state.rules().attack_range;
    let occupied: BTreeSet<(u32, Pos)> = state
        .actors()
        .into_iter()
        .filter_map(|a| state.locate(a))
        .collect();

    state
        .enemies()
        .iter()
        .map(|enemy| {
            let action = match nearest_agent(state, enemy) {
                Some(target) if enemy.pos.manhattan(target) <= range => {
                    Action::AttackTile { target }
                }
                Some(target) => approach(state, enemy, target, &occupied),
                None => Action::Stay,
            };
            (Actor::Enemy(enemy.id), action)
        })
        .collect()
}

fn nearest_agent(state: &GameState, enemy: &Enemy) -> Option<Pos> {
    AgentSlot::ALL
        .into_iter()
        .map(|slot| state.agent(slot))
        .filter(|a| a.is_alive() && a.depth == enemy.depth)
        .min_by_key(|a| (enemy.pos.manhattan(a.pos), a.slot))
        .map(|a| a.pos)
}

fn approach(
    state: &GameState,
    enemy: &Enemy,
    target: Pos,
    occupied: &BTreeSet<(u32, Pos)>,
) -> Action {
    let dx = target.x - enemy.pos.x;
    let dy = target.y - enemy.pos.y;
    let horizontal = match dx.signum() {
        1 => Some(Direction::Right),
        -1 => Some(Direction::Left),
        _ => None,
    };
    let vertical = match dy.signum() {
        1 => Some(Direction::Down),
        -1 => Some(Direction::Up),
        _ => None,
    };
    let order = if dx.abs() >= dy.abs() {
        [horizontal, vertical]
    } else {
        [vertical, horizontal]
    };

    let Some(dungeon) = state.dungeon(enemy.depth) else {
        return Action::Stay;
    };
    order
        .into_iter()
        .flatten()
        .find(|d| {
            let next = enemy.pos.step(*d);
            dungeon.is_walkable(next) && !occupied.contains(&(enemy.depth, next))
        })
        .map_or(Action::Stay, |direction| Action::Move { direction })
}

/// Maybe drop loot where an enemy died, into the free item slot nearest the body.
///
/// Slots with an actor standing on them are skipped.
pub fn drop_loot(
    state: &mut GameState,
    depth: u32,
    at: Pos,
    loot: LootTable,
    events: &mut Vec<TickEvent>,
) {
    let drop_chance = state.rules().drop_chance;
    if !state.rng.gen_bool(drop_chance) {
        return;
    }
    let Some(dungeon) = state.dungeon(depth) else {
        return;
    };
    let taken: BTreeSet<u16> = state.items_on(depth).map(|i| i.slot).collect();
    let free = dungeon
        .item_slots()
        .iter()
        .enumerate()
        .filter(|(slot, _)| !taken.contains(&(*slot as u16)))
        .filter(|(_, pos)| state.occupant(depth, **pos).is_none())
        .min_by_key(|(slot, pos)| (pos.manhattan(at), *slot))
        .map(|(slot, pos)| (slot as u16, *pos));
    let Some((slot, pos)) = free else {
        return;
    };

    let bonus = loot.roll(&mut state.rng);
    let id = state.next_item_id();
    state.items.push(Item {
        id,
        depth,
        slot,
        pos,
        bonus,
    });
    events.push(TickEvent::ItemDropped { item: id, depth, pos });
}

/// Roll spawns on every depth that holds a living agent.
///
/// `max_enemies` caps the enemies alive across all depths. Enemies left behind on a depth no
/// agent occupies any more are removed first.
pub fn spawn_enemies(state: &mut GameState, events: &mut Vec<TickEvent>) {
    let depths: BTreeSet<u32> = state
        .agents()
        .iter()
        .filter(|a| a.is_alive())
        .map(|a| a.depth)
        .collect();

    let before = state.enemies.len();
    state.enemies.retain(|e| depths.contains(&e.depth));
    if state.enemies.len() < before {
        trace!(removed = before - state.enemies.len(), "cleared abandoned depths");
    }

    for depth in depths {
        let (spawn_chance, max_enemies, min_distance) = {
            let rules = state.rules();
            (rules.spawn_chance, rules.max_enemies, rules.spawn_min_distance)
        };
        if state.enemies.len() >= max_enemies || !state.rng.gen_bool(spawn_chance) {
            continue;
        }

        let Some(dungeon) = state.dungeon(depth) else {
            continue;
        };
        let agents: Vec<Pos> = state
            .agents()
            .iter()
            .filter(|a| a.is_alive() && a.depth == depth)
            .map(|a| a.pos)
            .collect();
        let ladder = dungeon.ladder();
        let candidates: Vec<Pos> = dungeon
            .walkable_tiles()
            .filter(|p| *p != ladder)
            .filter(|p| agents.iter().all(|a| a.manhattan(*p) >= min_distance))
            .filter(|p| state.occupant(depth, *p).is_none())
            .collect();
        let Some(&pos) = state.rng.choose(&candidates) else {
            trace!(depth, "no room to spawn an enemy");
            continue;
        };

        let rare_chance = state.rules().rare_chance_at(depth);
        let loot = if state.rng.gen_bool(rare_chance) {
            LootTable::Rare
        } else {
            LootTable::Common
        };
        let id = state.next_enemy_id();
        let enemy = Enemy::spawn(id, depth, pos, loot, state.rules());
        state.enemies.push(enemy);
        events.push(TickEvent::EnemySpawned {
            enemy: id,
            depth,
            pos,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RulesConfig;

    #[test]
    fn adjacent_enemy_attacks_agent_tile() {
        let mut state = crate::testing::duel_state_at(Pos::new(2, 2), Pos::new(6, 4));
        crate::testing::add_enemy(&mut state, Pos::new(3, 2));
        let actions = enemy_actions(&state);
        assert_eq!(
            actions[0].1,
            Action::AttackTile {
                target: Pos::new(2, 2)
            }
        );
    }

    #[test]
    fn enemy_closes_along_the_longer_axis() {
        let mut state = crate::testing::duel_state_at(Pos::new(1, 1), Pos::new(7, 5));
        crate::testing::add_enemy(&mut state, Pos::new(5, 2));
        // Both agents are 5 away, so the lower slot is chased: dx = -4, dy = -1.
        let actions = enemy_actions(&state);
        assert_eq!(
            actions[0].1,
            Action::Move {
                direction: Direction::Left
            }
        );
    }

    #[test]
    fn blocked_primary_axis_falls_back() {
        let mut state = crate::testing::duel_state_at(Pos::new(1, 1), Pos::new(7, 5));
        crate::testing::add_enemy(&mut state, Pos::new(4, 2));
        crate::testing::add_enemy(&mut state, Pos::new(3, 2));
        let actions = enemy_actions(&state);
        // The first enemy's left step is occupied, so it goes up instead.
        assert_eq!(
            actions[0].1,
            Action::Move {
                direction: Direction::Up
            }
        );
    }

    #[test]
    fn loot_takes_nearest_free_slot() {
        let rules = RulesConfig {
            drop_chance: 1.0,
            ..crate::testing::arena_rules()
        };
        let mut state = crate::testing::duel_state_with(rules, Pos::new(1, 1), Pos::new(7, 5));
        let slots = state.dungeon(0).unwrap().item_slots().to_vec();
        let mut events = Vec::new();
        drop_loot(&mut state, 0, slots[1], LootTable::Common, &mut events);
        assert_eq!(state.items().len(), 1);
        assert_eq!(state.items()[0].pos, slots[1]);

        // Same spot again: that slot is taken now, so the next nearest one is used.
        drop_loot(&mut state, 0, slots[1], LootTable::Common, &mut events);
        assert_eq!(state.items().len(), 2);
        assert_ne!(state.items()[1].pos, slots[1]);
        assert_ne!(state.items()[0].id, state.items()[1].id);
    }

    #[test]
    fn loot_never_exceeds_slot_cap() {
        let rules = RulesConfig {
            drop_chance: 1.0,
            ..crate::testing::arena_rules()
        };
        let cap = usize::from(rules.item_slots);
        let mut state = crate::testing::duel_state_with(rules, Pos::new(1, 1), Pos::new(7, 5));
        let mut events = Vec::new();
        for _ in 0..cap * 3 {
            drop_loot(&mut state, 0, Pos::new(4, 3), LootTable::Rare, &mut events);
        }
        assert_eq!(state.items_on(0).count(), cap);
    }

    #[test]
    fn spawns_respect_cap_and_distance() {
        let rules = RulesConfig {
            spawn_chance: 1.0,
            max_enemies: 2,
            spawn_min_distance: 3,
            ..crate::testing::arena_rules()
        };
        let mut state = crate::testing::duel_state_with(rules, Pos::new(1, 1), Pos::new(2, 1));
        let mut events = Vec::new();
        for _ in 0..5 {
            spawn_enemies(&mut state, &mut events);
        }
        assert_eq!(state.enemies().len(), 2);
        for enemy in state.enemies() {
            assert!(enemy.pos.manhattan(Pos::new(1, 1)) >= 3);
            assert!(enemy.pos.manhattan(Pos::new(2, 1)) >= 3);
            assert!(state.dungeon(0).unwrap().is_walkable(enemy.pos));
        }
        assert_ne!(state.enemies()[0].pos, state.enemies()[1].pos);
    }

    #[test]
    fn cap_holds_across_split_depths() {
        let rules = RulesConfig {
            spawn_chance: 1.0,
            max_enemies: 2,
            spawn_min_distance: 2,
            ..crate::testing::arena_rules()
        };
        let mut state = crate::testing::duel_state_with(rules, Pos::new(1, 1), Pos::new(7, 5));
        state.ensure_dungeon(1).unwrap();
        state.agent_mut(AgentSlot::First).depth = 1;

        let mut events = Vec::new();
        for _ in 0..5 {
            spawn_enemies(&mut state, &mut events);
            assert!(state.enemies().len() <= 2);
        }
        assert_eq!(state.enemies().len(), 2);
    }

    #[test]
    fn abandoned_depth_loses_its_enemies() {
        let mut state = crate::testing::duel_state_at(Pos::new(1, 1), Pos::new(7, 5));
        crate::testing::add_enemy(&mut state, Pos::new(4, 3));
        state.ensure_dungeon(1).unwrap();
        for slot in AgentSlot::ALL {
            state.agent_mut(slot).depth = 1;
        }

        spawn_enemies(&mut state, &mut Vec::new());
        assert_eq!(state.enemies_on(0).count(), 0);
        assert!(state.enemies().iter().all(|e| e.depth == 1));
    }

    #[test]
    fn loot_skips_slots_under_an_agent() {
        let rules = RulesConfig {
            drop_chance: 1.0,
            ..crate::testing::arena_rules()
        };
        let mut state = crate::testing::duel_state_with(rules, Pos::new(1, 1), Pos::new(7, 5));
        let slots = state.dungeon(0).unwrap().item_slots().to_vec();
        state.agent_mut(AgentSlot::First).pos = slots[0];

        drop_loot(&mut state, 0, slots[0], LootTable::Common, &mut Vec::new());
        assert_eq!(state.items().len(), 1);
        assert_ne!(state.items()[0].pos, slots[0]);
    }
}
