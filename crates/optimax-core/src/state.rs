use std::collections::BTreeSet;

use optimax_protocol::{Actor, AgentSlot, EnemyId, ItemId, Pos, TickEvent};
use tracing::debug;

use crate::entities::{Agent, Combatant, Enemy, Item, LootTable};
use crate::rng::GameRng;
use crate::rules::RulesConfig;
use crate::world::{Dungeon, World};
use crate::worldgen::{WorldGenConfig, WorldGenError, WorldGenerator};

/// Canonical state of one game. Owned by exactly one engine and mutated only while a tick
/// is being resolved.
#[derive(Clone, Debug)]
pub struct GameState {
    pub(crate) tick: u64,
    pub(crate) seed: u64,
    pub(crate) rules: RulesConfig,
    pub(crate) world: World,
    pub(crate) agents: [Agent; 2],
    pub(crate) enemies: Vec<Enemy>,
    pub(crate) items: Vec<Item>,
    pub(crate) separation_timer: u32,
    /// Depths on which each agent has spotted the ladder.
    pub(crate) revealed: [BTreeSet<u32>; 2],
    pub(crate) rng: GameRng,
    generator: WorldGenerator,
    next_enemy_id: u32,
    next_item_id: u32,
}

impl GameState {
    /// Build the starting state: depth 0 generated, both agents on their spawn tiles.
    pub fn new(seed: u64, rules: RulesConfig) -> Result<Self, WorldGenError> {
        let generator = WorldGenerator::new(seed, WorldGenConfig::from(&rules));
        let first = generator.generate(0)?;
        let spawns = first.spawns();

        let mut state = Self {
            tick: 0,
            seed,
            agents: [
                Agent::new(AgentSlot::First, spawns[0], &rules),
                Agent::new(AgentSlot::Second, spawns[1], &rules),
            ],
            rules,
            world: World::default(),
            enemies: Vec::new(),
            items: Vec::new(),
            separation_timer: 0,
            revealed: [BTreeSet::new(), BTreeSet::new()],
            rng: GameRng::seed_from_u64(seed),
            generator,
            next_enemy_id: 0,
            next_item_id: 0,
        };
        state.install_dungeon(first);
        state.reveal_ladders(&mut Vec::new());
        Ok(state)
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn dungeon(&self, depth: u32) -> Option<&Dungeon> {
        self.world.get(depth)
    }

    pub fn agents(&self) -> &[Agent; 2] {
        &self.agents
    }

    pub fn agent(&self, slot: AgentSlot) -> &Agent {
        &self.agents[slot.index()]
    }

    pub(crate) fn agent_mut(&mut self, slot: AgentSlot) -> &mut Agent {
        &mut self.agents[slot.index()]
    }

    pub fn enemies(&self) -> &[Enemy] {
        &self.enemies
    }

    pub fn enemy(&self, id: EnemyId) -> Option<&Enemy> {
        self.enemies.iter().find(|e| e.id == id)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn separation_timer(&self) -> u32 {
        self.separation_timer
    }

    pub fn ladder_revealed(&self, slot: AgentSlot, depth: u32) -> bool {
        self.revealed[slot.index()].contains(&depth)
    }

    /// Live items on `depth`. Never exceeds the dungeon's slot count.
    pub fn items_on(&self, depth: u32) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(move |i| i.depth == depth)
    }

    pub fn enemies_on(&self, depth: u32) -> impl Iterator<Item = &Enemy> {
        self.enemies.iter().filter(move |e| e.depth == depth)
    }

    /// Every living actor in resolution order: agents by slot, then enemies by id.
    pub fn actors(&self) -> Vec<Actor> {
        let mut actors: Vec<Actor> = self
            .agents
            .iter()
            .filter(|a| a.is_alive())
            .map(|a| Actor::Agent(a.slot))
            .collect();
        actors.extend(self.enemies.iter().map(|e| Actor::Enemy(e.id)));
        actors
    }

    pub fn locate(&self, actor: Actor) -> Option<(u32, Pos)> {
        match actor {
            Actor::Agent(slot) => {
                let agent = self.agent(slot);
                agent.is_alive().then_some((agent.depth, agent.pos))
            }
            Actor::Enemy(id) => self.enemy(id).map(|e| (e.depth, e.pos)),
        }
    }

    pub fn combatant(&self, actor: Actor) -> Option<&Combatant> {
        match actor {
            Actor::Agent(slot) => Some(&self.agent(slot).stats),
            Actor::Enemy(id) => self.enemy(id).map(|e| &e.stats),
        }
    }

    pub(crate) fn combatant_mut(&mut self, actor: Actor) -> Option<&mut Combatant> {
        match actor {
            Actor::Agent(slot) => Some(&mut self.agent_mut(slot).stats),
            Actor::Enemy(id) => self
                .enemies
                .iter_mut()
                .find(|e| e.id == id)
                .map(|e| &mut e.stats),
        }
    }

    pub(crate) fn set_position(&mut self, actor: Actor, pos: Pos) {
        match actor {
            Actor::Agent(slot) => self.agent_mut(slot).pos = pos,
            Actor::Enemy(id) => {
                if let Some(enemy) = self.enemies.iter_mut().find(|e| e.id == id) {
                    enemy.pos = pos;
                }
            }
        }
    }

    /// Living actor standing on `pos` at `depth`, if any.
    pub fn occupant(&self, depth: u32, pos: Pos) -> Option<Actor> {
        self.actors()
            .into_iter()
            .find(|a| self.locate(*a) == Some((depth, pos)))
    }

    pub(crate) fn next_enemy_id(&mut self) -> EnemyId {
        let id = EnemyId(self.next_enemy_id);
        self.next_enemy_id += 1;
        id
    }

    pub(crate) fn next_item_id(&mut self) -> ItemId {
        let id = ItemId(self.next_item_id);
        self.next_item_id += 1;
        id
    }

    /// Generate `depth` on first use and seed its item slots.
    pub(crate) fn ensure_dungeon(&mut self, depth: u32) -> Result<(), WorldGenError> {
        if self.world.contains(depth) {
            return Ok(());
        }
        let dungeon = self.generator.generate(depth)?;
        self.install_dungeon(dungeon);
        Ok(())
    }

    fn install_dungeon(&mut self, dungeon: Dungeon) {
        let depth = dungeon.depth();
        let slots = dungeon.item_slots().to_vec();
        self.world.insert(dungeon);

        let rare_chance = self.rules.rare_chance_at(depth);
        for (slot, pos) in slots.into_iter().enumerate() {
            if !self.rng.gen_bool(self.rules.initial_item_chance) {
                continue;
            }
            let table = if self.rng.gen_bool(rare_chance) {
                LootTable::Rare
            } else {
                LootTable::Common
            };
            let bonus = table.roll(&mut self.rng);
            let id = self.next_item_id();
            self.items.push(Item {
                id,
                depth,
                slot: slot as u16,
                pos,
                bonus,
            });
        }
        debug!(depth, items = self.items_on(depth).count(), "dungeon installed");
    }

    /// Mark ladders that living agents are now close enough to see.
    pub(crate) fn reveal_ladders(&mut self, events: &mut Vec<TickEvent>) {
        let radius = self.rules.ladder_reveal_radius;
        for slot in AgentSlot::ALL {
            let agent = self.agent(slot);
            if !agent.is_alive() {
                continue;
            }
            let depth = agent.depth;
            let Some(dungeon) = self.world.get(depth) else {
                continue;
            };
            let near = agent.pos.manhattan(dungeon.ladder()) <= radius;
            if near && self.revealed[slot.index()].insert(depth) {
                events.push(TickEvent::LadderRevealed { agent: slot, depth });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_on_spawns_at_depth_zero() {
        let state = GameState::new(42, RulesConfig::default()).unwrap();
        let dungeon = state.dungeon(0).unwrap();
        assert_eq!(state.tick(), 0);
        for slot in AgentSlot::ALL {
            let agent = state.agent(slot);
            assert_eq!(agent.depth, 0);
            assert_eq!(agent.pos, dungeon.spawns()[slot.index()]);
            assert_eq!(agent.stats.health, agent.stats.max_health);
        }
        assert_ne!(state.agent(AgentSlot::First).pos, state.agent(AgentSlot::Second).pos);
    }

    #[test]
    fn initial_items_fill_distinct_slots() {
        let rules = RulesConfig {
            initial_item_chance: 1.0,
            ..RulesConfig::default()
        };
        let state = GameState::new(8, rules.clone()).unwrap();
        let items: Vec<_> = state.items_on(0).collect();
        assert_eq!(items.len(), usize::from(rules.item_slots));
        let dungeon = state.dungeon(0).unwrap();
        for item in items {
            assert_eq!(dungeon.item_slots()[usize::from(item.slot)], item.pos);
        }
    }

    #[test]
    fn lazy_generation_is_idempotent() {
        let mut state = GameState::new(3, RulesConfig::default()).unwrap();
        assert!(state.dungeon(1).is_none());
        state.ensure_dungeon(1).unwrap();
        let items = state.items().len();
        state.ensure_dungeon(1).unwrap();
        assert_eq!(state.items().len(), items);
        assert_eq!(state.world().len(), 2);
    }
}
