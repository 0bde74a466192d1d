use std::collections::BTreeMap;

use optimax_protocol::{
    Action, Actor, AgentSlot, AgentStatus, Cooldown, GameOverReason, Pos, TickEvent,
};
use tracing::{debug, info, warn};

use crate::combat::{resolve_actions, DamageLedger, Hit};
use crate::entities::LootTable;
use crate::progression::{award_experience, pick_up_items, regenerate_mana};
use crate::rules::RulesConfig;
use crate::spawner::{drop_loot, enemy_actions, spawn_enemies};
use crate::state::GameState;
use crate::worldgen::WorldGenError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameStatus {
    Running,
    Finished {
        winner: AgentSlot,
        reason: GameOverReason,
    },
}

impl GameStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, GameStatus::Finished { .. })
    }
}

/// Result of resolving one tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// The tick that was just resolved.
    pub tick: u64,
    pub events: Vec<TickEvent>,
    pub status: GameStatus,
}

/// Owns a [`GameState`] and advances it one tick at a time.
#[derive(Clone, Debug)]
pub struct GameEngine {
    state: GameState,
    status: GameStatus,
}

impl GameEngine {
    pub fn new(seed: u64, rules: RulesConfig) -> Result<Self, WorldGenError> {
        Ok(Self::from_state(GameState::new(seed, rules)?))
    }

    pub fn from_state(state: GameState) -> Self {
        Self {
            state,
            status: GameStatus::Running,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Resolve one tick with both agents' actions (`Stay` for anyone who did not submit).
    ///
    /// Order: sanitation, enemy intents, position phase, combat and heals, separation damage,
    /// health and deaths, progression, loot and spawns, descending, cooldown bookkeeping.
    /// Only generating a new depth can fail.
    pub fn step(&mut self, actions: [Action; 2]) -> Result<TickReport, WorldGenError> {
        let tick = self.state.tick;
        if self.status.is_finished() {
            return Ok(TickReport {
                tick,
                events: Vec::new(),
                status: self.status,
            });
        }

        let mut events = Vec::new();
        let start_depths = self.state.agents.each_ref().map(|a| a.depth);

        let mut submitted: BTreeMap<Actor, Action> = AgentSlot::ALL
            .into_iter()
            .map(|slot| (Actor::Agent(slot), actions[slot.index()]))
            .collect();
        submitted.extend(enemy_actions(&self.state));

        let (_, mut ledger) = resolve_actions(&mut self.state, &submitted, &mut events);
        let landing_depths = AgentSlot::ALL.map(|slot| self.landing_depth(slot));
        self.separation_damage(start_depths, landing_depths, &mut ledger, &mut events);
        let kills = self.apply_health(&ledger, &mut events);

        for kill in &kills {
            if let Some(slot) = kill.killer {
                award_experience(&mut self.state, slot, kill.experience, &mut events);
            }
        }
        pick_up_items(&mut self.state, &mut events);
        regenerate_mana(&mut self.state);

        for kill in &kills {
            drop_loot(&mut self.state, kill.depth, kill.pos, kill.loot, &mut events);
        }
        spawn_enemies(&mut self.state, &mut events);

        self.descend(&mut events)?;
        self.state.reveal_ladders(&mut events);
        self.bookkeeping(&ledger);

        self.state.tick += 1;
        self.status = self.check_terminal();
        debug!(tick, events = events.len(), "tick resolved");
        if let GameStatus::Finished { winner, reason } = self.status {
            info!(tick, %winner, ?reason, "game finished");
        }

        Ok(TickReport {
            tick,
            events,
            status: self.status,
        })
    }

    /// Depth `slot` ends the tick on: one deeper when it is standing on its depth's ladder.
    fn landing_depth(&self, slot: AgentSlot) -> u32 {
        let agent = self.state.agent(slot);
        let on_ladder = self
            .state
            .dungeon(agent.depth)
            .is_some_and(|d| d.ladder() == agent.pos);
        if agent.is_alive() && on_ladder {
            agent.depth + 1
        } else {
            agent.depth
        }
    }

    /// The agent left behind on a shallower depth takes damage growing linearly with the
    /// number of consecutive ticks the agents spent apart. A tick that starts or ends with
    /// both agents on one depth resets the count and deals nothing.
    fn separation_damage(
        &mut self,
        start_depths: [u32; 2],
        landing_depths: [u32; 2],
        ledger: &mut DamageLedger,
        events: &mut Vec<TickEvent>,
    ) {
        let [first, second] = start_depths;
        if first == second || landing_depths[0] == landing_depths[1] {
            self.state.separation_timer = 0;
            return;
        }
        self.state.separation_timer += 1;
        let timer = self.state.separation_timer;
        let trailing = if first < second {
            AgentSlot::First
        } else {
            AgentSlot::Second
        };
        let damage = timer as i32 * self.state.rules.separation_damage_per_tick;
        ledger.hits.push(Hit {
            source: None,
            target: Actor::Agent(trailing),
            amount: damage,
        });
        events.push(TickEvent::SeparationDamage {
            agent: trailing,
            depth: start_depths[trailing.index()],
            timer,
            damage,
        });
    }

    /// Heals land first, then all damage at once.
    fn apply_health(&mut self, ledger: &DamageLedger, events: &mut Vec<TickEvent>) -> Vec<Kill> {
        for slot in AgentSlot::ALL {
            let agent = self.state.agent_mut(slot);
            if !agent.is_alive() {
                continue;
            }
            let healed = agent.stats.health + ledger.healing_for(slot);
            agent.stats.set_health(healed);
            let hurt = agent.stats.health - ledger.damage_to(Actor::Agent(slot));
            agent.stats.set_health(hurt);
            if agent.stats.health == 0 {
                agent.status = AgentStatus::Dead;
                events.push(TickEvent::AgentDied {
                    agent: slot,
                    depth: agent.depth,
                    pos: agent.pos,
                });
            }
        }

        let mut kills = Vec::new();
        for enemy in &mut self.state.enemies {
            let hurt = enemy.stats.health - ledger.damage_to(Actor::Enemy(enemy.id));
            enemy.stats.set_health(hurt);
            if !enemy.stats.is_alive() {
                let killer = ledger.top_agent_attacker(Actor::Enemy(enemy.id));
                events.push(TickEvent::EnemyDied {
                    enemy: enemy.id,
                    depth: enemy.depth,
                    pos: enemy.pos,
                    killer,
                });
                kills.push(Kill {
                    killer,
                    depth: enemy.depth,
                    pos: enemy.pos,
                    experience: enemy.experience,
                    loot: enemy.loot,
                });
            }
        }
        self.state.enemies.retain(|e| e.stats.is_alive());
        kills
    }

    /// Living agents on the ladder move one depth down, generating it on first arrival. An agent
    /// with no free tile to land on stays on the ladder and tries again next tick.
    fn descend(&mut self, events: &mut Vec<TickEvent>) -> Result<(), WorldGenError> {
        for slot in AgentSlot::ALL {
            let agent = self.state.agent(slot);
            let on_ladder = self
                .state
                .dungeon(agent.depth)
                .is_some_and(|d| d.ladder() == agent.pos);
            if !agent.is_alive() || !on_ladder {
                continue;
            }

            let depth = agent.depth + 1;
            self.state.ensure_dungeon(depth)?;
            let Some(dungeon) = self.state.dungeon(depth) else {
                continue;
            };
            let spawn = dungeon.spawns()[slot.index()];
            let Some(arrival) =
                dungeon.nearest_free(spawn, |p| self.state.occupant(depth, p).is_some())
            else {
                warn!(%slot, depth, "no free tile below, staying on the ladder");
                continue;
            };

            let agent = self.state.agent_mut(slot);
            agent.depth = depth;
            agent.pos = arrival;
            info!(%slot, depth, "agent descended");
            events.push(TickEvent::Descended {
                agent: slot,
                depth,
                pos: arrival,
            });
        }
        Ok(())
    }

    /// Count cooldowns down, then hand out the new ones; penalties last exactly one tick.
    fn bookkeeping(&mut self, ledger: &DamageLedger) {
        let exchange_cooldown = self.state.rules.exchange_cooldown;
        for actor in self.state.actors() {
            let Some(stats) = self.state.combatant_mut(actor) else {
                continue;
            };
            stats.cooldown = stats.cooldown.tick_down();
            stats.penalized = false;
            if ledger.cooldowns.contains(&actor) && exchange_cooldown > 0 {
                stats.cooldown = Cooldown::OnCooldown(exchange_cooldown);
            }
            if ledger.penalties.contains(&actor) {
                stats.penalized = true;
            }
        }
        for agent in self.state.agents.iter_mut().filter(|a| a.is_alive()) {
            agent.status = if ledger.heals.iter().any(|(s, _)| *s == agent.slot) {
                AgentStatus::Healing
            } else {
                AgentStatus::Alive
            };
        }
    }

    fn check_terminal(&mut self) -> GameStatus {
        let first = self.state.agent(AgentSlot::First).is_alive();
        let second = self.state.agent(AgentSlot::Second).is_alive();
        match (first, second) {
            (true, true) => GameStatus::Running,
            (true, false) => GameStatus::Finished {
                winner: AgentSlot::First,
                reason: GameOverReason::Killed,
            },
            (false, true) => GameStatus::Finished {
                winner: AgentSlot::Second,
                reason: GameOverReason::Killed,
            },
            (false, false) => {
                let winner = if self.state.rng.gen_bool(0.5) {
                    AgentSlot::First
                } else {
                    AgentSlot::Second
                };
                GameStatus::Finished {
                    winner,
                    reason: GameOverReason::DoubleKnockout,
                }
            }
        }
    }
}

struct Kill {
    killer: Option<AgentSlot>,
    depth: u32,
    pos: Pos,
    experience: u32,
    loot: LootTable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_enemy, arena_rules, duel_state_at, duel_state_with};
    use optimax_protocol::{AttackOutcome, DowngradeReason, Direction};

    const STAY: Action = Action::Stay;

    fn attack(target: Pos) -> Action {
        Action::AttackTile { target }
    }

    fn mv(direction: Direction) -> Action {
        Action::Move { direction }
    }

    fn health(engine: &GameEngine, slot: AgentSlot) -> i32 {
        engine.state().agent(slot).stats.health
    }

    #[test]
    fn mutual_attack_halves_damage_and_sets_cooldowns() {
        let a = Pos::new(3, 2);
        let b = Pos::new(4, 2);
        let mut engine = GameEngine::from_state(duel_state_at(a, b));
        let full = engine.state().rules().agent_damage;
        let max = engine.state().rules().agent_max_health;

        let report = engine.step([attack(b), attack(a)]).unwrap();

        assert_eq!(health(&engine, AgentSlot::First), max - full / 2);
        assert_eq!(health(&engine, AgentSlot::Second), max - full / 2);
        for slot in AgentSlot::ALL {
            assert_eq!(
                engine.state().agent(slot).stats.cooldown,
                Cooldown::OnCooldown(3)
            );
        }
        assert!(report.events.iter().any(|e| matches!(
            e,
            TickEvent::Attacked {
                outcome: AttackOutcome::Exchange { .. },
                ..
            }
        )));
    }

    #[test]
    fn exchange_cooldown_blocks_the_next_three_ticks() {
        let a = Pos::new(3, 2);
        let b = Pos::new(4, 2);
        let mut engine = GameEngine::from_state(duel_state_at(a, b));
        engine.step([attack(b), attack(a)]).unwrap();

        for _ in 0..3 {
            let report = engine.step([attack(b), STAY]).unwrap();
            assert!(report.events.iter().any(|e| matches!(
                e,
                TickEvent::ActionDowngraded {
                    reason: DowngradeReason::Cooldown,
                    ..
                }
            )));
        }
        assert!(engine.state().agent(AgentSlot::First).stats.cooldown.is_ready());

        // Second is ready again too, so it blocks with a plain Stay.
        let report = engine.step([attack(b), STAY]).unwrap();
        assert!(report.events.iter().any(|e| matches!(
            e,
            TickEvent::Attacked {
                outcome: AttackOutcome::Negated { .. },
                ..
            }
        )));
    }

    #[test]
    fn staying_defender_negates_and_penalizes() {
        let a = Pos::new(3, 2);
        let b = Pos::new(4, 2);
        let mut engine = GameEngine::from_state(duel_state_at(a, b));
        let max = engine.state().rules().agent_max_health;

        engine.step([attack(b), STAY]).unwrap();
        assert_eq!(health(&engine, AgentSlot::Second), max);
        assert!(engine.state().agent(AgentSlot::First).stats.penalized);

        // Penalized: First cannot defend, so Second's blow lands in full.
        let report = engine.step([STAY, attack(a)]).unwrap();
        let full = engine.state().rules().agent_damage;
        assert_eq!(health(&engine, AgentSlot::First), max - full);
        assert!(report.events.iter().any(|e| matches!(
            e,
            TickEvent::Attacked {
                outcome: AttackOutcome::Hit { .. },
                ..
            }
        )));
        // The penalty lasted one tick only.
        assert!(!engine.state().agent(AgentSlot::First).stats.penalized);
    }

    #[test]
    fn dodging_defender_takes_nothing_and_no_penalty() {
        let a = Pos::new(3, 2);
        let b = Pos::new(4, 2);
        let mut engine = GameEngine::from_state(duel_state_at(a, b));
        let max = engine.state().rules().agent_max_health;

        let report = engine.step([attack(b), mv(Direction::Down)]).unwrap();
        assert_eq!(health(&engine, AgentSlot::Second), max);
        assert!(!engine.state().agent(AgentSlot::First).stats.penalized);
        assert!(report.events.iter().any(|e| matches!(
            e,
            TickEvent::Attacked {
                outcome: AttackOutcome::Missed { .. },
                ..
            }
        )));
    }

    #[test]
    fn stepping_into_the_blow_takes_full_damage() {
        // Second steps from (5,2) into (4,2), which First is attacking.
        let a = Pos::new(3, 2);
        let b = Pos::new(5, 2);
        let mut engine = GameEngine::from_state(duel_state_at(a, b));
        let max = engine.state().rules().agent_max_health;
        let full = engine.state().rules().agent_damage;

        engine
            .step([attack(Pos::new(4, 2)), mv(Direction::Left)])
            .unwrap();
        assert_eq!(engine.state().agent(AgentSlot::Second).pos, Pos::new(4, 2));
        assert_eq!(health(&engine, AgentSlot::Second), max - full);
        assert!(!engine.state().agent(AgentSlot::First).stats.penalized);
    }

    #[test]
    fn healer_is_undefended_and_heals_first() {
        let a = Pos::new(3, 2);
        let b = Pos::new(4, 2);
        let mut state = duel_state_at(a, b);
        state.agent_mut(AgentSlot::Second).stats.health = 50;
        state.agent_mut(AgentSlot::Second).stats.mana = 9;
        let rules = state.rules().clone();
        let mut engine = GameEngine::from_state(state);

        engine.step([attack(b), Action::Heal]).unwrap();
        let expected = 50 + 3 * rules.heal_ratio - rules.agent_damage;
        assert_eq!(health(&engine, AgentSlot::Second), expected);
        assert_eq!(engine.state().agent(AgentSlot::Second).stats.mana, 6);
        assert_eq!(
            engine.state().agent(AgentSlot::Second).status,
            AgentStatus::Healing
        );
    }

    #[test]
    fn armor_soaks_after_halving() {
        let a = Pos::new(3, 2);
        let b = Pos::new(4, 2);
        let mut state = duel_state_at(a, b);
        state.agent_mut(AgentSlot::Second).stats.armor = 2;
        let rules = state.rules().clone();
        let mut engine = GameEngine::from_state(state);

        engine.step([attack(b), attack(a)]).unwrap();
        assert_eq!(
            health(&engine, AgentSlot::Second),
            rules.agent_max_health - (rules.agent_damage / 2 - 2)
        );
    }

    #[test]
    fn tick_counter_advances_by_one() {
        let mut engine = GameEngine::from_state(duel_state_at(Pos::new(1, 1), Pos::new(7, 5)));
        for expected in 0..20 {
            let report = engine.step([STAY, STAY]).unwrap();
            assert_eq!(report.tick, expected);
            assert_eq!(engine.state().tick(), expected + 1);
        }
    }

    #[test]
    fn double_knockout_winner_is_a_coin_flip() {
        let mut wins = [0_u32; 2];
        for seed in 0..400 {
            let mut state = duel_state_with(arena_rules(), Pos::new(3, 2), Pos::new(4, 2));
            state.rng = crate::rng::GameRng::seed_from_u64(seed);
            for slot in AgentSlot::ALL {
                state.agent_mut(slot).stats.health = 1;
            }
            let mut engine = GameEngine::from_state(state);
            let report = engine
                .step([attack(Pos::new(4, 2)), attack(Pos::new(3, 2))])
                .unwrap();
            match report.status {
                GameStatus::Finished {
                    winner,
                    reason: GameOverReason::DoubleKnockout,
                } => wins[winner.index()] += 1,
                other => panic!("unexpected status {other:?}"),
            }
        }
        // 400 fair flips land within 140..260 with overwhelming probability.
        assert!((140..=260).contains(&wins[0]), "{wins:?}");
        assert_eq!(wins[0] + wins[1], 400);
    }

    #[test]
    fn single_death_ends_the_game() {
        let a = Pos::new(3, 2);
        let b = Pos::new(4, 2);
        let mut state = duel_state_at(a, b);
        state.agent_mut(AgentSlot::Second).stats.health = 1;
        let mut engine = GameEngine::from_state(state);
        let report = engine.step([attack(b), Action::Heal]).unwrap();
        assert_eq!(
            report.status,
            GameStatus::Finished {
                winner: AgentSlot::First,
                reason: GameOverReason::Killed
            }
        );
        // Further steps are no-ops.
        let tick = engine.state().tick();
        engine.step([STAY, STAY]).unwrap();
        assert_eq!(engine.state().tick(), tick);
    }

    #[test]
    fn separation_damage_grows_linearly_and_resets() {
        let rules = arena_rules();
        let per_tick = rules.separation_damage_per_tick;
        let ladder = crate::testing::ARENA_LADDER;
        // First stands next to the ladder and steps onto it.
        let mut state = duel_state_with(rules, Pos::new(ladder.x - 1, ladder.y), Pos::new(1, 5));
        state.agent_mut(AgentSlot::Second).stats.max_health = 10_000;
        state.agent_mut(AgentSlot::Second).stats.health = 10_000;
        let mut engine = GameEngine::from_state(state);

        engine.step([mv(Direction::Right), STAY]).unwrap();
        assert_eq!(engine.state().agent(AgentSlot::First).depth, 1);

        let mut last = 10_000;
        for n in 1..=5 {
            let report = engine.step([STAY, STAY]).unwrap();
            let now = health(&engine, AgentSlot::Second);
            assert_eq!(last - now, n * per_tick, "tick {n}");
            assert_eq!(engine.state().separation_timer(), n as u32);
            assert!(report.events.iter().any(|e| matches!(
                e,
                TickEvent::SeparationDamage {
                    agent: AgentSlot::Second,
                    ..
                }
            )));
            last = now;
        }
    }

    #[test]
    fn reunion_resets_the_separation_timer() {
        let rules = arena_rules();
        let ladder = crate::testing::ARENA_LADDER;
        let mut state = duel_state_with(
            rules,
            Pos::new(ladder.x - 1, ladder.y),
            Pos::new(ladder.x, ladder.y + 1),
        );
        state.agent_mut(AgentSlot::Second).stats.health = 100;
        let mut engine = GameEngine::from_state(state);

        engine.step([mv(Direction::Right), STAY]).unwrap();
        engine.step([STAY, STAY]).unwrap();
        assert_eq!(engine.state().separation_timer(), 1);

        // Second climbs down after First: no damage on the tick they meet again.
        let before = health(&engine, AgentSlot::Second);
        let report = engine.step([STAY, mv(Direction::Up)]).unwrap();
        assert_eq!(engine.state().agent(AgentSlot::Second).depth, 1);
        assert_eq!(engine.state().separation_timer(), 0);
        assert_eq!(health(&engine, AgentSlot::Second), before);
        assert!(!report
            .events
            .iter()
            .any(|e| matches!(e, TickEvent::SeparationDamage { .. })));

        engine.step([STAY, STAY]).unwrap();
        assert_eq!(engine.state().separation_timer(), 0);
    }

    #[test]
    fn full_depth_keeps_the_agent_on_the_ladder() {
        let ladder = crate::testing::ARENA_LADDER;
        let mut state = duel_state_at(ladder, Pos::new(1, 5));
        let below = crate::testing::arena(1);
        let tiles: Vec<Pos> = below.walkable_tiles().collect();
        state.world.insert(below);
        for pos in tiles {
            let id = add_enemy(&mut state, pos);
            if let Some(enemy) = state.enemies.iter_mut().find(|e| e.id == id) {
                enemy.depth = 1;
            }
        }
        let mut engine = GameEngine::from_state(state);

        let mut events = Vec::new();
        engine.descend(&mut events).unwrap();
        let first = engine.state().agent(AgentSlot::First);
        assert_eq!((first.depth, first.pos), (0, ladder));
        assert!(events.is_empty());
    }

    #[test]
    fn killing_an_enemy_grants_experience() {
        let a = Pos::new(3, 2);
        let mut state = duel_state_at(a, Pos::new(7, 5));
        let enemy = add_enemy(&mut state, Pos::new(4, 2));
        let xp = state.enemy(enemy).map(|e| e.experience).unwrap();
        if let Some(e) = state.enemies.iter_mut().find(|e| e.id == enemy) {
            e.stats.health = 1;
        }
        let mut engine = GameEngine::from_state(state);

        // The enemy attacks First's tile while First attacks back: a mutual exchange.
        let report = engine.step([attack(Pos::new(4, 2)), STAY]).unwrap();
        assert!(engine.state().enemies().is_empty());
        assert_eq!(engine.state().agent(AgentSlot::First).experience, xp);
        assert!(report.events.iter().any(|e| matches!(
            e,
            TickEvent::EnemyDied {
                killer: Some(AgentSlot::First),
                ..
            }
        )));
    }

    #[test]
    fn health_and_mana_stay_in_bounds() {
        let rules = RulesConfig {
            spawn_chance: 0.3,
            mana_regen_per_tick: 3,
            ..arena_rules()
        };
        let mut engine =
            GameEngine::from_state(duel_state_with(rules, Pos::new(3, 2), Pos::new(4, 2)));
        let script = [
            [attack(Pos::new(4, 2)), Action::Heal],
            [Action::Heal, attack(Pos::new(3, 2))],
            [attack(Pos::new(4, 2)), attack(Pos::new(3, 2))],
            [mv(Direction::Up), STAY],
        ];
        for actions in script.iter().cycle().take(200) {
            let before = engine.state().agents().clone();
            let report = engine.step(*actions).unwrap();
            for agent in engine.state().agents() {
                assert!((0..=agent.stats.max_health).contains(&agent.stats.health));
                assert!((0..=agent.stats.max_mana).contains(&agent.stats.mana));
            }
            for event in &report.events {
                if let TickEvent::Attacked {
                    attacker: Actor::Agent(slot),
                    mana_spent,
                    ..
                }
                | TickEvent::Healed {
                    agent: slot,
                    mana_spent,
                    ..
                } = event
                {
                    assert!(*mana_spent * 3 <= before[slot.index()].stats.mana);
                }
            }
            if report.status.is_finished() {
                break;
            }
        }
    }
}
