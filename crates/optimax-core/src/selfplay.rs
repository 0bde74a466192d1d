//! Headless self-play harness.
//!
//! Runs bot-vs-bot games through the same per-agent views the server sends, and collects
//! metrics for balancing the rules.

use std::time::Instant;

use optimax_protocol::{wire, Action, Actor, AgentSlot, AttackOutcome, GameOverReason, TickEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use crate::bots::BotKind;

use crate::engine::{GameEngine, GameStatus};
use crate::rules::RulesConfig;
use crate::view::{agent_update, spectator_update, MapMemory};
use crate::worldgen::WorldGenError;

/// Configuration for self-play simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelfPlayConfig {
    /// Random seed for determinism.
    pub seed: u64,
    /// Ticks before the game is called a draw.
    pub max_ticks: u64,
    pub bots: [BotKind; 2],
    pub rules: RulesConfig,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_ticks: 2_000,
            bots: [BotKind::Hunter, BotKind::Ladder],
            rules: RulesConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SelfPlayOutcome {
    Victory {
        winner: AgentSlot,
        reason: GameOverReason,
    },
    /// Tick cap reached with both agents alive.
    Draw,
}

/// Per-agent statistics, indexed by slot.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameMetrics {
    pub ticks_played: u64,
    pub deepest: [u32; 2],
    pub levels: [u32; 2],
    pub enemies_killed: [u32; 2],
    pub damage_dealt: [i32; 2],
    pub separation_damage_taken: [i32; 2],
    pub items_picked: [u32; 2],
    pub heals: [u32; 2],
    pub negated_attacks: [u32; 2],
    pub exchanges: u32,
    pub enemies_spawned: u32,
}

impl GameMetrics {
    fn record(&mut self, event: &TickEvent) {
        match event {
            TickEvent::Attacked {
                attacker: Actor::Agent(slot),
                outcome,
                ..
            } => match outcome {
                AttackOutcome::Hit { damage, .. } => self.damage_dealt[slot.index()] += damage,
                AttackOutcome::Exchange { damage, .. } => {
                    self.damage_dealt[slot.index()] += damage;
                    self.exchanges += 1;
                }
                AttackOutcome::Negated { .. } => self.negated_attacks[slot.index()] += 1,
                AttackOutcome::Missed { .. } | AttackOutcome::Whiff => {}
            },
            TickEvent::EnemyDied {
                killer: Some(slot), ..
            } => self.enemies_killed[slot.index()] += 1,
            TickEvent::SeparationDamage { agent, damage, .. } => {
                self.separation_damage_taken[agent.index()] += damage;
            }
            TickEvent::ItemPickedUp { agent, .. } => self.items_picked[agent.index()] += 1,
            TickEvent::Healed { agent, .. } => self.heals[agent.index()] += 1,
            TickEvent::EnemySpawned { .. } => self.enemies_spawned += 1,
            _ => {}
        }
    }
}

/// Result of a self-play game.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelfPlayResult {
    pub seed: u64,
    pub outcome: SelfPlayOutcome,
    pub metrics: GameMetrics,
    /// FNV-1a hash of the final spectator view; equal seeds and bots give equal hashes.
    pub final_state_hash: Option<u64>,
    /// Wall clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Batch self-play results.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchSelfPlayResult {
    pub games_played: u32,
    pub results: Vec<SelfPlayResult>,
    pub aggregate: AggregateMetrics,
}

/// Aggregated metrics across games.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub wins: [u32; 2],
    pub win_rates: [f64; 2],
    pub draws: u32,
    pub double_knockouts: u32,
    pub avg_game_length: f64,
    pub avg_deepest: f64,
}

/// Play one game to completion or the tick cap.
pub fn run_selfplay(config: &SelfPlayConfig) -> Result<SelfPlayResult, WorldGenError> {
    let started = Instant::now();
    let mut engine = GameEngine::new(config.seed, config.rules.clone())?;
    let mut bots = AgentSlot::ALL.map(|slot| config.bots[slot.index()].build(slot, config.seed));
    let mut memories = [MapMemory::new(), MapMemory::new()];
    let mut metrics = GameMetrics::default();
    let mut last_events: Vec<TickEvent> = Vec::new();

    while engine.state().tick() < config.max_ticks && !engine.status().is_finished() {
        let mut actions = [Action::Stay; 2];
        for slot in AgentSlot::ALL {
            if !engine.state().agent(slot).is_alive() {
                continue;
            }
            let update = agent_update(
                engine.state(),
                slot,
                &mut memories[slot.index()],
                &last_events,
            );
            actions[slot.index()] = bots[slot.index()].act(&update);
        }

        let report = engine.step(actions)?;
        for event in &report.events {
            metrics.record(event);
        }
        last_events = report.events;
    }

    let state = engine.state();
    metrics.ticks_played = state.tick();
    for agent in state.agents() {
        metrics.deepest[agent.slot.index()] = agent.depth;
        metrics.levels[agent.slot.index()] = agent.level;
    }

    let outcome = match engine.status() {
        GameStatus::Finished { winner, reason } => SelfPlayOutcome::Victory { winner, reason },
        GameStatus::Running => SelfPlayOutcome::Draw,
    };

    let final_view = spectator_update(state, &mut MapMemory::new(), &[]);
    let final_state_hash = match wire::state_hash(&final_view) {
        Ok(hash) => Some(hash),
        Err(err) => {
            warn!(error = %err, "failed to hash final state");
            None
        }
    };

    debug!(seed = config.seed, ?outcome, ticks = metrics.ticks_played, "self-play game done");
    Ok(SelfPlayResult {
        seed: config.seed,
        outcome,
        metrics,
        final_state_hash,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

/// Play `games` games with consecutive seeds starting at `config.seed`.
pub fn run_batch_selfplay(
    config: &SelfPlayConfig,
    games: u32,
) -> Result<BatchSelfPlayResult, WorldGenError> {
    let mut results = Vec::with_capacity(games as usize);
    for i in 0..games {
        let game = SelfPlayConfig {
            seed: config.seed.wrapping_add(u64::from(i)),
            ..config.clone()
        };
        results.push(run_selfplay(&game)?);
    }
    let aggregate = aggregate(&results);
    Ok(BatchSelfPlayResult {
        games_played: games,
        results,
        aggregate,
    })
}

fn aggregate(results: &[SelfPlayResult]) -> AggregateMetrics {
    let mut agg = AggregateMetrics::default();
    if results.is_empty() {
        return agg;
    }
    let n = results.len() as f64;
    let mut total_ticks = 0_u64;
    let mut total_depth = 0_u64;
    for result in results {
        match result.outcome {
            SelfPlayOutcome::Victory { winner, reason } => {
                agg.wins[winner.index()] += 1;
                if reason == GameOverReason::DoubleKnockout {
                    agg.double_knockouts += 1;
                }
            }
            SelfPlayOutcome::Draw => agg.draws += 1,
        }
        total_ticks += result.metrics.ticks_played;
        total_depth += u64::from(result.metrics.deepest.iter().copied().max().unwrap_or(0));
    }
    agg.win_rates = agg.wins.map(|w| f64::from(w) / n);
    agg.avg_game_length = total_ticks as f64 / n;
    agg.avg_deepest = total_depth as f64 / n;
    agg
}
