//! Scripted controllers that play from the same `STATE_UPDATE` stream a remote client gets.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use optimax_protocol::{
    Action, AgentSlot, AgentView, Direction, DungeonView, Pos, StateUpdate, TileKind,
};
use serde::{Deserialize, Serialize};

use crate::rng::GameRng;

/// A local decision maker for one agent slot.
pub trait Bot: Send {
    fn name(&self) -> &'static str;

    /// Pick the action for `update.tick`.
    fn act(&mut self, update: &StateUpdate) -> Action;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotKind {
    Random,
    Ladder,
    Hunter,
}

impl BotKind {
    pub fn build(self, slot: AgentSlot, seed: u64) -> Box<dyn Bot> {
        let seed = seed ^ (slot.index() as u64 + 1).wrapping_mul(0x9e37_79b9);
        match self {
            BotKind::Random => Box::new(RandomBot::new(seed)),
            BotKind::Ladder => Box::new(LadderBot::new(seed)),
            BotKind::Hunter => Box::new(HunterBot::new(seed)),
        }
    }
}

impl fmt::Display for BotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BotKind::Random => "random",
            BotKind::Ladder => "ladder",
            BotKind::Hunter => "hunter",
        })
    }
}

impl FromStr for BotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(BotKind::Random),
            "ladder" => Ok(BotKind::Ladder),
            "hunter" => Ok(BotKind::Hunter),
            other => Err(format!("unknown bot '{other}' (random, ladder, hunter)")),
        }
    }
}

/// Maps a bot has been sent so far, keyed by depth.
#[derive(Clone, Debug, Default)]
struct KnownMaps {
    maps: BTreeMap<u32, DungeonView>,
}

impl KnownMaps {
    fn absorb(&mut self, update: &StateUpdate) {
        for map in &update.maps {
            self.maps.insert(map.depth, map.clone());
        }
    }

    fn get(&self, depth: u32) -> Option<&DungeonView> {
        self.maps.get(&depth)
    }
}

fn me(update: &StateUpdate) -> Option<&AgentView> {
    update.viewer.and_then(|slot| update.agent(slot))
}

/// Tiles taken by anyone other than `me`.
fn blockers(update: &StateUpdate, me: &AgentView) -> BTreeSet<Pos> {
    let depth = me.depth;
    update
        .agents
        .iter()
        .filter(|a| a.slot != me.slot && a.depth == depth)
        .map(|a| a.pos)
        .chain(
            update
                .enemies
                .iter()
                .filter(|e| e.depth == depth)
                .map(|e| e.pos),
        )
        .collect()
}

/// First step of a shortest path from `from` to `goal`, avoiding `blocked` tiles.
fn step_toward(
    map: &DungeonView,
    from: Pos,
    goal: Pos,
    blocked: &BTreeSet<Pos>,
) -> Option<Direction> {
    if from == goal {
        return None;
    }
    let mut first_step: BTreeMap<Pos, Direction> = BTreeMap::new();
    let mut queue = VecDeque::new();
    for direction in Direction::ALL {
        let next = from.step(direction);
        if passable(map, next) && (!blocked.contains(&next) || next == goal) {
            first_step.insert(next, direction);
            queue.push_back(next);
        }
    }
    while let Some(pos) = queue.pop_front() {
        let Some(&direction) = first_step.get(&pos) else {
            continue;
        };
        if pos == goal {
            return Some(direction);
        }
        if blocked.contains(&pos) {
            continue;
        }
        for next in pos.neighbors() {
            if next != from && passable(map, next) && !first_step.contains_key(&next) {
                first_step.insert(next, direction);
                queue.push_back(next);
            }
        }
    }
    None
}

fn passable(map: &DungeonView, pos: Pos) -> bool {
    matches!(map.tile(pos), Some(TileKind::Floor | TileKind::Ladder))
}

fn random_move(rng: &mut GameRng) -> Action {
    match rng.choose(&Direction::ALL) {
        Some(&direction) => Action::Move { direction },
        None => Action::Stay,
    }
}

/// Wanders between random floor tiles until something more useful turns up.
#[derive(Clone, Debug)]
struct Explorer {
    rng: GameRng,
    goal: Option<(u32, Pos)>,
}

impl Explorer {
    fn new(seed: u64) -> Self {
        Self {
            rng: GameRng::seed_from_u64(seed),
            goal: None,
        }
    }

    fn step(&mut self, map: &DungeonView, me: &AgentView, blocked: &BTreeSet<Pos>) -> Action {
        for _ in 0..4 {
            let goal = match self.goal {
                Some((depth, pos)) if depth == me.depth && pos != me.pos => pos,
                _ => {
                    let floor: Vec<Pos> = (0..map.height as i32)
                        .flat_map(|y| (0..map.width as i32).map(move |x| Pos::new(x, y)))
                        .filter(|p| passable(map, *p))
                        .collect();
                    let Some(&pos) = self.rng.choose(&floor) else {
                        return Action::Stay;
                    };
                    self.goal = Some((me.depth, pos));
                    pos
                }
            };
            if let Some(direction) = step_toward(map, me.pos, goal, blocked) {
                return Action::Move { direction };
            }
            self.goal = None;
        }
        random_move(&mut self.rng)
    }
}

/// Moves in a random direction every tick.
#[derive(Clone, Debug)]
pub struct RandomBot {
    rng: GameRng,
}

impl RandomBot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: GameRng::seed_from_u64(seed),
        }
    }
}

impl Bot for RandomBot {
    fn name(&self) -> &'static str {
        "random"
    }

    fn act(&mut self, _update: &StateUpdate) -> Action {
        random_move(&mut self.rng)
    }
}

/// Rushes down the ladders, exploring until the ladder of the current depth is in sight.
#[derive(Clone, Debug)]
pub struct LadderBot {
    maps: KnownMaps,
    explorer: Explorer,
}

impl LadderBot {
    pub fn new(seed: u64) -> Self {
        Self {
            maps: KnownMaps::default(),
            explorer: Explorer::new(seed),
        }
    }
}

impl Bot for LadderBot {
    fn name(&self) -> &'static str {
        "ladder"
    }

    fn act(&mut self, update: &StateUpdate) -> Action {
        self.maps.absorb(update);
        let Some(me) = me(update) else {
            return Action::Stay;
        };
        let Some(map) = self.maps.get(me.depth) else {
            return Action::Stay;
        };
        let blocked = blockers(update, me);
        if let Some(ladder) = map.ladder() {
            if let Some(direction) = step_toward(map, me.pos, ladder, &blocked) {
                return Action::Move { direction };
            }
        }
        self.explorer.step(map, me, &blocked)
    }
}

/// Fights whatever is next to it, heals when low, and otherwise chases the nearest enemy or
/// follows the opponent down the ladder to avoid separation damage.
#[derive(Clone, Debug)]
pub struct HunterBot {
    maps: KnownMaps,
    explorer: Explorer,
}

impl HunterBot {
    pub fn new(seed: u64) -> Self {
        Self {
            maps: KnownMaps::default(),
            explorer: Explorer::new(seed),
        }
    }
}

impl Bot for HunterBot {
    fn name(&self) -> &'static str {
        "hunter"
    }

    fn act(&mut self, update: &StateUpdate) -> Action {
        self.maps.absorb(update);
        let Some(me) = me(update) else {
            return Action::Stay;
        };
        let Some(map) = self.maps.get(me.depth) else {
            return Action::Stay;
        };
        let blocked = blockers(update, me);

        let low = me.health * 10 < me.max_health * 4;
        if low && me.mana >= 3 {
            return Action::Heal;
        }

        let opponent = update
            .agents
            .iter()
            .find(|a| a.slot != me.slot && a.depth == me.depth)
            .map(|a| a.pos);
        let enemies = update
            .enemies
            .iter()
            .filter(|e| e.depth == me.depth)
            .map(|e| e.pos);
        let targets: Vec<Pos> = opponent.into_iter().chain(enemies).collect();

        if me.cooldown.is_ready() && !me.penalized {
            if let Some(&target) = targets.iter().find(|t| t.manhattan(me.pos) == 1) {
                return Action::AttackTile { target };
            }
        }

        // Opponent went deeper: follow it down before the separation timer builds up.
        if update.separation_ticks > 0 {
            if let Some(ladder) = map.ladder() {
                if let Some(direction) = step_toward(map, me.pos, ladder, &blocked) {
                    return Action::Move { direction };
                }
            }
        }

        if let Some(&target) = targets.iter().min_by_key(|t| t.manhattan(me.pos)) {
            if let Some(direction) = step_toward(map, me.pos, target, &blocked) {
                return Action::Move { direction };
            }
        }

        if let Some(ladder) = map.ladder() {
            if let Some(direction) = step_toward(map, me.pos, ladder, &blocked) {
                return Action::Move { direction };
            }
        }
        self.explorer.step(map, me, &blocked)
    }
}
