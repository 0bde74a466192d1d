//! Procedural dungeon generation.
//!
//! Scatters interior walls, keeps the largest connected open region and walls off the rest,
//! then places the spawn tiles, the ladder and the item slots inside that region.

use std::collections::VecDeque;

use optimax_protocol::Pos;
use thiserror::Error;
use tracing::debug;

use crate::rng::GameRng;
use crate::rules::RulesConfig;
use crate::world::{Dungeon, Tile};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorldGenError {
    #[error("no connected layout for depth {depth} after {attempts} attempts")]
    UngeneratableMap { depth: u32, attempts: u32 },
}

/// Configuration for dungeon generation.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldGenConfig {
    pub width: u32,
    pub height: u32,
    /// Fraction of interior tiles that start as walls (0.0-1.0).
    pub wall_density: f32,
    pub item_slots: u16,
    pub max_attempts: u32,
}

impl From<&RulesConfig> for WorldGenConfig {
    fn from(rules: &RulesConfig) -> Self {
        Self {
            width: rules.width,
            height: rules.height,
            wall_density: rules.wall_density,
            item_slots: rules.item_slots,
            max_attempts: rules.max_gen_attempts,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorldGenerator {
    seed: u64,
    config: WorldGenConfig,
}

impl WorldGenerator {
    pub fn new(seed: u64, config: WorldGenConfig) -> Self {
        Self { seed, config }
    }

    pub fn config(&self) -> &WorldGenConfig {
        &self.config
    }

    /// Generate the dungeon for `depth`. The same seed and depth always produce the same
    /// dungeon, regardless of which other depths were generated before.
    pub fn generate(&self, depth: u32) -> Result<Dungeon, WorldGenError> {
        for attempt in 0..self.config.max_attempts {
            let mut rng = GameRng::stream(self.seed, u64::from(depth), u64::from(attempt));
            if let Some(dungeon) = self.attempt(depth, &mut rng) {
                debug!(depth, attempt, "generated dungeon");
                return Ok(dungeon);
            }
        }
        Err(WorldGenError::UngeneratableMap {
            depth,
            attempts: self.config.max_attempts,
        })
    }

    fn attempt(&self, depth: u32, rng: &mut GameRng) -> Option<Dungeon> {
        let width = self.config.width as i32;
        let height = self.config.height as i32;
        if width < 3 || height < 3 {
            return None;
        }

        let mut tiles = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let border = x == 0 || y == 0 || x == width - 1 || y == height - 1;
                if border || rng.gen_bool(self.config.wall_density) {
                    tiles.push(Tile::Wall);
                } else {
                    tiles.push(Tile::Floor);
                }
            }
        }

        let mut region = largest_region(&tiles, width, height);
        let needed = usize::from(self.config.item_slots) + 3;
        if region.len() < needed {
            return None;
        }

        // Wall off everything outside the kept region.
        let mut keep = vec![false; tiles.len()];
        for pos in &region {
            keep[(pos.y * width + pos.x) as usize] = true;
        }
        for (tile, kept) in tiles.iter_mut().zip(&keep) {
            if !kept {
                *tile = Tile::Wall;
            }
        }

        rng.shuffle(&mut region);
        let spawns = [region[0], region[1]];
        let ladder = region[2];
        let item_slots = region[3..needed].to_vec();
        tiles[(ladder.y * width + ladder.x) as usize] = Tile::Ladder;

        Some(Dungeon::from_parts(
            depth,
            self.config.width,
            self.config.height,
            tiles,
            ladder,
            item_slots,
            spawns,
        ))
    }
}

/// Largest 4-connected set of floor tiles, in discovery order.
fn largest_region(tiles: &[Tile], width: i32, height: i32) -> Vec<Pos> {
    let mut visited = vec![false; tiles.len()];
    let mut best: Vec<Pos> = Vec::new();

    for start in 0..tiles.len() {
        if visited[start] || !tiles[start].is_walkable() {
            continue;
        }
        visited[start] = true;
        let mut region = Vec::new();
        let mut queue = VecDeque::from([Pos::new(start as i32 % width, start as i32 / width)]);
        while let Some(pos) = queue.pop_front() {
            region.push(pos);
            for next in pos.neighbors() {
                if next.x < 0 || next.y < 0 || next.x >= width || next.y >= height {
                    continue;
                }
                let idx = (next.y * width + next.x) as usize;
                if !visited[idx] && tiles[idx].is_walkable() {
                    visited[idx] = true;
                    queue.push_back(next);
                }
            }
        }
        if region.len() > best.len() {
            best = region;
        }
    }
    best
}
