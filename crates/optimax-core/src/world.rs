use std::collections::{BTreeMap, VecDeque};

use optimax_protocol::{DungeonView, Pos, TileKind};

/// Static tile kind. Walls and the ladder never move once a dungeon is generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tile {
    Floor,
    Wall,
    Ladder,
}

impl Tile {
    #[inline]
    pub fn is_walkable(self) -> bool {
        !matches!(self, Tile::Wall)
    }
}

/// One generated dungeon level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dungeon {
    depth: u32,
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
    ladder: Pos,
    item_slots: Vec<Pos>,
    spawns: [Pos; 2],
}

impl Dungeon {
    pub(crate) fn from_parts(
        depth: u32,
        width: u32,
        height: u32,
        tiles: Vec<Tile>,
        ladder: Pos,
        item_slots: Vec<Pos>,
        spawns: [Pos; 2],
    ) -> Self {
        Self {
            depth,
            width,
            height,
            tiles,
            ladder,
            item_slots,
            spawns,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn ladder(&self) -> Pos {
        self.ladder
    }

    /// Fixed item slot positions, indexed by slot number.
    pub fn item_slots(&self) -> &[Pos] {
        &self.item_slots
    }

    /// Arrival tile for each agent slot.
    pub fn spawns(&self) -> [Pos; 2] {
        self.spawns
    }

    #[inline]
    pub fn in_bounds(&self, pos: Pos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    pub fn tile(&self, pos: Pos) -> Option<Tile> {
        if !self.in_bounds(pos) {
            return None;
        }
        self.tiles
            .get(pos.y as usize * self.width as usize + pos.x as usize)
            .copied()
    }

    pub fn is_walkable(&self, pos: Pos) -> bool {
        self.tile(pos).is_some_and(Tile::is_walkable)
    }

    /// Every walkable tile in row-major order.
    pub fn walkable_tiles(&self) -> impl Iterator<Item = Pos> + '_ {
        let width = self.width as usize;
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_walkable())
            .map(move |(i, _)| Pos::new((i % width) as i32, (i / width) as i32))
    }

    /// Closest walkable tile to `start` (breadth-first) for which `blocked` is false.
    pub fn nearest_free(&self, start: Pos, blocked: impl Fn(Pos) -> bool) -> Option<Pos> {
        let mut seen = vec![false; self.tiles.len()];
        let mut queue = VecDeque::new();
        if self.is_walkable(start) {
            queue.push_back(start);
            seen[self.index(start)] = true;
        }
        while let Some(pos) = queue.pop_front() {
            if !blocked(pos) {
                return Some(pos);
            }
            for next in pos.neighbors() {
                if self.is_walkable(next) && !seen[self.index(next)] {
                    seen[self.index(next)] = true;
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn index(&self, pos: Pos) -> usize {
        pos.y as usize * self.width as usize + pos.x as usize
    }

    /// Wire view of this level. The ladder shows as plain floor unless revealed.
    pub fn view(&self, reveal_ladder: bool) -> DungeonView {
        DungeonView {
            depth: self.depth,
            width: self.width,
            height: self.height,
            tiles: self
                .tiles
                .iter()
                .map(|t| match t {
                    Tile::Wall => TileKind::Wall,
                    Tile::Ladder if reveal_ladder => TileKind::Ladder,
                    Tile::Floor | Tile::Ladder => TileKind::Floor,
                })
                .collect(),
        }
    }
}

/// The stack of dungeon levels generated so far.
#[derive(Clone, Debug, Default)]
pub struct World {
    dungeons: BTreeMap<u32, Dungeon>,
}

impl World {
    pub fn get(&self, depth: u32) -> Option<&Dungeon> {
        self.dungeons.get(&depth)
    }

    pub fn contains(&self, depth: u32) -> bool {
        self.dungeons.contains_key(&depth)
    }

    pub fn insert(&mut self, dungeon: Dungeon) {
        self.dungeons.insert(dungeon.depth, dungeon);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dungeon> {
        self.dungeons.values()
    }

    pub fn len(&self) -> usize {
        self.dungeons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dungeons.is_empty()
    }
}
