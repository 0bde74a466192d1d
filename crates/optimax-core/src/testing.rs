//! Fixed arenas for unit tests.

use optimax_protocol::{AgentSlot, EnemyId, Pos};

use crate::entities::{Enemy, LootTable};
use crate::rules::RulesConfig;
use crate::state::GameState;
use crate::world::{Dungeon, Tile};

pub const ARENA_WIDTH: u32 = 9;
pub const ARENA_HEIGHT: u32 = 7;
pub const ARENA_LADDER: Pos = Pos::new(7, 1);
pub const ARENA_SLOTS: [Pos; 4] = [
    Pos::new(1, 5),
    Pos::new(3, 5),
    Pos::new(5, 5),
    Pos::new(4, 3),
];

/// Quiet rules for a 9x7 open room: no walls, no random spawns, drops or regeneration.
pub fn arena_rules() -> RulesConfig {
    RulesConfig {
        width: ARENA_WIDTH,
        height: ARENA_HEIGHT,
        wall_density: 0.0,
        item_slots: ARENA_SLOTS.len() as u16,
        initial_item_chance: 0.0,
        spawn_chance: 0.0,
        drop_chance: 0.0,
        mana_regen_per_tick: 0,
        ..RulesConfig::default()
    }
}

/// Open room with the ladder in the top-right corner:
///
/// ```text
/// #########
/// #......\#
/// #.......#
/// #.......#
/// #.......#
/// #.......#
/// #########
/// ```
pub fn arena(depth: u32) -> Dungeon {
    let mut tiles = Vec::new();
    for y in 0..ARENA_HEIGHT as i32 {
        for x in 0..ARENA_WIDTH as i32 {
            let border =
                x == 0 || y == 0 || x == ARENA_WIDTH as i32 - 1 || y == ARENA_HEIGHT as i32 - 1;
            tiles.push(if border {
                Tile::Wall
            } else if Pos::new(x, y) == ARENA_LADDER {
                Tile::Ladder
            } else {
                Tile::Floor
            });
        }
    }
    Dungeon::from_parts(
        depth,
        ARENA_WIDTH,
        ARENA_HEIGHT,
        tiles,
        ARENA_LADDER,
        ARENA_SLOTS.to_vec(),
        [Pos::new(1, 3), Pos::new(7, 3)],
    )
}

/// Both agents in the arena with empty mana pools.
pub fn duel_state_with(rules: RulesConfig, first: Pos, second: Pos) -> GameState {
    let mut state = GameState::new(1, rules).expect("open arena generates");
    state.world.insert(arena(0));
    state.items.clear();
    state.revealed = Default::default();
    for (slot, pos) in [(AgentSlot::First, first), (AgentSlot::Second, second)] {
        let agent = state.agent_mut(slot);
        agent.pos = pos;
        agent.stats.mana = 0;
    }
    state
}

pub fn duel_state_at(first: Pos, second: Pos) -> GameState {
    duel_state_with(arena_rules(), first, second)
}

/// Adjacent agents in the middle of the arena.
pub fn duel_state() -> GameState {
    duel_state_at(Pos::new(3, 2), Pos::new(4, 2))
}

pub fn add_enemy(state: &mut GameState, pos: Pos) -> EnemyId {
    let id = state.next_enemy_id();
    let enemy = Enemy::spawn(id, 0, pos, LootTable::Common, state.rules());
    state.enemies.push(enemy);
    id
}
