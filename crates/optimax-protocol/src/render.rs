//! Plain-text rendering of a dungeon, for terminal spectators and debug logs.
//!
//! `#` wall, `.` floor, `o` first agent, `x` second agent, `e` enemy, `\` ladder, `*` item.

use crate::{AgentSlot, DungeonView, Pos, StateUpdate, TileKind};

pub const WALL: char = '#';
pub const FLOOR: char = '.';
pub const LADDER: char = '\\';
pub const ENEMY: char = 'e';
pub const ITEM: char = '*';

pub fn agent_glyph(slot: AgentSlot) -> char {
    match slot {
        AgentSlot::First => 'o',
        AgentSlot::Second => 'x',
    }
}

/// Render one dungeon level with every actor and item from `update` standing on it.
///
/// Agents are drawn over enemies, enemies over items.
pub fn render_dungeon(map: &DungeonView, update: &StateUpdate) -> String {
    let mut out = String::with_capacity((map.width as usize + 1) * map.height as usize);
    for y in 0..map.height as i32 {
        for x in 0..map.width as i32 {
            out.push(glyph_at(map, update, Pos::new(x, y)));
        }
        out.push('\n');
    }
    out
}

fn glyph_at(map: &DungeonView, update: &StateUpdate, pos: Pos) -> char {
    let depth = map.depth;
    if let Some(agent) = update
        .agents
        .iter()
        .find(|a| a.depth == depth && a.pos == pos)
    {
        return agent_glyph(agent.slot);
    }
    if update
        .enemies
        .iter()
        .any(|e| e.depth == depth && e.pos == pos)
    {
        return ENEMY;
    }
    if update.items.iter().any(|i| i.depth == depth && i.pos == pos) {
        return ITEM;
    }
    match map.tile(pos) {
        Some(TileKind::Wall) | None => WALL,
        Some(TileKind::Floor) => FLOOR,
        Some(TileKind::Ladder) => LADDER,
    }
}
