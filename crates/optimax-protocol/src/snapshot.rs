use serde::{Deserialize, Serialize};

use crate::{AgentSlot, AgentStatus, Cooldown, EnemyId, ItemBonus, ItemId, Pos, TickEvent};

/// Tile as seen by a recipient. `Ladder` is only reported once revealed to that recipient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    Floor,
    Wall,
    Ladder,
}

/// Full tile layout of one dungeon level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DungeonView {
    pub depth: u32,
    pub width: u32,
    pub height: u32,
    pub tiles: Vec<TileKind>, // row-major
}

impl DungeonView {
    pub fn tile(&self, pos: Pos) -> Option<TileKind> {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.width as i32 || pos.y >= self.height as i32 {
            return None;
        }
        self.tiles
            .get(pos.y as usize * self.width as usize + pos.x as usize)
            .copied()
    }

    /// Position of the ladder, if this view reveals it.
    pub fn ladder(&self) -> Option<Pos> {
        let width = self.width.max(1) as usize;
        self.tiles
            .iter()
            .position(|t| *t == TileKind::Ladder)
            .map(|i| Pos::new((i % width) as i32, (i / width) as i32))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentView {
    pub slot: AgentSlot,
    pub depth: u32,
    pub pos: Pos,
    pub health: i32,
    pub max_health: i32,
    pub mana: i32,
    pub max_mana: i32,
    pub damage: i32,
    pub armor: i32,
    pub level: u32,
    pub experience: u32,
    pub cooldown: Cooldown,
    pub penalized: bool,
    pub status: AgentStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyView {
    pub id: EnemyId,
    pub depth: u32,
    pub pos: Pos,
    pub health: i32,
    pub max_health: i32,
    pub damage: i32,
    pub cooldown: Cooldown,
    pub penalized: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: ItemId,
    pub depth: u32,
    pub slot: u16,
    pub pos: Pos,
    pub bonus: ItemBonus,
}

/// `STATE_UPDATE`: sent to every agent and spectator after each resolved tick.
///
/// `tick` is the tick the recipient may now submit an action for. `maps` only carries levels
/// whose layout the recipient has not seen in its current form; it is empty on most ticks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub tick: u64,
    /// `None` for spectators.
    pub viewer: Option<AgentSlot>,
    #[serde(default)]
    pub maps: Vec<DungeonView>,
    pub agents: Vec<AgentView>,
    pub enemies: Vec<EnemyView>,
    pub items: Vec<ItemView>,
    pub separation_ticks: u32,
    #[serde(default)]
    pub events: Vec<TickEvent>,
}

impl StateUpdate {
    pub fn agent(&self, slot: AgentSlot) -> Option<&AgentView> {
        self.agents.iter().find(|a| a.slot == slot)
    }

    pub fn map(&self, depth: u32) -> Option<&DungeonView> {
        self.maps.iter().find(|m| m.depth == depth)
    }
}

/// Why a game ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOverReason {
    /// The loser's health reached zero.
    Killed,
    /// Both agents died on the same tick; the winner was drawn at random.
    DoubleKnockout,
    /// The loser disconnected mid-game.
    Forfeit,
    BothDisconnected,
    /// The lobby's coordinator crashed and was shut down by its supervisor.
    LobbyFault,
}

/// `GAME_OVER`: terminal broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOver {
    pub winner: Option<AgentSlot>,
    pub reason: GameOverReason,
    pub final_tick: u64,
}
