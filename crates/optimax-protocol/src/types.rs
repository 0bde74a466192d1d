use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tile coordinate inside a dungeon. Origin is the top-left corner, `y` grows downwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

impl Pos {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn manhattan(self, other: Pos) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    #[inline]
    pub fn step(self, direction: Direction) -> Pos {
        let (dx, dy) = direction.delta();
        Pos {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// The four orthogonal neighbours in `Direction::ALL` order.
    pub fn neighbors(self) -> impl Iterator<Item = Pos> {
        Direction::ALL.into_iter().map(move |d| self.step(d))
    }
}

/// Cardinal movement directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    #[inline]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }
}

/// One intent per actor per tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum Action {
    Move {
        direction: Direction,
    },
    #[default]
    Stay,
    AttackTile {
        target: Pos,
    },
    Heal,
}

impl Action {
    pub fn kind(self) -> ActionKind {
        match self {
            Action::Move { .. } => ActionKind::Move,
            Action::Stay => ActionKind::Stay,
            Action::AttackTile { .. } => ActionKind::Attack,
            Action::Heal => ActionKind::Heal,
        }
    }
}

/// Discriminant used by the flat `SUBMIT_ACTION` wire shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Move,
    Stay,
    Attack,
    Heal,
}

/// Flat action as submitted by clients: a kind plus whichever argument it needs.
///
/// Bridges and GUI relays build these field by field, so a kind can arrive without its
/// argument. Converting to [`Action`] reports that as an [`ActionError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub kind: ActionKind,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub target: Option<Pos>,
}

impl ActionRequest {
    pub fn stay() -> Self {
        Action::Stay.into()
    }
}

impl From<Action> for ActionRequest {
    fn from(action: Action) -> Self {
        let (direction, target) = match action {
            Action::Move { direction } => (Some(direction), None),
            Action::AttackTile { target } => (None, Some(target)),
            Action::Stay | Action::Heal => (None, None),
        };
        Self {
            kind: action.kind(),
            direction,
            target,
        }
    }
}

impl TryFrom<ActionRequest> for Action {
    type Error = ActionError;

    fn try_from(req: ActionRequest) -> Result<Self, Self::Error> {
        match req.kind {
            ActionKind::Move => req
                .direction
                .map(|direction| Action::Move { direction })
                .ok_or(ActionError::MissingDirection),
            ActionKind::Attack => req
                .target
                .map(|target| Action::AttackTile { target })
                .ok_or(ActionError::MissingTarget),
            ActionKind::Stay => Ok(Action::Stay),
            ActionKind::Heal => Ok(Action::Heal),
        }
    }
}

/// A submission that cannot be turned into an [`Action`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ActionError {
    #[error("move submitted without a direction")]
    MissingDirection,
    #[error("attack submitted without a target tile")]
    MissingTarget,
}

/// Attack cooldown. `OnCooldown(n)` blocks attacking and defending for `n` more ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Cooldown {
    #[default]
    Ready,
    OnCooldown(u8),
}

impl Cooldown {
    #[inline]
    pub fn is_ready(self) -> bool {
        matches!(self, Cooldown::Ready)
    }

    /// Count down by one tick; reaching zero clears the cooldown.
    pub fn tick_down(self) -> Self {
        match self {
            Cooldown::Ready | Cooldown::OnCooldown(0 | 1) => Cooldown::Ready,
            Cooldown::OnCooldown(n) => Cooldown::OnCooldown(n - 1),
        }
    }

    pub fn remaining(self) -> u8 {
        match self {
            Cooldown::Ready => 0,
            Cooldown::OnCooldown(n) => n,
        }
    }
}

/// Flat stat bonus carried by an item and applied on pickup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBonus {
    #[serde(default)]
    pub max_health: i32,
    #[serde(default)]
    pub max_mana: i32,
    #[serde(default)]
    pub damage: i32,
    #[serde(default)]
    pub armor: i32,
}

impl ItemBonus {
    pub fn is_empty(&self) -> bool {
        *self == ItemBonus::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AgentStatus {
    #[default]
    Alive,
    /// Spent the last tick healing.
    Healing,
    Dead,
}
