//! Deterministic tick simulation for OptiMAX Rogue.
//!
//! Given a seed and the two agents' actions for every tick, [`GameEngine::step`] always
//! produces the same world. Networking, timeouts and lobbies live in `optimax-server`.

pub mod bots;
pub mod combat;
mod engine;
mod entities;
pub mod progression;
mod rng;
mod rules;
pub mod selfplay;
pub mod spawner;
mod state;
pub mod view;
mod world;
pub mod worldgen;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::engine::*;
pub use crate::entities::*;
pub use crate::rng::*;
pub use crate::rules::*;
pub use crate::selfplay::{
    run_batch_selfplay, run_selfplay, AggregateMetrics, BatchSelfPlayResult, BotKind,
    GameMetrics, SelfPlayConfig, SelfPlayOutcome, SelfPlayResult,
};
pub use crate::state::*;
pub use crate::view::{agent_update, spectator_update, MapMemory};
pub use crate::world::*;
pub use crate::worldgen::{WorldGenConfig, WorldGenError, WorldGenerator};
