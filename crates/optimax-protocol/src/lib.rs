//! Wire types shared by the OptiMAX Rogue server, bots and spectators.
//!
//! Everything here is plain data: positions, actions, per-recipient state views and the
//! events produced while resolving a tick. The authoritative simulation lives in
//! `optimax-core`; the lobby/network layer lives in `optimax-server`.

mod event;
mod ids;
pub mod render;
mod snapshot;
mod types;
pub mod wire;

pub use event::*;
pub use ids::*;
pub use snapshot::*;
pub use types::*;
