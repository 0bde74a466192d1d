//! OptiMAX Rogue server
//!
//! Authoritative lobby and tick server using Renet for networking.
//! Each running lobby is its own tokio task; see [`game::TurnCoordinator`].

pub mod channels;
pub mod config;
pub mod controller;
pub mod game;
pub mod lobby;
pub mod protocol;
pub mod server;
pub mod sessions;
pub mod transport;

pub use channels::*;
pub use config::{ConfigError, RateLimitConfig, ServerConfig};
pub use controller::{
    BotController, ClientId, Controller, Outbound, Outbox, RemoteController, SpectatorController,
};
pub use game::{GameOutcome, Mailbox, SubmitError, TurnCoordinator, TurnTiming};
pub use lobby::{Lobby, LobbyError, LobbyManager, LobbyStatus};
pub use protocol::*;
pub use server::Server;
pub use sessions::SessionRegistry;
pub use transport::{Incoming, ServerRunner, TransportConfig, TransportError, PROTOCOL_ID};
