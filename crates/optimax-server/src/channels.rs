//! Renet channels and which server message travels on which.
//!
//! Everything that drives a game (joins, submissions, state updates, game over) must arrive
//! complete and in order; only ping replies may be dropped.

use std::time::Duration;

use renet::{ChannelConfig, ConnectionConfig, SendType};

use crate::protocol::ServerMessage;

pub mod channel_id {
    /// Lobby traffic, action submissions and state updates
    pub const COMMANDS: u8 = 0;
    /// Ping/pong
    pub const HEARTBEAT: u8 = 1;
}

/// A full dungeon map is the largest message; several can be in flight per client.
const COMMAND_MEMORY: usize = 5 * 1024 * 1024;
const HEARTBEAT_MEMORY: usize = 64 * 1024;

/// Ticks can be as short as the action window, so resend well inside it.
const COMMAND_RESEND: Duration = Duration::from_millis(200);

pub fn create_channel_configs() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig {
            channel_id: channel_id::COMMANDS,
            max_memory_usage_bytes: COMMAND_MEMORY,
            send_type: SendType::ReliableOrdered {
                resend_time: COMMAND_RESEND,
            },
        },
        ChannelConfig {
            channel_id: channel_id::HEARTBEAT,
            max_memory_usage_bytes: HEARTBEAT_MEMORY,
            send_type: SendType::Unreliable,
        },
    ]
}

/// Same channel layout in both directions.
pub fn connection_config() -> ConnectionConfig {
    ConnectionConfig {
        available_bytes_per_tick: 60_000,
        server_channels_config: create_channel_configs(),
        client_channels_config: create_channel_configs(),
    }
}

pub fn channel_for(message: &ServerMessage) -> u8 {
    match message {
        ServerMessage::Pong { .. } => channel_id::HEARTBEAT,
        _ => channel_id::COMMANDS,
    }
}
