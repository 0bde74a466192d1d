//! UDP endpoint: renet connections over a netcode transport.
//!
//! The endpoint knows nothing about lobbies. It yields connection events and raw packets, and
//! takes [`ServerMessage`]s to encode and queue.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use renet::{RenetServer, ServerEvent};
use renet_netcode::{NetcodeServerTransport, ServerAuthentication, ServerConfig as NetcodeConfig};
use tracing::{error, info, warn};

use crate::channels::{channel_for, channel_id, connection_config};
use crate::config::ServerConfig;
use crate::controller::ClientId;
use crate::protocol::{serialize_server_message, ServerMessage};

/// Netcode protocol id; clients built for another id are refused during the handshake.
pub const PROTOCOL_ID: u64 = 0x0971_3A_0001;

#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub public_address: SocketAddr,
    /// Agents plus spectators, across every lobby
    pub max_clients: usize,
    /// Netcode private key; connections are unauthenticated when `None`
    pub private_key: Option<[u8; 32]>,
}

impl From<&ServerConfig> for TransportConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            public_address: config.bind_address,
            max_clients: config.max_clients,
            private_key: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to bind socket to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    #[error("Failed to determine bound address for {0}: {1}")]
    LocalAddrFailed(SocketAddr, std::io::Error),

    #[error("Failed to configure socket: {0}")]
    SocketConfig(std::io::Error),

    #[error("Failed to create transport: {0}")]
    TransportCreation(String),
}

fn unix_now() -> Duration {
    // Only netcode token expiry reads this; a clock before 1970 just makes tokens look old.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

fn bind(config: &TransportConfig) -> Result<(UdpSocket, SocketAddr), TransportError> {
    let socket = UdpSocket::bind(config.public_address)
        .map_err(|e| TransportError::BindFailed(config.public_address, e))?;
    let bound = socket
        .local_addr()
        .map_err(|e| TransportError::LocalAddrFailed(config.public_address, e))?;
    socket
        .set_nonblocking(true)
        .map_err(TransportError::SocketConfig)?;
    Ok((socket, bound))
}

/// One frame's worth of input from the network.
#[derive(Debug, Default)]
pub struct Incoming {
    pub connected: Vec<ClientId>,
    pub disconnected: Vec<ClientId>,
    pub packets: Vec<(ClientId, Vec<u8>)>,
}

/// Renet server and its netcode transport, driven once per frame.
pub struct ServerRunner {
    renet: RenetServer,
    transport: NetcodeServerTransport,
}

impl ServerRunner {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let (socket, bound) = bind(&config)?;

        let authentication = match config.private_key {
            Some(private_key) => ServerAuthentication::Secure { private_key },
            None => ServerAuthentication::Unsecure,
        };
        let transport = NetcodeServerTransport::new(
            NetcodeConfig {
                current_time: unix_now(),
                max_clients: config.max_clients,
                protocol_id: PROTOCOL_ID,
                public_addresses: vec![bound],
                authentication,
            },
            socket,
        )
        .map_err(|e| TransportError::TransportCreation(e.to_string()))?;

        info!(
            address = %bound,
            max_clients = config.max_clients,
            protocol = format_args!("{PROTOCOL_ID:016x}"),
            "transport bound"
        );

        Ok(Self {
            renet: RenetServer::new(connection_config()),
            transport,
        })
    }

    /// Advance by `delta` and collect what arrived since the last frame.
    pub fn receive(&mut self, delta: Duration) -> Incoming {
        self.renet.update(delta);
        if let Err(e) = self.transport.update(delta, &mut self.renet) {
            error!(error = %e, "transport update failed");
        }

        let mut incoming = Incoming::default();
        while let Some(event) = self.renet.get_event() {
            match event {
                ServerEvent::ClientConnected { client_id } => incoming.connected.push(client_id),
                ServerEvent::ClientDisconnected { client_id, reason } => {
                    info!(client = client_id, ?reason, "connection closed");
                    incoming.disconnected.push(client_id);
                }
            }
        }
        for client in self.renet.clients_id() {
            while let Some(packet) = self.renet.receive_message(client, channel_id::COMMANDS) {
                incoming.packets.push((client, packet.to_vec()));
            }
        }
        incoming
    }

    /// Encode and queue a message. Messages for clients that already left are dropped.
    pub fn send(&mut self, client: ClientId, message: &ServerMessage) {
        if !self.renet.is_connected(client) {
            return;
        }
        match serialize_server_message(message) {
            Ok(data) => self.renet.send_message(client, channel_for(message), data),
            Err(e) => warn!(client, error = %e, "failed to encode message"),
        }
    }

    /// Put everything queued this frame on the wire.
    pub fn flush(&mut self) {
        self.transport.send_packets(&mut self.renet);
    }

    pub fn disconnect_all(&mut self) {
        self.renet.disconnect_all();
        self.flush();
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.addresses().first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ephemeral() -> TransportConfig {
        TransportConfig {
            public_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..TransportConfig::from(&ServerConfig::default())
        }
    }

    #[test]
    fn config_follows_the_server_config() {
        let server = ServerConfig {
            max_clients: 10,
            ..ServerConfig::default()
        };
        let transport = TransportConfig::from(&server);
        assert_eq!(transport.max_clients, 10);
        assert_eq!(transport.public_address, server.bind_address);
        assert!(transport.private_key.is_none());
    }

    #[test]
    fn idle_endpoint_has_nothing_to_report() {
        let mut runner = match ServerRunner::new(ephemeral()) {
            Ok(runner) => runner,
            Err(TransportError::BindFailed(_, err))
                if err.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                // Some sandboxed environments disallow socket binds.
                return;
            }
            Err(err) => panic!("transport error: {err:?}"),
        };
        assert_ne!(runner.local_addr().map(|a| a.port()), Some(0));

        let incoming = runner.receive(Duration::from_millis(16));
        assert!(incoming.connected.is_empty());
        assert!(incoming.packets.is_empty());

        // Unknown clients are silently skipped.
        runner.send(42, &ServerMessage::ActionAccepted { tick: 0 });
        runner.flush();
    }
}
