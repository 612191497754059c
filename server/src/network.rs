//! Server network layer: typed messages over the peer links

use std::net::SocketAddr;

use log::{info, warn};
use shared::codec::{Codec, DecodeError, EncodeError, SchemaError};
use shared::protocol::Message;
use shared::transport::TransportError;
use thiserror::Error;

use crate::config::ListenConfig;
use crate::peer_manager::{ClientId, PeerEvent, PeerManager};

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode message: {0}")]
    Encode(#[from] EncodeError),
    #[error("invalid protocol table: {0}")]
    Schema(#[from] SchemaError),
}

/// What the game loop sees from the network.
#[derive(Debug)]
pub enum ServerEvent {
    Connected(ClientId),
    Message { client: ClientId, message: Message },
    Disconnected(ClientId),
    /// A payload from `client` could not be decoded. The link stays open.
    Error { client: ClientId, error: DecodeError },
}

/// Accepts peers and exchanges protocol messages with them.
pub struct NetServer {
    codec: Codec<Message>,
    peers: PeerManager,
}

impl NetServer {
    pub async fn listen(config: &ListenConfig) -> Result<Self, NetworkError> {
        let codec = Codec::new()?;
        let peers = PeerManager::bind(config).await?;
        info!("Server listening on {}", peers.local_addr());
        if !config.simulate_latency.is_zero() || config.simulate_packet_loss > 0.0 {
            info!(
                "Simulating {:?} latency and {}% loss on outbound traffic",
                config.simulate_latency, config.simulate_packet_loss
            );
        }
        Ok(Self { codec, peers })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.peers.local_addr()
    }

    /// Waits for the next connection change or inbound message. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        let event = match self.peers.next_event().await? {
            PeerEvent::Open(client) => ServerEvent::Connected(client),
            PeerEvent::Closed(client) => ServerEvent::Disconnected(client),
            PeerEvent::Data {
                client, payload, ..
            } => match self.codec.decode(&payload) {
                Ok(message) => ServerEvent::Message { client, message },
                Err(error) => {
                    warn!("Undecodable payload from client {}: {}", client, error);
                    ServerEvent::Error { client, error }
                }
            },
        };
        Some(event)
    }

    /// Encodes once and sends on the channel the message type declares.
    pub fn send_message(&mut self, client: ClientId, message: &Message) -> Result<(), NetworkError> {
        let channel = self.codec.channel_for(message)?;
        let bytes = self.codec.encode(message)?;
        self.peers.send(client, channel, &bytes);
        Ok(())
    }

    /// Sends to every connected client except `exclude`.
    pub fn broadcast_message(
        &mut self,
        message: &Message,
        exclude: Option<ClientId>,
    ) -> Result<(), NetworkError> {
        let channel = self.codec.channel_for(message)?;
        let bytes = self.codec.encode(message)?;
        for client in self.peers.client_ids() {
            if Some(client) != exclude {
                self.peers.send(client, channel, &bytes);
            }
        }
        Ok(())
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.peers.client_ids()
    }

    pub fn connected_count(&self) -> usize {
        self.peers.connected_count()
    }

    pub fn disconnect(&mut self, client: ClientId) {
        self.peers.close(client);
    }

    pub fn stop(&mut self) {
        info!("Server stopping with {} clients", self.connected_count());
        self.peers.stop();
    }
}
