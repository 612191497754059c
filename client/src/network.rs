//! Client network session: typed messages over one peer link.

use std::io;
use std::time::Duration;

use log::{info, warn};
use shared::codec::{Codec, DecodeError, EncodeError, SchemaError};
use shared::protocol::Message;
use shared::transport::{SignalingError, TransportError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;

use crate::peer::{self, Link, LinkEvent};

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode message: {0}")]
    Encode(#[from] EncodeError),
    #[error("invalid protocol table: {0}")]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound for negotiation plus opening both channels.
    pub connect_timeout: Duration,
    /// Interval between unanswered binding requests.
    pub bind_retry: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            bind_retry: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
pub enum ClientEvent {
    Connected,
    Message(Message),
    /// Reported once per connection attempt, with the reason it ended.
    Disconnected(String),
    /// An inbound payload could not be decoded and was dropped.
    Error(DecodeError),
}

pub struct NetClient {
    codec: Codec<Message>,
    config: ClientConfig,
    state: ConnectionState,
    events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    link: Option<Link>,
    driver: Option<JoinHandle<()>>,
    pending_disconnect: Option<String>,
}

impl NetClient {
    pub fn new(config: ClientConfig) -> Result<Self, NetworkError> {
        Ok(Self {
            codec: Codec::new()?,
            config,
            state: ConnectionState::Disconnected,
            events: None,
            link: None,
            driver: None,
            pending_disconnect: None,
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Starts connecting to the signaling endpoint at `url`
    /// (e.g. `ws://127.0.0.1:8080`). Progress arrives through `next_event`.
    pub fn connect(&mut self, url: &str) {
        if self.state != ConnectionState::Disconnected {
            warn!("Already connected or connecting, ignoring connect to {}", url);
            return;
        }
        info!("Connecting to {}", url);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events = Some(events_rx);
        self.pending_disconnect = None;
        self.state = ConnectionState::Connecting;
        self.driver = Some(tokio::spawn(peer::run(
            url.to_string(),
            self.config.clone(),
            events_tx,
        )));
    }

    /// Sends on the channel the message type declares. A no-op unless connected.
    pub fn send_message(&mut self, message: &Message) -> Result<(), NetworkError> {
        let Some(link) = &self.link else {
            return Ok(());
        };
        let channel = self.codec.channel_for(message)?;
        let bytes = self.codec.encode(message)?;
        link.send(channel, &bytes);
        Ok(())
    }

    /// Waits for the next event of the current connection attempt. Returns
    /// `None` when there is no attempt in progress. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        if let Some(reason) = self.pending_disconnect.take() {
            return Some(ClientEvent::Disconnected(reason));
        }

        let events = self.events.as_mut()?;
        let event = match events.recv().await? {
            LinkEvent::Opened(link) => {
                self.link = Some(link);
                self.state = ConnectionState::Connected;
                info!("Connected");
                ClientEvent::Connected
            }
            LinkEvent::Data { payload, .. } => match self.codec.decode(&payload) {
                Ok(message) => ClientEvent::Message(message),
                Err(error) => {
                    warn!("Undecodable payload from server: {}", error);
                    ClientEvent::Error(error)
                }
            },
            LinkEvent::Closed(reason) => {
                info!("Disconnected: {}", reason);
                self.reset();
                ClientEvent::Disconnected(reason)
            }
        };
        Some(event)
    }

    /// Closes the link. The `Disconnected` event is still delivered once.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        info!("Disconnecting");
        self.reset();
        self.pending_disconnect = Some("disconnected by client".to_string());
    }

    fn reset(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.events = None;
        self.link = None;
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for NetClient {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::ClientSnapshot;

    #[test]
    fn test_send_is_a_no_op_while_disconnected() {
        let mut client = NetClient::new(ClientConfig::default()).unwrap();
        let snapshot = Message::ClientSnapshot(ClientSnapshot {
            tick: 1,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            angle: 0.0,
        });
        assert!(client.send_message(&snapshot).is_ok());
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_no_events_without_a_connection() {
        let mut client = NetClient::new(ClientConfig::default()).unwrap();
        assert!(tokio_test::block_on(client.next_event()).is_none());
    }

    #[tokio::test]
    async fn test_failed_connect_reports_one_disconnect() {
        let config = ClientConfig {
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let mut client = NetClient::new(config).unwrap();
        // Nothing listens on port 1 of the loopback address.
        client.connect("ws://127.0.0.1:1");
        assert_eq!(client.connection_state(), ConnectionState::Connecting);

        match client.next_event().await {
            Some(ClientEvent::Disconnected(_)) => {}
            other => panic!("expected disconnect, got {other:?}"),
        }
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert!(client.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_explicit_disconnect_is_reported_once() {
        let mut client = NetClient::new(ClientConfig::default()).unwrap();
        client.connect("ws://127.0.0.1:1");
        client.disconnect();
        client.disconnect();

        assert!(matches!(
            client.next_event().await,
            Some(ClientEvent::Disconnected(_))
        ));
        assert!(client.next_event().await.is_none());
    }
}
