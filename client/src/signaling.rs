//! Client end of the WebSocket signaling socket.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::debug;
use shared::transport::SignalMessage;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::network::NetworkError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) struct SignalingChannel {
    sink: SplitSink<WsStream, WsMessage>,
    stream: SplitStream<WsStream>,
}

impl SignalingChannel {
    pub async fn connect(url: &str) -> Result<Self, NetworkError> {
        let (ws_stream, _) = connect_async(url).await?;
        debug!("Signaling connected to {}", url);
        let (sink, stream) = ws_stream.split();
        Ok(Self { sink, stream })
    }

    pub async fn send(&mut self, message: &SignalMessage) -> Result<(), NetworkError> {
        let text = message.to_json()?;
        self.sink.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    /// Next signal, or `None` once the socket is closed.
    pub async fn recv(&mut self) -> Result<Option<SignalMessage>, NetworkError> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                WsMessage::Text(text) => match SignalMessage::from_json(&text) {
                    Ok(message) => return Ok(Some(message)),
                    Err(e) => debug!("Ignoring invalid signal: {}", e),
                },
                WsMessage::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Drains late signals until the server closes the socket.
    pub async fn closed(mut self) -> String {
        loop {
            match self.recv().await {
                Ok(Some(message)) => debug!("Ignoring late signal {:?}", message),
                Ok(None) => return "signaling closed".to_string(),
                Err(e) => return format!("signaling failed: {e}"),
            }
        }
    }
}
