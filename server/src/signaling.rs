//! WebSocket signaling endpoint. Each accepted socket becomes a session whose
//! JSON messages are posted to the peer manager's event queue.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, warn};
use shared::transport::SignalMessage;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};

use crate::peer_manager::{LinkEvent, SessionId};

/// Accepts signaling connections until the event queue is gone.
pub(crate) async fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<LinkEvent>) {
    let mut next_session: SessionId = 1;

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Signaling accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };
        if events.is_closed() {
            break;
        }

        let session = next_session;
        next_session += 1;
        tokio::spawn(handle_connection(stream, addr, session, events.clone()));
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    session: SessionId,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Signaling handshake failed for {}: {}", addr, e);
            return;
        }
    };
    debug!("Signaling session {} opened from {}", session, addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<SignalMessage>();

    if events
        .send(LinkEvent::SignalingOpened { session, outbox })
        .is_err()
    {
        return;
    }

    // Ends when the manager drops the session's outbox.
    let sender_task = tokio::spawn(async move {
        while let Some(message) = outbox_rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize signal: {}", e);
                    continue;
                }
            };
            if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match SignalMessage::from_json(&text) {
                Ok(message) => {
                    if events.send(LinkEvent::Signal { session, message }).is_err() {
                        break;
                    }
                }
                Err(e) => debug!("Invalid signal from session {}: {}", session, e),
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Signaling session {} errored: {}", session, e);
                break;
            }
        }
    }

    debug!("Signaling session {} closed", session);
    if events.send(LinkEvent::SignalingClosed { session }).is_err() {
        sender_task.abort();
    }
}
