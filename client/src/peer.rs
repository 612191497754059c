//! Client end of the peer link.
//!
//! One driver task per connection attempt negotiates over signaling, opens
//! both channels and then supervises the socket tasks. Whatever ends first
//! (either channel or the signaling socket) ends the link, and the driver
//! reports exactly one [`LinkEvent::Closed`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use shared::codec::Channel;
use shared::transport::{
    read_frame, write_frame, Datagram, IceCandidate, SessionDescription, SignalMessage,
    TransportError, HANDSHAKE_ACK,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::network::{ClientConfig, NetworkError};
use crate::signaling::SignalingChannel;

pub(crate) enum LinkEvent {
    Opened(Link),
    Data { channel: Channel, payload: Vec<u8> },
    Closed(String),
}

/// Send half of an open link.
pub(crate) struct Link {
    reliable: mpsc::UnboundedSender<Vec<u8>>,
    udp: Arc<UdpSocket>,
}

impl Link {
    pub fn send(&self, channel: Channel, payload: &[u8]) {
        match channel {
            Channel::Reliable => {
                let _ = self.reliable.send(payload.to_vec());
            }
            Channel::Unreliable => {
                if let Err(e) = self.udp.try_send(&Datagram::data(payload)) {
                    debug!("Dropped datagram: {}", e);
                }
            }
        }
    }
}

/// What the server offered: session credentials and one address per channel.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Offer {
    pub description: SessionDescription,
    pub reliable: SocketAddr,
    pub unreliable: SocketAddr,
}

/// Runs one connection attempt to completion.
pub(crate) async fn run(url: String, config: ClientConfig, events: mpsc::UnboundedSender<LinkEvent>) {
    let reason = match connect_and_serve(&url, &config, &events).await {
        Ok(reason) => reason,
        Err(e) => e.to_string(),
    };
    let _ = events.send(LinkEvent::Closed(reason));
}

async fn connect_and_serve(
    url: &str,
    config: &ClientConfig,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> Result<String, NetworkError> {
    let mut tasks = JoinSet::new();
    let link = tokio::time::timeout(config.connect_timeout, establish(url, config, &mut tasks, events))
        .await
        .map_err(|_| TransportError::Timeout("peer link"))??;

    if events.send(LinkEvent::Opened(link)).is_err() {
        return Ok("client dropped".to_string());
    }

    // The JoinSet aborts the remaining tasks when it goes out of scope.
    let reason = match tasks.join_next().await {
        Some(Ok(reason)) => reason,
        Some(Err(e)) => format!("link task failed: {e}"),
        None => "link closed".to_string(),
    };
    Ok(reason)
}

async fn establish(
    url: &str,
    config: &ClientConfig,
    tasks: &mut JoinSet<String>,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> Result<Link, NetworkError> {
    let mut signaling = SignalingChannel::connect(url).await?;
    signaling.send(&SignalMessage::Hello).await?;
    let offer = negotiate(&mut signaling).await?;
    let secret = offer.description.secret.clone();
    debug!(
        "Session {} offered reliable {} unreliable {}",
        offer.description.session_id, offer.reliable, offer.unreliable
    );

    let udp = UdpSocket::bind(SocketAddr::new(unspecified_like(offer.unreliable.ip()), 0)).await?;
    udp.connect(offer.unreliable).await?;
    let candidate = IceCandidate::host(Channel::Unreliable, udp.local_addr()?);
    signaling.send(&SignalMessage::IceCandidate { candidate }).await?;

    let stream = TcpStream::connect(offer.reliable).await?;
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();
    write_frame(&mut writer, secret.as_bytes()).await?;
    match read_frame(&mut reader).await? {
        Some(ack) if ack == HANDSHAKE_ACK => {}
        _ => {
            return Err(TransportError::Handshake("server refused the session secret".into()).into())
        }
    }

    bind_unreliable(&udp, &secret, config.bind_retry).await?;
    let udp = Arc::new(udp);
    info!("Peer link open (session {})", offer.description.session_id);

    let (reliable_tx, reliable_rx) = mpsc::unbounded_channel();
    tasks.spawn(write_reliable(writer, reliable_rx));
    tasks.spawn(read_reliable(reader, events.clone()));
    tasks.spawn(read_unreliable(udp.clone(), events.clone()));
    tasks.spawn(signaling.closed());

    Ok(Link {
        reliable: reliable_tx,
        udp,
    })
}

/// Answers the offer and collects one candidate per channel.
pub(crate) async fn negotiate(signaling: &mut SignalingChannel) -> Result<Offer, NetworkError> {
    let mut description = None;
    let mut reliable = None;
    let mut unreliable = None;

    loop {
        if let (Some(description), Some(reliable), Some(unreliable)) =
            (&description, reliable, unreliable)
        {
            return Ok(Offer {
                description: SessionDescription::clone(description),
                reliable,
                unreliable,
            });
        }

        let message = signaling
            .recv()
            .await?
            .ok_or(TransportError::SignalingClosed)?;
        match message {
            SignalMessage::Offer { sdp } => {
                let offer = SessionDescription::parse(&sdp)?;
                let answer = SessionDescription::new(offer.session_id, offer.secret.clone());
                signaling
                    .send(&SignalMessage::Answer { sdp: answer.to_sdp() })
                    .await?;
                description = Some(offer);
            }
            SignalMessage::IceCandidate { candidate } => {
                let parsed = candidate.parse()?;
                match parsed.channel {
                    Channel::Reliable => reliable = Some(parsed.addr),
                    Channel::Unreliable => unreliable = Some(parsed.addr),
                }
            }
            other => debug!("Ignoring {:?} during negotiation", other),
        }
    }
}

/// Repeats the binding request until the server acknowledges it.
async fn bind_unreliable(socket: &UdpSocket, secret: &str, retry: Duration) -> Result<(), NetworkError> {
    let request = Datagram::Bind {
        secret: secret.to_string(),
    }
    .encode();
    let mut buf = vec![0u8; 2048];

    loop {
        socket.send(&request).await?;
        match tokio::time::timeout(retry, socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                if let Ok(Datagram::BindAck) = Datagram::decode(&buf[..len]) {
                    return Ok(());
                }
            }
            Ok(Err(e)) => debug!("Binding request failed: {}", e),
            Err(_) => debug!("Binding request unanswered, retrying"),
        }
    }
}

fn unspecified_like(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

async fn write_reliable(mut writer: OwnedWriteHalf, mut frames: mpsc::UnboundedReceiver<Vec<u8>>) -> String {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            return format!("reliable write failed: {e}");
        }
    }
    "reliable channel closed locally".to_string()
}

async fn read_reliable(mut reader: OwnedReadHalf, events: mpsc::UnboundedSender<LinkEvent>) -> String {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(payload)) => {
                let event = LinkEvent::Data {
                    channel: Channel::Reliable,
                    payload,
                };
                if events.send(event).is_err() {
                    return "client dropped".to_string();
                }
            }
            Ok(None) => return "server closed the reliable channel".to_string(),
            Err(e) => return format!("reliable read failed: {e}"),
        }
    }
}

async fn read_unreliable(socket: Arc<UdpSocket>, events: mpsc::UnboundedSender<LinkEvent>) -> String {
    let mut buf = vec![0u8; 65_536];
    loop {
        let len = match socket.recv(&mut buf).await {
            Ok(len) => len,
            Err(e) => {
                debug!("Unreliable receive failed: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };
        match Datagram::decode(&buf[..len]) {
            Ok(Datagram::Data(payload)) => {
                let event = LinkEvent::Data {
                    channel: Channel::Unreliable,
                    payload,
                };
                if events.send(event).is_err() {
                    return "client dropped".to_string();
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Dropped datagram: {}", e),
        }
    }
}
