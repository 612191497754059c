//! Peer link lifecycle on the server side.
//!
//! Every signaling session gets its own TCP listener and UDP socket. Network
//! tasks never touch manager state; they post [`LinkEvent`]s and the owner of
//! the [`PeerManager`] turns them into [`PeerEvent`]s by awaiting
//! [`PeerManager::next_event`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::codec::Channel;
use shared::transport::{
    generate_secret, read_frame, write_frame, Datagram, IceCandidate, SessionDescription,
    SignalMessage, TransportError, HANDSHAKE_ACK,
};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ListenConfig;
use crate::signaling;

pub(crate) type SessionId = u64;

/// Server-assigned identity of a peer whose link is fully open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Posted by network tasks to the manager.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    SignalingOpened {
        session: SessionId,
        outbox: mpsc::UnboundedSender<SignalMessage>,
    },
    Signal {
        session: SessionId,
        message: SignalMessage,
    },
    SignalingClosed {
        session: SessionId,
    },
    ReliableOpen {
        session: SessionId,
        writer: mpsc::UnboundedSender<Vec<u8>>,
    },
    UnreliableOpen {
        session: SessionId,
        remote: SocketAddr,
    },
    Data {
        session: SessionId,
        channel: Channel,
        payload: Vec<u8>,
    },
    LinkClosed {
        session: SessionId,
        reason: String,
    },
}

#[derive(Debug, PartialEq)]
pub enum PeerEvent {
    /// Both channels of a peer are open.
    Open(ClientId),
    Data {
        client: ClientId,
        channel: Channel,
        payload: Vec<u8>,
    },
    /// Reported once per opened peer, whatever closed it.
    Closed(ClientId),
}

/// Artificial latency and loss applied to outbound sends.
#[derive(Debug, Clone, Default)]
pub struct NetworkConditions {
    pub latency: Duration,
    pub loss_percent: f32,
}

impl NetworkConditions {
    pub fn from_config(config: &ListenConfig) -> Self {
        Self {
            latency: config.simulate_latency,
            loss_percent: config.simulate_packet_loss.clamp(0.0, 100.0),
        }
    }

    pub fn should_drop<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.loss_percent > 0.0 && rng.gen::<f32>() * 100.0 < self.loss_percent
    }
}

struct Peer {
    signaling: mpsc::UnboundedSender<SignalMessage>,
    secret: Option<String>,
    answered: bool,
    reliable: Option<mpsc::UnboundedSender<Vec<u8>>>,
    udp: Option<Arc<UdpSocket>>,
    udp_remote: Option<SocketAddr>,
    client: Option<ClientId>,
    tasks: Vec<JoinHandle<()>>,
}

impl Peer {
    fn new(signaling: mpsc::UnboundedSender<SignalMessage>) -> Self {
        Self {
            signaling,
            secret: None,
            answered: false,
            reliable: None,
            udp: None,
            udp_remote: None,
            client: None,
            tasks: Vec::new(),
        }
    }

    fn open_channels(&self) -> usize {
        usize::from(self.reliable.is_some()) + usize::from(self.udp_remote.is_some())
    }

    fn signal(&self, message: SignalMessage) {
        // A closed outbox means a SignalingClosed event is already queued.
        let _ = self.signaling.send(message);
    }
}

enum Route {
    Reliable(mpsc::UnboundedSender<Vec<u8>>),
    Unreliable(Arc<UdpSocket>, SocketAddr),
}

impl Route {
    fn deliver(&self, payload: &[u8]) {
        match self {
            Route::Reliable(writer) => {
                let _ = writer.send(payload.to_vec());
            }
            Route::Unreliable(socket, remote) => {
                if let Err(e) = socket.try_send_to(&Datagram::data(payload), *remote) {
                    debug!("Dropped datagram to {}: {}", remote, e);
                }
            }
        }
    }
}

pub struct PeerManager {
    local_addr: SocketAddr,
    candidate_ip: IpAddr,
    conditions: NetworkConditions,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events_rx: mpsc::UnboundedReceiver<LinkEvent>,
    peers: HashMap<SessionId, Peer>,
    clients: BTreeMap<ClientId, SessionId>,
    next_client_id: u32,
    rng: StdRng,
    loss_rng: StdRng,
    acceptor: JoinHandle<()>,
}

impl PeerManager {
    /// Starts accepting signaling connections on `config.addr`.
    pub async fn bind(config: &ListenConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.addr).await?;
        let local_addr = listener.local_addr()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let acceptor = tokio::spawn(signaling::accept_loop(listener, events_tx.clone()));

        Ok(Self {
            local_addr,
            candidate_ip: config.candidate_ip(local_addr.ip()),
            conditions: NetworkConditions::from_config(config),
            events_tx,
            events_rx,
            peers: HashMap::new(),
            clients: BTreeMap::new(),
            next_client_id: 1,
            rng: StdRng::from_entropy(),
            loss_rng: match config.loss_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
            acceptor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub fn connected_count(&self) -> usize {
        self.clients.len()
    }

    /// Waits for the next peer-level event. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<PeerEvent> {
        loop {
            let event = self.events_rx.recv().await?;
            if let Some(event) = self.handle_link_event(event) {
                return Some(event);
            }
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) -> Option<PeerEvent> {
        match event {
            LinkEvent::SignalingOpened { session, outbox } => {
                self.peers.insert(session, Peer::new(outbox));
                None
            }
            LinkEvent::Signal { session, message } => self.handle_signal(session, message),
            LinkEvent::SignalingClosed { session } => {
                self.close_session(session, "signaling closed")
            }
            LinkEvent::ReliableOpen { session, writer } => {
                let peer = self.peers.get_mut(&session)?;
                peer.reliable = Some(writer);
                self.channel_opened(session, Channel::Reliable)
            }
            LinkEvent::UnreliableOpen { session, remote } => {
                let peer = self.peers.get_mut(&session)?;
                peer.udp_remote = Some(remote);
                self.channel_opened(session, Channel::Unreliable)
            }
            LinkEvent::Data {
                session,
                channel,
                payload,
            } => match self.peers.get(&session).and_then(|p| p.client) {
                Some(client) => Some(PeerEvent::Data {
                    client,
                    channel,
                    payload,
                }),
                None => {
                    debug!("Dropping {} bytes from session {} before open", payload.len(), session);
                    None
                }
            },
            LinkEvent::LinkClosed { session, reason } => self.close_session(session, &reason),
        }
    }

    fn handle_signal(&mut self, session: SessionId, message: SignalMessage) -> Option<PeerEvent> {
        match message {
            SignalMessage::Hello => {
                if self.peers.get(&session)?.secret.is_some() {
                    warn!("Ignoring repeated hello on session {}", session);
                    return None;
                }
                if let Err(e) = self.open_link(session) {
                    error!("Failed to open link for session {}: {}", session, e);
                    return self.close_session(session, "link setup failed");
                }
                None
            }
            SignalMessage::Answer { sdp } => {
                let peer = self.peers.get_mut(&session)?;
                match SessionDescription::parse(&sdp) {
                    Ok(answer)
                        if answer.session_id == session
                            && peer.secret.as_deref() == Some(answer.secret.as_str()) =>
                    {
                        peer.answered = true;
                        debug!("Session {} answered", session);
                        None
                    }
                    Ok(_) => {
                        warn!("Session {} answered with mismatched credentials", session);
                        self.close_session(session, "bad answer")
                    }
                    Err(e) => {
                        warn!("Session {} sent an invalid answer: {}", session, e);
                        self.close_session(session, "bad answer")
                    }
                }
            }
            SignalMessage::IceCandidate { candidate } => {
                match candidate.parse() {
                    Ok(remote) => debug!(
                        "Session {} remote {} candidate {}",
                        session,
                        remote.channel.label(),
                        remote.addr
                    ),
                    Err(e) => debug!("Session {} sent an unusable candidate: {}", session, e),
                }
                None
            }
            SignalMessage::Offer { .. } => {
                warn!("Ignoring offer from session {}", session);
                None
            }
        }
    }

    /// Binds the session's channel sockets and sends the offer and candidates.
    fn open_link(&mut self, session: SessionId) -> Result<(), TransportError> {
        let Some(peer) = self.peers.get_mut(&session) else {
            return Ok(());
        };
        let ip = self.local_addr.ip();

        let tcp = std::net::TcpListener::bind((ip, 0))?;
        tcp.set_nonblocking(true)?;
        let tcp = TcpListener::from_std(tcp)?;
        let udp = std::net::UdpSocket::bind((ip, 0))?;
        udp.set_nonblocking(true)?;
        let udp = Arc::new(UdpSocket::from_std(udp)?);

        let reliable_addr = SocketAddr::new(self.candidate_ip, tcp.local_addr()?.port());
        let unreliable_addr = SocketAddr::new(self.candidate_ip, udp.local_addr()?.port());
        let secret = generate_secret(&mut self.rng);

        peer.tasks.push(tokio::spawn(run_reliable(
            session,
            tcp,
            secret.clone(),
            self.events_tx.clone(),
        )));
        peer.tasks.push(tokio::spawn(run_unreliable(
            session,
            udp.clone(),
            secret.clone(),
            self.events_tx.clone(),
        )));
        peer.udp = Some(udp);

        let offer = SessionDescription::new(session, secret.clone());
        peer.secret = Some(secret);
        peer.signal(SignalMessage::Offer { sdp: offer.to_sdp() });
        peer.signal(SignalMessage::IceCandidate {
            candidate: IceCandidate::host(Channel::Reliable, reliable_addr),
        });
        peer.signal(SignalMessage::IceCandidate {
            candidate: IceCandidate::host(Channel::Unreliable, unreliable_addr),
        });

        debug!(
            "Offered session {} (reliable {}, unreliable {})",
            session, reliable_addr, unreliable_addr
        );
        Ok(())
    }

    fn channel_opened(&mut self, session: SessionId, channel: Channel) -> Option<PeerEvent> {
        let peer = self.peers.get_mut(&session)?;
        debug!(
            "Session {} {} channel open ({}/2)",
            session,
            channel.label(),
            peer.open_channels()
        );
        if peer.open_channels() < 2 || peer.client.is_some() {
            return None;
        }
        if !peer.answered {
            debug!("Session {} opened its channels before answering", session);
        }

        let client = ClientId(self.next_client_id);
        self.next_client_id += 1;
        peer.client = Some(client);
        self.clients.insert(client, session);
        info!("Client {} connected (session {})", client, session);
        Some(PeerEvent::Open(client))
    }

    fn close_session(&mut self, session: SessionId, reason: &str) -> Option<PeerEvent> {
        let peer = self.peers.remove(&session)?;
        for task in &peer.tasks {
            task.abort();
        }

        let client = peer.client?;
        self.clients.remove(&client);
        info!("Client {} disconnected: {}", client, reason);
        Some(PeerEvent::Closed(client))
    }

    fn roll_loss(&mut self) -> bool {
        self.conditions.should_drop(&mut self.loss_rng)
    }

    /// Sends `payload` on one channel of `client`. Unknown clients and closed
    /// channels are ignored.
    pub fn send(&mut self, client: ClientId, channel: Channel, payload: &[u8]) {
        if self.roll_loss() {
            debug!("Simulated loss of {} bytes to {}", payload.len(), client);
            return;
        }

        let Some(peer) = self.clients.get(&client).and_then(|s| self.peers.get(s)) else {
            debug!("Send to unknown client {}", client);
            return;
        };
        let route = match channel {
            Channel::Reliable => peer.reliable.clone().map(Route::Reliable),
            Channel::Unreliable => match (&peer.udp, peer.udp_remote) {
                (Some(socket), Some(remote)) => Some(Route::Unreliable(socket.clone(), remote)),
                _ => None,
            },
        };
        let Some(route) = route else {
            return;
        };

        if self.conditions.latency.is_zero() {
            route.deliver(payload);
        } else {
            let latency = self.conditions.latency;
            let payload = payload.to_vec();
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                route.deliver(&payload);
            });
        }
    }

    /// Closes a client's link. The `Closed` event follows from `next_event`.
    pub fn close(&mut self, client: ClientId) {
        if let Some(&session) = self.clients.get(&client) {
            let _ = self.events_tx.send(LinkEvent::LinkClosed {
                session,
                reason: "closed by server".to_string(),
            });
        }
    }

    /// Stops accepting and drops every peer without reporting them.
    pub fn stop(&mut self) {
        self.acceptor.abort();
        for (_, peer) in self.peers.drain() {
            for task in &peer.tasks {
                task.abort();
            }
        }
        self.clients.clear();
    }
}

impl Drop for PeerManager {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_reliable(
    session: SessionId,
    listener: TcpListener,
    secret: String,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let reason = match serve_reliable(session, listener, &secret, &events).await {
        Ok(()) => "reliable channel closed".to_string(),
        Err(e) => format!("reliable channel failed: {e}"),
    };
    let _ = events.send(LinkEvent::LinkClosed { session, reason });
}

async fn serve_reliable(
    session: SessionId,
    listener: TcpListener,
    secret: &str,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> Result<(), TransportError> {
    let (stream, addr) = listener.accept().await?;
    drop(listener);
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let presented = read_frame(&mut reader)
        .await?
        .ok_or_else(|| TransportError::Handshake(format!("{addr} closed before handshake")))?;
    if presented != secret.as_bytes() {
        return Err(TransportError::Handshake(format!("wrong secret from {addr}")));
    }
    write_frame(&mut writer, HANDSHAKE_ACK).await?;

    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = writer_rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                debug!("Reliable write to session {} failed: {}", session, e);
                break;
            }
        }
    });

    if events
        .send(LinkEvent::ReliableOpen {
            session,
            writer: writer_tx,
        })
        .is_err()
    {
        writer_task.abort();
        return Ok(());
    }

    let result = loop {
        match read_frame(&mut reader).await {
            Ok(Some(payload)) => {
                let event = LinkEvent::Data {
                    session,
                    channel: Channel::Reliable,
                    payload,
                };
                if events.send(event).is_err() {
                    break Ok(());
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e.into()),
        }
    };
    writer_task.abort();
    result
}

async fn run_unreliable(
    session: SessionId,
    socket: Arc<UdpSocket>,
    secret: String,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let mut buf = vec![0u8; 65_536];
    let mut remote: Option<SocketAddr> = None;

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                debug!("Unreliable receive on session {} failed: {}", session, e);
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        match Datagram::decode(&buf[..len]) {
            Ok(Datagram::Bind { secret: presented }) if presented == secret => {
                if remote.is_some_and(|r| r != from) {
                    debug!("Session {} ignoring bind from second address {}", session, from);
                    continue;
                }
                let _ = socket.send_to(&Datagram::BindAck.encode(), from).await;
                if remote.is_none() {
                    remote = Some(from);
                    if events
                        .send(LinkEvent::UnreliableOpen {
                            session,
                            remote: from,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }
            Ok(Datagram::Bind { .. }) => warn!("Session {} got a bind with a wrong secret", session),
            Ok(Datagram::Data(payload)) if remote == Some(from) => {
                let event = LinkEvent::Data {
                    session,
                    channel: Channel::Unreliable,
                    payload,
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Ok(_) => debug!("Session {} ignoring datagram from {}", session, from),
            Err(e) => debug!("Session {} dropped datagram: {}", session, e),
        }
    }
}
