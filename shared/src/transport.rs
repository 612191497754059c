//! Signaling messages and link framing used by both ends of a peer connection.
//!
//! The signaling socket carries JSON [`SignalMessage`]s. Once the offer and the
//! candidates are exchanged the peer link consists of two channels:
//!
//! - `reliable`: a TCP stream of u16 little-endian length-prefixed frames. The
//!   first client frame is the session secret, answered by [`HANDSHAKE_ACK`].
//! - `unreliable`: UDP datagrams tagged with a [`Datagram`] kind byte. The
//!   client repeats a binding request until the server acknowledges it.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::Channel;

pub const HANDSHAKE_ACK: &[u8] = b"ok";
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;
const SECRET_LEN: usize = 24;
const CANDIDATE_PRIORITY: u32 = 2_130_706_431;

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("invalid signaling json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid session description: {0}")]
    InvalidDescription(String),
    #[error("invalid candidate: {0}")]
    InvalidCandidate(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error("handshake rejected: {0}")]
    Handshake(String),
    #[error("malformed datagram")]
    MalformedDatagram,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("signaling closed before the link was established")]
    SignalingClosed,
}

/// Side-channel messages exchanged while a peer link is negotiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    Hello,
    Offer { sdp: String },
    Answer { sdp: String },
    IceCandidate { candidate: IceCandidate },
}

impl SignalMessage {
    pub fn to_json(&self) -> Result<String, SignalingError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SignalingError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkProtocol {
    Tcp,
    Udp,
}

impl LinkProtocol {
    pub fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::Reliable => LinkProtocol::Tcp,
            Channel::Unreliable => LinkProtocol::Udp,
        }
    }
}

impl fmt::Display for LinkProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkProtocol::Tcp => write!(f, "tcp"),
            LinkProtocol::Udp => write!(f, "udp"),
        }
    }
}

/// One connectivity candidate, tagged with the channel label it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
}

/// A parsed [`IceCandidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateAddr {
    pub channel: Channel,
    pub protocol: LinkProtocol,
    pub addr: SocketAddr,
}

impl IceCandidate {
    /// Host candidate for `channel` at `addr`.
    pub fn host(channel: Channel, addr: SocketAddr) -> Self {
        let foundation = match channel {
            Channel::Reliable => 1,
            Channel::Unreliable => 2,
        };
        Self {
            candidate: format!(
                "candidate:{} 1 {} {} {} {} typ host",
                foundation,
                LinkProtocol::for_channel(channel),
                CANDIDATE_PRIORITY,
                addr.ip(),
                addr.port()
            ),
            sdp_mid: Some(channel.label().to_string()),
        }
    }

    pub fn parse(&self) -> Result<CandidateAddr, SignalingError> {
        let invalid = |reason: &str| {
            SignalingError::InvalidCandidate(format!("{reason} in {:?}", self.candidate))
        };

        let channel = self
            .sdp_mid
            .as_deref()
            .and_then(Channel::from_label)
            .ok_or_else(|| invalid("unknown channel label"))?;

        let parts: Vec<&str> = self.candidate.split_whitespace().collect();
        if parts.len() < 8 || !parts[0].starts_with("candidate:") || parts[6] != "typ" {
            return Err(invalid("unexpected layout"));
        }

        let protocol = match parts[2].to_ascii_lowercase().as_str() {
            "tcp" => LinkProtocol::Tcp,
            "udp" => LinkProtocol::Udp,
            _ => return Err(invalid("unknown transport")),
        };
        if protocol != LinkProtocol::for_channel(channel) {
            return Err(invalid("transport does not match channel"));
        }

        let ip: IpAddr = parts[4].parse().map_err(|_| invalid("bad address"))?;
        let port: u16 = parts[5].parse().map_err(|_| invalid("bad port"))?;

        Ok(CandidateAddr {
            channel,
            protocol,
            addr: SocketAddr::new(ip, port),
        })
    }
}

/// Offer or answer body: session id, shared secret and channel labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub session_id: u64,
    pub secret: String,
    pub channels: Vec<Channel>,
}

impl SessionDescription {
    pub fn new(session_id: u64, secret: String) -> Self {
        Self {
            session_id,
            secret,
            channels: vec![Channel::Reliable, Channel::Unreliable],
        }
    }

    pub fn to_sdp(&self) -> String {
        let mut sdp = format!(
            "v=0\r\no=- {} 1 IN IP4 0.0.0.0\r\ns=-\r\na=secret:{}\r\n",
            self.session_id, self.secret
        );
        for channel in &self.channels {
            sdp.push_str("a=mid:");
            sdp.push_str(channel.label());
            sdp.push_str("\r\n");
        }
        sdp
    }

    pub fn parse(sdp: &str) -> Result<Self, SignalingError> {
        let mut session_id = None;
        let mut secret = None;
        let mut channels = Vec::new();

        for line in sdp.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(origin) = line.strip_prefix("o=") {
                let id = origin
                    .split_whitespace()
                    .nth(1)
                    .and_then(|id| id.parse::<u64>().ok())
                    .ok_or_else(|| SignalingError::InvalidDescription(line.to_string()))?;
                session_id = Some(id);
            } else if let Some(value) = line.strip_prefix("a=secret:") {
                secret = Some(value.to_string());
            } else if let Some(label) = line.strip_prefix("a=mid:") {
                let channel = Channel::from_label(label).ok_or_else(|| {
                    SignalingError::InvalidDescription(format!("unknown channel {label}"))
                })?;
                channels.push(channel);
            }
        }

        let session_id = session_id
            .ok_or_else(|| SignalingError::InvalidDescription("missing origin".into()))?;
        let secret =
            secret.ok_or_else(|| SignalingError::InvalidDescription("missing secret".into()))?;
        if !channels.contains(&Channel::Reliable) || !channels.contains(&Channel::Unreliable) {
            return Err(SignalingError::InvalidDescription(
                "both channels must be offered".into(),
            ));
        }

        Ok(Self {
            session_id,
            secret,
            channels,
        })
    }
}

pub fn generate_secret<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SECRET_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds {}", payload.len(), MAX_FRAME_LEN),
        ));
    }
    let mut buf = Vec::with_capacity(payload.len() + 2);
    buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Reads one frame. `None` means the stream ended cleanly between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let len = match reader.read_u16_le().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut payload = vec![0; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

const DATAGRAM_BIND: u8 = 0;
const DATAGRAM_BIND_ACK: u8 = 1;
const DATAGRAM_DATA: u8 = 2;

/// Unreliable-channel datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    /// Connectivity check carrying the session secret.
    Bind { secret: String },
    BindAck,
    Data(Vec<u8>),
}

impl Datagram {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Datagram::Bind { secret } => {
                let mut out = Vec::with_capacity(secret.len() + 1);
                out.push(DATAGRAM_BIND);
                out.extend_from_slice(secret.as_bytes());
                out
            }
            Datagram::BindAck => vec![DATAGRAM_BIND_ACK],
            Datagram::Data(payload) => Self::data(payload),
        }
    }

    /// Encodes a data datagram without taking ownership of the payload.
    pub fn data(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 1);
        out.push(DATAGRAM_DATA);
        out.extend_from_slice(payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        let (&kind, rest) = bytes.split_first().ok_or(TransportError::MalformedDatagram)?;
        match kind {
            DATAGRAM_BIND => std::str::from_utf8(rest)
                .map(|secret| Datagram::Bind {
                    secret: secret.to_string(),
                })
                .map_err(|_| TransportError::MalformedDatagram),
            DATAGRAM_BIND_ACK if rest.is_empty() => Ok(Datagram::BindAck),
            DATAGRAM_DATA => Ok(Datagram::Data(rest.to_vec())),
            _ => Err(TransportError::MalformedDatagram),
        }
    }
}
