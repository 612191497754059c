//! The game's message set.
//!
//! Ids and field order are the wire contract; both sides must agree on them.

use crate::codec::{
    Channel, DecodeError, Field, FieldReader, FieldType, FieldValue, MessageDescriptor, Value,
    WireMessage,
};

static PLAYER_RECORD: FieldType = FieldType::Struct(&[
    Field { name: "id", ty: FieldType::U8 },
    Field { name: "x", ty: FieldType::F32 },
    Field { name: "y", ty: FieldType::F32 },
    Field { name: "vx", ty: FieldType::F32 },
    Field { name: "vy", ty: FieldType::F32 },
    Field { name: "angle", ty: FieldType::F32 },
    Field { name: "weaponType", ty: FieldType::U8 },
    Field { name: "health", ty: FieldType::U8 },
]);

pub static PROTOCOL: &[MessageDescriptor] = &[
    MessageDescriptor {
        name: "ServerSnapshot",
        id: Message::SERVER_SNAPSHOT,
        channel: Channel::Unreliable,
        fields: &[
            Field { name: "tick", ty: FieldType::U32 },
            Field { name: "players", ty: FieldType::Array(&PLAYER_RECORD) },
        ],
    },
    MessageDescriptor {
        name: "ClientSnapshot",
        id: Message::CLIENT_SNAPSHOT,
        channel: Channel::Unreliable,
        fields: &[
            Field { name: "tick", ty: FieldType::U32 },
            Field { name: "x", ty: FieldType::F32 },
            Field { name: "y", ty: FieldType::F32 },
            Field { name: "vx", ty: FieldType::F32 },
            Field { name: "vy", ty: FieldType::F32 },
            Field { name: "angle", ty: FieldType::F32 },
        ],
    },
    MessageDescriptor {
        name: "Ready",
        id: Message::READY,
        channel: Channel::Reliable,
        fields: &[],
    },
    MessageDescriptor {
        name: "Welcome",
        id: Message::WELCOME,
        channel: Channel::Reliable,
        fields: &[
            Field { name: "playerId", ty: FieldType::U8 },
            Field { name: "map", ty: FieldType::String },
            Field { name: "players", ty: FieldType::Array(&PLAYER_RECORD) },
        ],
    },
    MessageDescriptor {
        name: "PlayerJoined",
        id: Message::PLAYER_JOINED,
        channel: Channel::Reliable,
        fields: &[
            Field { name: "id", ty: FieldType::U8 },
            Field { name: "x", ty: FieldType::F32 },
            Field { name: "y", ty: FieldType::F32 },
        ],
    },
    MessageDescriptor {
        name: "PlayerLeft",
        id: Message::PLAYER_LEFT,
        channel: Channel::Reliable,
        fields: &[Field { name: "id", ty: FieldType::U8 }],
    },
    MessageDescriptor {
        name: "RoundStart",
        id: Message::ROUND_START,
        channel: Channel::Reliable,
        fields: &[Field { name: "map", ty: FieldType::String }],
    },
    MessageDescriptor {
        name: "Shoot",
        id: Message::SHOOT,
        channel: Channel::Unreliable,
        fields: &[
            Field { name: "ownerId", ty: FieldType::U8 },
            Field { name: "weaponType", ty: FieldType::U8 },
            Field { name: "x", ty: FieldType::F32 },
            Field { name: "y", ty: FieldType::F32 },
            Field { name: "velX", ty: FieldType::F32 },
            Field { name: "velY", ty: FieldType::F32 },
        ],
    },
    MessageDescriptor {
        name: "BulletHit",
        id: Message::BULLET_HIT,
        channel: Channel::Reliable,
        fields: &[
            Field { name: "targetId", ty: FieldType::U8 },
            Field { name: "attackerId", ty: FieldType::U8 },
            Field { name: "damage", ty: FieldType::U8 },
            Field { name: "health", ty: FieldType::U8 },
            Field { name: "x", ty: FieldType::F32 },
            Field { name: "y", ty: FieldType::F32 },
        ],
    },
];

/// Per-player state carried by `ServerSnapshot` and `Welcome`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerRecord {
    pub id: u8,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub angle: f32,
    pub weapon_type: u8,
    pub health: u8,
}

impl FieldValue for PlayerRecord {
    fn to_value(&self) -> Value {
        Value::Struct(vec![
            self.id.to_value(),
            self.x.to_value(),
            self.y.to_value(),
            self.vx.to_value(),
            self.vy.to_value(),
            self.angle.to_value(),
            self.weapon_type.to_value(),
            self.health.to_value(),
        ])
    }

    fn from_value(value: Value) -> Option<Self> {
        let Value::Struct(values) = value else {
            return None;
        };
        let mut r = FieldReader::new("PlayerRecord", values);
        Some(PlayerRecord {
            id: r.next("id").ok()?,
            x: r.next("x").ok()?,
            y: r.next("y").ok()?,
            vx: r.next("vx").ok()?,
            vy: r.next("vy").ok()?,
            angle: r.next("angle").ok()?,
            weapon_type: r.next("weaponType").ok()?,
            health: r.next("health").ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSnapshot {
    pub tick: u32,
    pub players: Vec<PlayerRecord>,
}

/// The client's own authoritative claim about its actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientSnapshot {
    pub tick: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub angle: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Welcome {
    pub player_id: u8,
    pub map: String,
    pub players: Vec<PlayerRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerJoined {
    pub id: u8,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerLeft {
    pub id: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundStart {
    pub map: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shoot {
    pub owner_id: u8,
    pub weapon_type: u8,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletHit {
    pub target_id: u8,
    pub attacker_id: u8,
    pub damage: u8,
    pub health: u8,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ServerSnapshot(ServerSnapshot),
    ClientSnapshot(ClientSnapshot),
    Ready,
    Welcome(Welcome),
    PlayerJoined(PlayerJoined),
    PlayerLeft(PlayerLeft),
    RoundStart(RoundStart),
    Shoot(Shoot),
    BulletHit(BulletHit),
}

impl Message {
    pub const SERVER_SNAPSHOT: u8 = 0;
    pub const CLIENT_SNAPSHOT: u8 = 1;
    pub const READY: u8 = 2;
    pub const WELCOME: u8 = 3;
    pub const PLAYER_JOINED: u8 = 4;
    pub const PLAYER_LEFT: u8 = 5;
    pub const ROUND_START: u8 = 6;
    pub const SHOOT: u8 = 7;
    pub const BULLET_HIT: u8 = 8;
}

impl WireMessage for Message {
    fn schema() -> &'static [MessageDescriptor] {
        PROTOCOL
    }

    fn id(&self) -> u8 {
        match self {
            Message::ServerSnapshot(_) => Message::SERVER_SNAPSHOT,
            Message::ClientSnapshot(_) => Message::CLIENT_SNAPSHOT,
            Message::Ready => Message::READY,
            Message::Welcome(_) => Message::WELCOME,
            Message::PlayerJoined(_) => Message::PLAYER_JOINED,
            Message::PlayerLeft(_) => Message::PLAYER_LEFT,
            Message::RoundStart(_) => Message::ROUND_START,
            Message::Shoot(_) => Message::SHOOT,
            Message::BulletHit(_) => Message::BULLET_HIT,
        }
    }

    fn to_values(&self) -> Vec<Value> {
        match self {
            Message::ServerSnapshot(m) => vec![m.tick.to_value(), m.players.to_value()],
            Message::ClientSnapshot(m) => vec![
                m.tick.to_value(),
                m.x.to_value(),
                m.y.to_value(),
                m.vx.to_value(),
                m.vy.to_value(),
                m.angle.to_value(),
            ],
            Message::Ready => Vec::new(),
            Message::Welcome(m) => vec![
                m.player_id.to_value(),
                m.map.to_value(),
                m.players.to_value(),
            ],
            Message::PlayerJoined(m) => vec![m.id.to_value(), m.x.to_value(), m.y.to_value()],
            Message::PlayerLeft(m) => vec![m.id.to_value()],
            Message::RoundStart(m) => vec![m.map.to_value()],
            Message::Shoot(m) => vec![
                m.owner_id.to_value(),
                m.weapon_type.to_value(),
                m.x.to_value(),
                m.y.to_value(),
                m.vel_x.to_value(),
                m.vel_y.to_value(),
            ],
            Message::BulletHit(m) => vec![
                m.target_id.to_value(),
                m.attacker_id.to_value(),
                m.damage.to_value(),
                m.health.to_value(),
                m.x.to_value(),
                m.y.to_value(),
            ],
        }
    }

    fn from_values(
        descriptor: &'static MessageDescriptor,
        values: Vec<Value>,
    ) -> Result<Self, DecodeError> {
        let mut r = FieldReader::new(descriptor.name, values);
        let message = match descriptor.id {
            Message::SERVER_SNAPSHOT => Message::ServerSnapshot(ServerSnapshot {
                tick: r.next("tick")?,
                players: r.next("players")?,
            }),
            Message::CLIENT_SNAPSHOT => Message::ClientSnapshot(ClientSnapshot {
                tick: r.next("tick")?,
                x: r.next("x")?,
                y: r.next("y")?,
                vx: r.next("vx")?,
                vy: r.next("vy")?,
                angle: r.next("angle")?,
            }),
            Message::READY => Message::Ready,
            Message::WELCOME => Message::Welcome(Welcome {
                player_id: r.next("playerId")?,
                map: r.next("map")?,
                players: r.next("players")?,
            }),
            Message::PLAYER_JOINED => Message::PlayerJoined(PlayerJoined {
                id: r.next("id")?,
                x: r.next("x")?,
                y: r.next("y")?,
            }),
            Message::PLAYER_LEFT => Message::PlayerLeft(PlayerLeft { id: r.next("id")? }),
            Message::ROUND_START => Message::RoundStart(RoundStart { map: r.next("map")? }),
            Message::SHOOT => Message::Shoot(Shoot {
                owner_id: r.next("ownerId")?,
                weapon_type: r.next("weaponType")?,
                x: r.next("x")?,
                y: r.next("y")?,
                vel_x: r.next("velX")?,
                vel_y: r.next("velY")?,
            }),
            Message::BULLET_HIT => Message::BulletHit(BulletHit {
                target_id: r.next("targetId")?,
                attacker_id: r.next("attackerId")?,
                damage: r.next("damage")?,
                health: r.next("health")?,
                x: r.next("x")?,
                y: r.next("y")?,
            }),
            other => return Err(DecodeError::UnknownMessageId(other)),
        };
        Ok(message)
    }
}
