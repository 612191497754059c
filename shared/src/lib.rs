//! # Shared Simulation and Protocol
//!
//! Everything both ends of the wire must agree on byte-for-byte and
//! tick-for-tick lives here.
//!
//! ## Wire format
//! [`codec`] turns the static [`protocol::PROTOCOL`] table into an encoder and
//! decoder for [`protocol::Message`]. Every message type declares its channel,
//! so callers never pick reliable or unreliable delivery themselves.
//!
//! ## Peer links
//! [`transport`] holds the JSON signaling messages, session descriptions,
//! candidates and the framing of the two data channels.
//!
//! ## Simulation
//! [`game::GameState`] steps actors and projectiles at a fixed 64 Hz using the
//! pure functions in [`collision`]. The same code runs in
//! [`game::SimMode::Authoritative`] on the server and
//! [`game::SimMode::Predicted`] on clients; the mode only decides whether local
//! input is applied and whether projectiles can hit actors.

pub mod bullet;
pub mod codec;
pub mod collision;
pub mod constants;
pub mod game;
pub mod map;
pub mod player;
pub mod protocol;
pub mod timestep;
pub mod transport;
pub mod weapons;

pub use codec::{Channel, Codec, DecodeError, EncodeError, SchemaError};
pub use game::{GameEvent, GameState, SimMode};
pub use player::{InputState, Player};
pub use protocol::{Message, PlayerRecord};
