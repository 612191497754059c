//! # Game Server Library
//!
//! The authoritative side of the game. It negotiates peer links with clients,
//! keeps the canonical set of actors, and broadcasts a snapshot every tick.
//!
//! ## Core Responsibilities
//!
//! ### Peer Negotiation
//! Clients open a WebSocket to the signaling endpoint and say `hello`. The
//! server answers with an offer and one candidate per channel, then waits for
//! the client to open both the reliable (TCP) and unreliable (UDP) channel.
//! Only when both are open does the client get a [`peer_manager::ClientId`].
//!
//! ### Authoritative Simulation
//! [`game::ServerGame`] runs the shared simulation in authoritative mode at
//! 64 Hz. Actors take the state their client last reported, projectiles are
//! stepped here, and only the server decides which projectile hits which actor.
//!
//! ### State Broadcasting
//! Every tick ends with a `ServerSnapshot` on the unreliable channel. Joins,
//! leaves, hits and round changes go out on the reliable channel.
//!
//! ## Architecture Design
//!
//! ### Single Consumer Event Loop
//! Socket tasks never touch session state. They post events into one queue and
//! the loop in [`game::run`] drains it between ticks, so all game and peer state
//! is mutated from a single task.
//!
//! ### Adverse Network Simulation
//! [`config::ListenConfig`] can add latency and random loss to every outbound
//! send. Loss is decided first, so a dropped send never schedules a timer.
//!
//! ## Module Organization
//!
//! - `config`: listen and game settings with defaults
//! - `signaling`: WebSocket endpoint relaying JSON signals
//! - `peer_manager`: per-session sockets, handshakes and client ids
//! - `network`: typed message send/broadcast over the peer links
//! - `game`: join handling, tick loop and broadcasts
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::game::{run, ServerGame};
//! use server::network::NetServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let mut game = ServerGame::new(&config)?;
//!     let mut net = NetServer::listen(&config.listen).await?;
//!
//!     // Handles joins, shots and client snapshots, ticking at 64 Hz.
//!     run(&mut net, &mut game, config.poll_interval).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod game;
pub mod network;
pub mod peer_manager;
mod signaling;
