//! # Game Client Library
//!
//! The client side of the game: it negotiates a peer link with the server,
//! predicts the local actor from local input, and smooths remote actors toward
//! the server's snapshots.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! The local actor runs the shared simulation every fixed tick using the input
//! sampled this frame. Its state is reported to the server each tick with a
//! `ClientSnapshot`. The server never corrects it.
//!
//! ### Remote Actor Smoothing
//! Snapshots only set a target for remote actors. Once per frame their
//! position, velocity and aim are blended toward that target, aim along the
//! shorter arc. Snapshots whose tick is not newer than the last accepted one
//! are discarded.
//!
//! ### Sub-Tick Interpolation
//! Drawing uses the fraction of the next tick already accumulated to place
//! actors and projectiles between their previous and current tick positions.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - `NetClient` with connect, send, disconnect and `next_event`
//! - connection state and the once-only disconnect report
//!
//! ### Peer and Signaling Modules (`peer`, `signaling`)
//! - WebSocket signaling: hello, answer, candidates
//! - TCP reliable channel and UDP unreliable channel with binding checks
//!
//! ### Game Module (`game`)
//! - message handling for joins, leaves, shots, hits and round changes
//! - fixed-tick prediction, smoothing and render views
//!
//! ### Input Module (`input`)
//! - raw key and pointer state mapped to `InputState`
//! - edge detection for reload and weapon selection

pub mod game;
pub mod input;
pub mod network;
mod peer;
mod signaling;
