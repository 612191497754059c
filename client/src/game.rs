//! Predicted client game.
//!
//! The local actor is simulated from local input only and is never corrected
//! by the server. Remote actors keep simulating between snapshots and are
//! pulled toward the last authoritative values once per frame.

use std::f32::consts::{PI, TAU};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use shared::constants::SMOOTH_FACTOR;
use shared::game::{GameEvent, GameState, SimMode};
use shared::player::{InputState, Player, Target};
use shared::protocol::{ClientSnapshot, Message, ServerSnapshot, Welcome};
use shared::timestep::FixedTimestep;
use shared::weapons::WeaponKind;

use crate::network::{ClientEvent, ConnectionState, NetClient};

/// Result of one presentation frame.
#[derive(Debug, Default)]
pub struct Frame {
    /// Fixed ticks run during this frame.
    pub ticks: u32,
    /// Sub-tick interpolation factor for drawing.
    pub alpha: f32,
    /// Messages the frame produced for the server.
    pub outgoing: Vec<Message>,
}

/// Where to draw one actor this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorView {
    pub id: u8,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub health: u8,
    pub is_local: bool,
}

/// Signed difference from `from` to `to` along the shorter arc.
pub fn shortest_angle_delta(from: f32, to: f32) -> f32 {
    let mut delta = (to - from) % TAU;
    if delta > PI {
        delta -= TAU;
    } else if delta < -PI {
        delta += TAU;
    }
    delta
}

pub struct ClientGame {
    state: GameState,
    timestep: FixedTimestep,
    last_server_tick: Option<u32>,
    local_tick: u32,
}

impl Default for ClientGame {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientGame {
    pub fn new() -> Self {
        Self::from_state(GameState::new(SimMode::Predicted))
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::from_state(GameState::with_seed(SimMode::Predicted, seed))
    }

    fn from_state(state: GameState) -> Self {
        Self {
            state,
            timestep: FixedTimestep::default(),
            last_server_tick: None,
            local_tick: 0,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.state.local_player()
    }

    pub fn last_server_tick(&self) -> Option<u32> {
        self.last_server_tick
    }

    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::Welcome(welcome) => self.handle_welcome(welcome),
            Message::ServerSnapshot(snapshot) => {
                self.apply_snapshot(&snapshot);
            }
            Message::PlayerJoined(joined) => {
                if self.state.player(joined.id).is_none() {
                    info!("Player {} joined", joined.id);
                    self.state.add_player(Player::new(joined.id, joined.x, joined.y));
                }
            }
            Message::PlayerLeft(left) => {
                info!("Player {} left", left.id);
                self.state.remove_player(left.id);
            }
            Message::RoundStart(round) => self.load_map(&round.map),
            Message::Shoot(shot) => {
                // Our own shots were spawned when they were fired.
                if Some(shot.owner_id) != self.state.local_player_id() {
                    self.state.spawn_bullet(&shot);
                }
            }
            Message::BulletHit(hit) => {
                if let Some(player) = self.state.player_mut(hit.target_id) {
                    player.health = hit.health;
                }
            }
            other => warn!("Unexpected {:?} from server", other),
        }
    }

    fn handle_welcome(&mut self, welcome: Welcome) {
        info!("Joined as player {} on {}", welcome.player_id, welcome.map);
        self.state.reset();
        self.last_server_tick = None;
        self.local_tick = 0;
        self.timestep.reset();

        self.load_map(&welcome.map);
        self.state.set_local_player(welcome.player_id);
        for record in &welcome.players {
            self.state.add_player(Player::from_record(record));
        }
    }

    fn load_map(&mut self, name: &str) {
        if let Err(e) = self.state.load_map(name) {
            warn!("Cannot load map {}: {}", name, e);
        }
    }

    /// Applies an authoritative snapshot to known remote actors. Returns
    /// `false` when the snapshot is not newer than the last one accepted.
    pub fn apply_snapshot(&mut self, snapshot: &ServerSnapshot) -> bool {
        if self.last_server_tick.is_some_and(|last| snapshot.tick <= last) {
            debug!("Discarding stale snapshot {}", snapshot.tick);
            return false;
        }
        self.last_server_tick = Some(snapshot.tick);

        for record in &snapshot.players {
            match self.state.player_mut(record.id) {
                Some(player) if player.is_local => {}
                Some(player) => {
                    player.target = Some(Target {
                        x: record.x,
                        y: record.y,
                        vx: record.vx,
                        vy: record.vy,
                        angle: record.angle,
                    });
                    player.health = record.health;
                    if let Some(kind) = WeaponKind::from_id(record.weapon_type) {
                        if player.weapon.kind != kind {
                            player.weapon.switch_to(kind);
                        }
                    }
                }
                // Actors only enter through Welcome and PlayerJoined.
                None => debug!("Snapshot entry for unknown player {}", record.id),
            }
        }
        true
    }

    /// Runs the ticks covered by `elapsed`, then smooths remote actors.
    pub fn update(&mut self, elapsed: Duration, input: &InputState) -> Frame {
        self.state.set_input(*input);
        self.timestep.accumulate(elapsed);

        let mut frame = Frame::default();
        while self.timestep.consume_tick() {
            self.state.step();
            self.local_tick = self.local_tick.wrapping_add(1);
            frame.ticks += 1;

            for event in self.state.drain_events() {
                if let GameEvent::Shot(shot) = event {
                    frame.outgoing.push(Message::Shoot(shot));
                }
            }
            if let Some(local) = self.state.local_player() {
                frame.outgoing.push(Message::ClientSnapshot(ClientSnapshot {
                    tick: self.local_tick,
                    x: local.x,
                    y: local.y,
                    vx: local.vx,
                    vy: local.vy,
                    angle: local.angle,
                }));
            }
        }

        frame.alpha = self.timestep.alpha();
        self.smooth();
        frame
    }

    /// Blends every remote actor toward its target.
    pub fn smooth(&mut self) {
        for player in self.state.players.values_mut() {
            let Some(target) = player.target.filter(|_| !player.is_local) else {
                continue;
            };
            player.x += (target.x - player.x) * SMOOTH_FACTOR;
            player.y += (target.y - player.y) * SMOOTH_FACTOR;
            player.vx += (target.vx - player.vx) * SMOOTH_FACTOR;
            player.vy += (target.vy - player.vy) * SMOOTH_FACTOR;
            player.angle += shortest_angle_delta(player.angle, target.angle) * SMOOTH_FACTOR;
        }
    }

    pub fn actor_views(&self, alpha: f32) -> Vec<ActorView> {
        self.state
            .players
            .values()
            .map(|player| {
                let (x, y) = player.render_position(alpha);
                ActorView {
                    id: player.id,
                    x,
                    y,
                    angle: player.prev_angle
                        + shortest_angle_delta(player.prev_angle, player.angle) * alpha,
                    health: player.health,
                    is_local: player.is_local,
                }
            })
            .collect()
    }

    pub fn bullet_positions(&self, alpha: f32) -> Vec<(f32, f32)> {
        self.state
            .bullets
            .iter()
            .map(|bullet| bullet.render_position(alpha))
            .collect()
    }
}

/// Drives one connection: joins on connect, then runs a frame every
/// `frame_interval` with input from `sample_input` until disconnected or
/// `duration` has passed.
pub async fn run<F>(
    net: &mut NetClient,
    game: &mut ClientGame,
    frame_interval: Duration,
    duration: Option<Duration>,
    mut sample_input: F,
) where
    F: FnMut(&ClientGame, Duration) -> InputState,
{
    let started = Instant::now();
    let mut last_frame = Instant::now();
    let mut frames = tokio::time::interval(frame_interval);
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = net.next_event() => match event {
                Some(ClientEvent::Connected) => {
                    if let Err(e) = net.send_message(&Message::Ready) {
                        warn!("Failed to send ready: {}", e);
                    }
                }
                Some(ClientEvent::Message(message)) => game.handle_message(message),
                Some(ClientEvent::Error(error)) => debug!("Dropped server message: {}", error),
                Some(ClientEvent::Disconnected(reason)) => {
                    info!("Session ended: {}", reason);
                    break;
                }
                None => break,
            },
            _ = frames.tick() => {
                let now = Instant::now();
                let input = sample_input(game, started.elapsed());
                let frame = game.update(now - last_frame, &input);
                last_frame = now;

                if net.connection_state() == ConnectionState::Connected {
                    for message in &frame.outgoing {
                        if let Err(e) = net.send_message(message) {
                            warn!("Failed to send {:?}: {}", message, e);
                        }
                    }
                }
            }
        }

        if duration.is_some_and(|limit| started.elapsed() >= limit) {
            net.disconnect();
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::constants::{GROUND_Y, PLAYER_RADIUS};
    use shared::protocol::{BulletHit, PlayerLeft, PlayerRecord, Shoot};

    fn record(id: u8, x: f32, angle: f32) -> PlayerRecord {
        PlayerRecord {
            id,
            x,
            y: GROUND_Y - PLAYER_RADIUS,
            vx: 0.0,
            vy: 0.0,
            angle,
            weapon_type: 0,
            health: 100,
        }
    }

    /// Joined as player 1 next to player 2, with no map loaded.
    fn joined() -> ClientGame {
        let mut game = ClientGame::with_seed(3);
        game.handle_message(Message::Welcome(Welcome {
            player_id: 1,
            map: "not-a-map".into(),
            players: vec![record(1, 100.0, 0.0), record(2, 300.0, 0.0)],
        }));
        game
    }

    #[test]
    fn test_welcome_sets_local_player() {
        let game = joined();
        assert_eq!(game.local_player().map(|p| p.id), Some(1));
        assert!(!game.state().player(2).unwrap().is_local);
        assert!(game.last_server_tick().is_none());
    }

    #[test]
    fn test_stale_snapshots_are_discarded() {
        let mut game = joined();
        let snap = |tick, x| ServerSnapshot {
            tick,
            players: vec![record(2, x, 0.0)],
        };
        assert!(game.apply_snapshot(&snap(10, 500.0)));
        assert!(!game.apply_snapshot(&snap(10, 600.0)));
        assert!(!game.apply_snapshot(&snap(9, 700.0)));
        assert_eq!(game.state().player(2).unwrap().target.unwrap().x, 500.0);
        assert_eq!(game.last_server_tick(), Some(10));
    }

    #[test]
    fn test_local_actor_is_never_corrected() {
        let mut game = joined();
        game.apply_snapshot(&ServerSnapshot {
            tick: 1,
            players: vec![record(1, 900.0, 2.0)],
        });
        let local = game.local_player().unwrap();
        assert_eq!(local.x, 100.0);
        assert!(local.target.is_none());
    }

    #[test]
    fn test_snapshot_ignores_unknown_players() {
        let mut game = joined();
        assert!(game.apply_snapshot(&ServerSnapshot {
            tick: 1,
            players: vec![record(2, 400.0, 0.0), record(9, 50.0, 0.0)],
        }));
        assert!(game.state().player(9).is_none());
        assert_eq!(game.state().players.len(), 2);
        assert!(game.state().player(2).unwrap().target.is_some());
    }

    #[test]
    fn test_smoothing_moves_toward_target() {
        let mut game = joined();
        game.apply_snapshot(&ServerSnapshot {
            tick: 1,
            players: vec![record(2, 400.0, 0.0)],
        });
        game.smooth();
        assert_approx_eq!(game.state().player(2).unwrap().x, 315.0, 1e-3);
    }

    #[test]
    fn test_angle_smoothing_takes_short_way() {
        assert_approx_eq!(shortest_angle_delta(3.0, -3.0), TAU - 6.0, 1e-5);
        assert_approx_eq!(shortest_angle_delta(-3.0, 3.0), 6.0 - TAU, 1e-5);
        assert_approx_eq!(shortest_angle_delta(0.5, 1.0), 0.5, 1e-6);

        let mut game = joined();
        game.state.player_mut(2).unwrap().angle = 3.0;
        game.apply_snapshot(&ServerSnapshot {
            tick: 1,
            players: vec![record(2, 300.0, -3.0)],
        });
        game.smooth();
        // Moved past PI instead of back through zero.
        assert!(game.state().player(2).unwrap().angle > 3.0);
    }

    #[test]
    fn test_update_reports_local_state_every_tick() {
        let mut game = joined();
        let frame = game.update(Duration::from_micros(15_625 * 3), &InputState::default());
        assert_eq!(frame.ticks, 3);

        let ticks: Vec<u32> = frame
            .outgoing
            .iter()
            .filter_map(|m| match m {
                Message::ClientSnapshot(s) => Some(s.tick),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![1, 2, 3]);
    }

    #[test]
    fn test_local_fire_is_sent_and_echo_ignored() {
        let mut game = joined();
        let input = InputState {
            fire: true,
            aim_x: 1000.0,
            aim_y: GROUND_Y - PLAYER_RADIUS,
            ..Default::default()
        };
        let frame = game.update(Duration::from_micros(15_625), &input);
        let shot = frame
            .outgoing
            .iter()
            .find_map(|m| match m {
                Message::Shoot(shot) => Some(*shot),
                _ => None,
            })
            .unwrap();
        assert_eq!(shot.owner_id, 1);
        let bullets = game.state().bullets.len();

        game.handle_message(Message::Shoot(shot));
        assert_eq!(game.state().bullets.len(), bullets);

        game.handle_message(Message::Shoot(Shoot { owner_id: 2, ..shot }));
        assert_eq!(game.state().bullets.len(), bullets + 1);
    }

    #[test]
    fn test_seeded_clients_fire_identical_spreads() {
        let shotgun = InputState {
            fire: true,
            aim_x: 1000.0,
            aim_y: GROUND_Y - PLAYER_RADIUS,
            weapon_select: Some(WeaponKind::Shotgun),
            ..Default::default()
        };
        let fire = |game: &mut ClientGame| -> Vec<(f32, f32)> {
            game.update(Duration::from_micros(15_625), &shotgun)
                .outgoing
                .into_iter()
                .filter_map(|m| match m {
                    Message::Shoot(shot) => Some((shot.vel_x, shot.vel_y)),
                    _ => None,
                })
                .collect()
        };

        let mut first = joined();
        let mut second = joined();
        let volley = fire(&mut first);
        assert_eq!(volley.len(), WeaponKind::Shotgun.spec().pellets as usize);
        assert_eq!(volley, fire(&mut second));
    }

    #[test]
    fn test_hits_and_leaves() {
        let mut game = joined();
        game.handle_message(Message::BulletHit(BulletHit {
            target_id: 1,
            attacker_id: 2,
            damage: 30,
            health: 70,
            x: 0.0,
            y: 0.0,
        }));
        assert_eq!(game.local_player().unwrap().health, 70);

        game.handle_message(Message::PlayerLeft(PlayerLeft { id: 2 }));
        assert!(game.state().player(2).is_none());
    }

    #[test]
    fn test_actor_views_interpolate() {
        let mut game = joined();
        {
            let player = game.state.player_mut(2).unwrap();
            player.prev_x = 200.0;
            player.x = 300.0;
            player.prev_y = player.y;
        }
        let view = game
            .actor_views(0.25)
            .into_iter()
            .find(|v| v.id == 2)
            .unwrap();
        assert_approx_eq!(view.x, 225.0, 1e-4);
        assert!(!view.is_local);
    }
}
