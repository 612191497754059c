//! Authoritative game session: joins, client-reported state, shots and the
//! fixed-rate snapshot broadcast.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use rand::Rng;
use shared::constants::{GROUND_Y, PLAYER_RADIUS, WORLD_WIDTH};
use shared::game::{GameEvent, GameState, SimMode};
use shared::map::MapError;
use shared::player::Player;
use shared::protocol::{
    ClientSnapshot, Message, PlayerJoined, PlayerLeft, RoundStart, ServerSnapshot, Shoot, Welcome,
};
use shared::timestep::FixedTimestep;

use crate::config::ServerConfig;
use crate::network::{NetServer, ServerEvent};
use crate::peer_manager::ClientId;

/// Outbound half of the server session, as seen by the game.
pub trait MessageSink {
    fn send(&mut self, client: ClientId, message: &Message);
    fn broadcast(&mut self, message: &Message, exclude: Option<ClientId>);
}

impl MessageSink for NetServer {
    fn send(&mut self, client: ClientId, message: &Message) {
        if let Err(e) = self.send_message(client, message) {
            error!("Failed to send to client {}: {}", client, e);
        }
    }

    fn broadcast(&mut self, message: &Message, exclude: Option<ClientId>) {
        if let Err(e) = self.broadcast_message(message, exclude) {
            error!("Failed to broadcast: {}", e);
        }
    }
}

pub struct ServerGame {
    state: GameState,
    map_name: String,
    players_by_client: HashMap<ClientId, u8>,
    pending_snapshots: HashMap<u8, ClientSnapshot>,
    last_report_tick: HashMap<u8, u32>,
    next_player_id: u8,
    timestep: FixedTimestep,
}

impl ServerGame {
    pub fn new(config: &ServerConfig) -> Result<Self, MapError> {
        let mut state = match config.seed {
            Some(seed) => GameState::with_seed(SimMode::Authoritative, seed),
            None => GameState::new(SimMode::Authoritative),
        };
        state.load_map(&config.map)?;

        Ok(Self {
            state,
            map_name: config.map.clone(),
            players_by_client: HashMap::new(),
            pending_snapshots: HashMap::new(),
            last_report_tick: HashMap::new(),
            next_player_id: 1,
            timestep: FixedTimestep::default(),
        })
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn player_id(&self, client: ClientId) -> Option<u8> {
        self.players_by_client.get(&client).copied()
    }

    pub fn handle_event<S: MessageSink>(&mut self, event: ServerEvent, sink: &mut S) {
        match event {
            ServerEvent::Connected(client) => {
                debug!("Client {} connected, waiting for ready", client);
            }
            ServerEvent::Message { client, message } => self.handle_message(client, message, sink),
            ServerEvent::Disconnected(client) => self.handle_disconnect(client, sink),
            ServerEvent::Error { client, error } => {
                debug!("Dropped message from client {}: {}", client, error);
            }
        }
    }

    pub fn handle_message<S: MessageSink>(&mut self, client: ClientId, message: Message, sink: &mut S) {
        match message {
            Message::Ready => self.handle_ready(client, sink),
            Message::ClientSnapshot(snapshot) => self.handle_client_snapshot(client, snapshot),
            Message::Shoot(shot) => self.handle_shoot(client, shot, sink),
            other => warn!("Unexpected {:?} from client {}", other, client),
        }
    }

    fn handle_ready<S: MessageSink>(&mut self, client: ClientId, sink: &mut S) {
        if let Some(id) = self.player_id(client) {
            warn!("Client {} is already player {}", client, id);
            return;
        }
        let id = self.next_player_id;
        let Some(next) = id.checked_add(1) else {
            error!("No player ids left for client {}", client);
            return;
        };
        self.next_player_id = next;

        let (x, y) = self.spawn_point();
        self.state.add_player(Player::new(id, x, y));
        self.players_by_client.insert(client, id);
        info!("Client {} joined as player {} at ({:.0}, {:.0})", client, id, x, y);

        let welcome = Welcome {
            player_id: id,
            map: self.map_name.clone(),
            players: self.state.snapshot_records(),
        };
        sink.send(client, &Message::Welcome(welcome));
        sink.broadcast(&Message::PlayerJoined(PlayerJoined { id, x, y }), Some(client));
    }

    fn spawn_point(&mut self) -> (f32, f32) {
        if let Some(spawn) = self.state.random_spawn(None) {
            return spawn;
        }
        let x = self
            .state
            .rng()
            .gen_range(PLAYER_RADIUS..WORLD_WIDTH - PLAYER_RADIUS);
        (x, GROUND_Y - PLAYER_RADIUS)
    }

    fn handle_client_snapshot(&mut self, client: ClientId, snapshot: ClientSnapshot) {
        let Some(id) = self.player_id(client) else {
            debug!("Snapshot from client {} before ready", client);
            return;
        };
        // Unreliable delivery can reorder; only newer reports replace older ones.
        if self
            .last_report_tick
            .get(&id)
            .is_some_and(|&last| snapshot.tick <= last)
        {
            return;
        }
        self.last_report_tick.insert(id, snapshot.tick);
        self.pending_snapshots.insert(id, snapshot);
    }

    fn handle_shoot<S: MessageSink>(&mut self, client: ClientId, mut shot: Shoot, sink: &mut S) {
        let Some(id) = self.player_id(client) else {
            debug!("Shot from client {} before ready", client);
            return;
        };
        if shot.owner_id != id {
            warn!(
                "Client {} fired as player {}, attributing to {}",
                client, shot.owner_id, id
            );
            shot.owner_id = id;
        }
        if self.state.spawn_bullet(&shot) {
            sink.broadcast(&Message::Shoot(shot), Some(client));
        }
    }

    fn handle_disconnect<S: MessageSink>(&mut self, client: ClientId, sink: &mut S) {
        let Some(id) = self.players_by_client.remove(&client) else {
            debug!("Client {} left before joining", client);
            return;
        };
        self.state.remove_player(id);
        self.pending_snapshots.remove(&id);
        self.last_report_tick.remove(&id);
        info!("Player {} (client {}) left", id, client);
        sink.broadcast(&Message::PlayerLeft(PlayerLeft { id }), None);
    }

    /// Switches every peer to `map` and reloads it here.
    pub fn start_round<S: MessageSink>(&mut self, map: &str, sink: &mut S) -> Result<(), MapError> {
        self.state.load_map(map)?;
        self.map_name = map.to_string();
        info!("Round started on {}", map);
        sink.broadcast(
            &Message::RoundStart(RoundStart {
                map: map.to_string(),
            }),
            None,
        );
        Ok(())
    }

    /// One fixed tick: adopt reported states, step, then broadcast results.
    pub fn tick<S: MessageSink>(&mut self, sink: &mut S) {
        for (id, snapshot) in self.pending_snapshots.drain() {
            if let Some(player) = self.state.players.get_mut(&id) {
                player.x = snapshot.x;
                player.y = snapshot.y;
                player.vx = snapshot.vx;
                player.vy = snapshot.vy;
                player.angle = snapshot.angle;
            }
        }

        self.state.step();

        for event in self.state.drain_events() {
            if let GameEvent::Hit(hit) = event {
                sink.broadcast(&Message::BulletHit(hit), None);
            }
        }

        let snapshot = ServerSnapshot {
            tick: self.state.tick,
            players: self.state.snapshot_records(),
        };
        sink.broadcast(&Message::ServerSnapshot(snapshot), None);
    }

    /// Feeds wall-clock time into the accumulator and runs the ticks it covers.
    pub fn advance<S: MessageSink>(&mut self, elapsed: Duration, sink: &mut S) -> u32 {
        self.timestep.accumulate(elapsed);
        let mut ticks = 0;
        while self.timestep.consume_tick() {
            self.tick(sink);
            ticks += 1;
        }
        ticks
    }
}

/// Serves events and ticks until the network side shuts down.
pub async fn run(net: &mut NetServer, game: &mut ServerGame, poll_interval: Duration) {
    let mut last_update = Instant::now();

    loop {
        tokio::select! {
            event = net.next_event() => match event {
                Some(event) => game.handle_event(event, net),
                None => break,
            },
            _ = tokio::time::sleep(poll_interval) => {}
        }

        let now = Instant::now();
        game.advance(now - last_update, net);
        last_update = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::constants::{FIXED_DT, TICK_DURATION};
    use shared::weapons::WeaponKind;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<(ClientId, Message)>,
        broadcast: Vec<(Message, Option<ClientId>)>,
    }

    impl MessageSink for Recorder {
        fn send(&mut self, client: ClientId, message: &Message) {
            self.sent.push((client, message.clone()));
        }

        fn broadcast(&mut self, message: &Message, exclude: Option<ClientId>) {
            self.broadcast.push((message.clone(), exclude));
        }
    }

    fn game() -> ServerGame {
        let config = ServerConfig {
            seed: Some(7),
            ..Default::default()
        };
        ServerGame::new(&config).unwrap()
    }

    #[test]
    fn test_ready_welcomes_and_announces() {
        let mut game = game();
        let mut sink = Recorder::default();
        game.handle_message(ClientId(4), Message::Ready, &mut sink);

        assert_eq!(game.player_id(ClientId(4)), Some(1));
        match &sink.sent[..] {
            [(ClientId(4), Message::Welcome(welcome))] => {
                assert_eq!(welcome.player_id, 1);
                assert_eq!(welcome.map, "m1");
                assert_eq!(welcome.players.len(), 1);
            }
            other => panic!("unexpected sends {other:?}"),
        }
        assert!(matches!(
            &sink.broadcast[..],
            [(Message::PlayerJoined(PlayerJoined { id: 1, .. }), Some(ClientId(4)))]
        ));
    }

    #[test]
    fn test_repeated_ready_is_ignored() {
        let mut game = game();
        let mut sink = Recorder::default();
        game.handle_message(ClientId(1), Message::Ready, &mut sink);
        game.handle_message(ClientId(1), Message::Ready, &mut sink);
        game.handle_message(ClientId(2), Message::Ready, &mut sink);

        assert_eq!(sink.sent.len(), 2);
        assert_eq!(game.player_id(ClientId(2)), Some(2));
        assert_eq!(game.state().players.len(), 2);
    }

    #[test]
    fn test_newest_client_snapshot_is_adopted_on_tick() {
        let mut game = game();
        let mut sink = Recorder::default();
        game.handle_message(ClientId(1), Message::Ready, &mut sink);

        let report = |tick, x| ClientSnapshot {
            tick,
            x,
            y: 100.0,
            vx: 0.0,
            vy: 0.0,
            angle: 1.0,
        };
        game.handle_message(ClientId(1), Message::ClientSnapshot(report(5, 400.0)), &mut sink);
        game.handle_message(ClientId(1), Message::ClientSnapshot(report(4, 900.0)), &mut sink);
        game.tick(&mut sink);

        let player = game.state().player(1).unwrap();
        assert!((player.x - 400.0).abs() < 1.0);
        assert_eq!(player.angle, 1.0);
    }

    #[test]
    fn test_tick_broadcasts_snapshot() {
        let mut game = game();
        let mut sink = Recorder::default();
        game.handle_message(ClientId(1), Message::Ready, &mut sink);
        sink.broadcast.clear();

        game.tick(&mut sink);
        match &sink.broadcast[..] {
            [(Message::ServerSnapshot(snapshot), None)] => {
                assert_eq!(snapshot.tick, 1);
                assert_eq!(snapshot.players[0].id, 1);
            }
            other => panic!("unexpected broadcasts {other:?}"),
        }
    }

    #[test]
    fn test_shot_is_relayed_with_sender_identity() {
        let mut game = game();
        let mut sink = Recorder::default();
        game.handle_message(ClientId(1), Message::Ready, &mut sink);
        sink.broadcast.clear();

        let shot = Shoot {
            owner_id: 9,
            weapon_type: WeaponKind::Pistol.id(),
            x: 100.0,
            y: 100.0,
            vel_x: 500.0,
            vel_y: 0.0,
        };
        game.handle_message(ClientId(1), Message::Shoot(shot), &mut sink);

        assert_eq!(game.state().bullets.len(), 1);
        assert!(matches!(
            &sink.broadcast[..],
            [(Message::Shoot(Shoot { owner_id: 1, .. }), Some(ClientId(1)))]
        ));
    }

    #[test]
    fn test_disconnect_broadcasts_leave() {
        let mut game = game();
        let mut sink = Recorder::default();
        game.handle_message(ClientId(1), Message::Ready, &mut sink);
        game.handle_event(ServerEvent::Disconnected(ClientId(1)), &mut sink);
        game.handle_event(ServerEvent::Disconnected(ClientId(1)), &mut sink);

        let leaves: Vec<_> = sink
            .broadcast
            .iter()
            .filter(|(m, _)| matches!(m, Message::PlayerLeft(PlayerLeft { id: 1 })))
            .collect();
        assert_eq!(leaves.len(), 1);
        assert!(game.state().players.is_empty());
    }

    #[test]
    fn test_round_start_switches_map() {
        let mut game = game();
        let mut sink = Recorder::default();
        game.start_round("m1", &mut sink).unwrap();
        assert!(matches!(&sink.broadcast[..], [(Message::RoundStart(_), None)]));
        assert!(game.start_round("nowhere", &mut sink).is_err());
        assert_eq!(game.map_name(), "m1");
    }

    #[test]
    fn test_advance_runs_whole_ticks() {
        let mut game = game();
        let mut sink = Recorder::default();
        let ticks: u32 = (0..100)
            .map(|_| game.advance(Duration::from_millis(10), &mut sink))
            .sum();
        assert_eq!(ticks, 64);
        assert_eq!(game.state().tick, 64);

        // A long stall only yields the catch-up cap.
        assert_eq!(game.advance(Duration::from_secs(2), &mut sink), 5);
    }

    #[test]
    fn test_tick_length_is_the_simulation_quantum() {
        assert_eq!(TICK_DURATION.as_secs_f32(), FIXED_DT);

        let mut game = game();
        let mut sink = Recorder::default();
        assert_eq!(game.advance(TICK_DURATION * 3, &mut sink), 3);
        assert_eq!(game.advance(TICK_DURATION - Duration::from_micros(1), &mut sink), 0);
        assert_eq!(game.advance(Duration::from_micros(1), &mut sink), 1);
    }
}
