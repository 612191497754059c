//! Integration tests across the shared simulation, the server session and the
//! client game.
//!
//! Nothing here opens a socket: messages travel as encoded bytes through the
//! codec, the way they would over a peer link.

use std::time::Duration;

use client::game::ClientGame;
use server::config::ServerConfig;
use server::game::{MessageSink, ServerGame};
use server::peer_manager::ClientId;
use shared::codec::{Channel, Codec};
use shared::constants::{GROUND_Y, PLAYER_RADIUS};
use shared::game::{GameEvent, GameState, SimMode};
use shared::player::{InputState, Player};
use shared::protocol::{Message, PlayerJoined, Shoot};
use shared::weapons::WeaponKind;

/// Sink that encodes everything, like the real server, and keeps the bytes
/// per recipient.
struct WireRecorder {
    codec: Codec<Message>,
    clients: Vec<ClientId>,
    inbox: Vec<(ClientId, Channel, Vec<u8>)>,
}

impl WireRecorder {
    fn new(clients: &[ClientId]) -> Self {
        Self {
            codec: Codec::new().unwrap(),
            clients: clients.to_vec(),
            inbox: Vec::new(),
        }
    }

    fn deliver(&mut self, client: ClientId, message: &Message) {
        let channel = self.codec.channel_for(message).unwrap();
        let bytes = self.codec.encode(message).unwrap();
        self.inbox.push((client, channel, bytes));
    }

    /// Decoded messages addressed to `client`, in send order.
    fn take(&mut self, client: ClientId) -> Vec<(Channel, Message)> {
        let codec = Codec::<Message>::new().unwrap();
        let (mine, rest): (Vec<_>, Vec<_>) = self.inbox.drain(..).partition(|(c, _, _)| *c == client);
        self.inbox = rest;
        mine.into_iter()
            .map(|(_, channel, bytes)| (channel, codec.decode(&bytes).unwrap()))
            .collect()
    }
}

impl MessageSink for WireRecorder {
    fn send(&mut self, client: ClientId, message: &Message) {
        self.deliver(client, message);
    }

    fn broadcast(&mut self, message: &Message, exclude: Option<ClientId>) {
        for client in self.clients.clone() {
            if Some(client) != exclude {
                self.deliver(client, message);
            }
        }
    }
}

fn server_game() -> ServerGame {
    let config = ServerConfig {
        seed: Some(42),
        ..Default::default()
    };
    ServerGame::new(&config).unwrap()
}

/// JOIN HANDSHAKE TESTS
mod join_tests {
    use super::*;

    #[test]
    fn ready_is_answered_with_welcome_and_announced_to_others() {
        let (a, b, c) = (ClientId(1), ClientId(2), ClientId(3));
        let mut sink = WireRecorder::new(&[a, b, c]);
        let mut game = server_game();

        game.handle_message(a, Message::Ready, &mut sink);

        let to_a = sink.take(a);
        match &to_a[..] {
            [(Channel::Reliable, Message::Welcome(welcome))] => {
                assert_eq!(welcome.player_id, 1);
                assert_eq!(welcome.map, "m1");
                assert_eq!(welcome.players.len(), 1);
                assert_eq!(welcome.players[0].id, 1);
            }
            other => panic!("unexpected messages for the sender: {other:?}"),
        }

        for other in [b, c] {
            let received = sink.take(other);
            assert!(
                matches!(
                    &received[..],
                    [(Channel::Reliable, Message::PlayerJoined(PlayerJoined { id: 1, .. }))]
                ),
                "client {other} got {received:?}"
            );
        }
    }

    #[test]
    fn welcome_builds_the_client_world() {
        let (a, b) = (ClientId(1), ClientId(2));
        let mut sink = WireRecorder::new(&[a, b]);
        let mut game = server_game();
        game.handle_message(a, Message::Ready, &mut sink);
        game.handle_message(b, Message::Ready, &mut sink);

        let mut client_b = ClientGame::with_seed(1);
        for (_, message) in sink.take(b) {
            client_b.handle_message(message);
        }

        assert_eq!(client_b.local_player().map(|p| p.id), Some(2));
        assert_eq!(client_b.state().players.len(), 2);
        assert_eq!(client_b.state().map.as_ref().map(|m| m.name()), Some("m1"));

        // The first joiner learns about the second through PlayerJoined.
        let mut client_a = ClientGame::with_seed(2);
        for (_, message) in sink.take(a) {
            client_a.handle_message(message);
        }
        assert_eq!(client_a.local_player().map(|p| p.id), Some(1));
        assert!(client_a.state().player(2).is_some());
    }
}

/// FIXED TICK SIMULATION TESTS
mod simulation_tests {
    use super::*;

    #[test]
    fn actor_settles_on_the_ground_line_within_a_second() {
        let mut sink = WireRecorder::new(&[]);
        let config = ServerConfig {
            seed: Some(1),
            ..Default::default()
        };
        let mut game = ServerGame::new(&config).unwrap();
        game.handle_message(ClientId(1), Message::Ready, &mut sink);

        let ticks: u32 = (0..100)
            .map(|_| game.advance(Duration::from_millis(10), &mut sink))
            .sum();
        assert_eq!(ticks, 64);

        let player = game.state().player(1).unwrap();
        assert!(player.on_ground, "player at ({}, {})", player.x, player.y);
        assert_eq!(player.vy, 0.0);
    }

    #[test]
    fn actor_without_a_map_lands_on_the_ground_line() {
        let mut state = GameState::with_seed(SimMode::Authoritative, 1);
        state.add_player(Player::new(1, 400.0, GROUND_Y - PLAYER_RADIUS - 50.0));
        for _ in 0..64 {
            state.step();
        }

        let player = state.player(1).unwrap();
        assert!(player.on_ground);
        assert_eq!(player.vy, 0.0);
        assert_eq!(player.y, GROUND_Y - PLAYER_RADIUS);
        assert_eq!(state.tick, 64);
    }

    #[test]
    fn repeated_hits_never_drop_health_below_zero() {
        let mut state = GameState::with_seed(SimMode::Authoritative, 1);
        state.add_player(Player::new(2, 140.0, 300.0));

        let shot = Shoot {
            owner_id: 1,
            weapon_type: WeaponKind::Sniper.id(),
            x: 100.0,
            y: 300.0,
            vel_x: 2560.0,
            vel_y: 0.0,
        };
        let mut healths = Vec::new();
        for _ in 0..3 {
            state.spawn_bullet(&Shoot {
                y: state.player(2).unwrap().y,
                ..shot
            });
            state.step();
            for event in state.drain_events() {
                if let GameEvent::Hit(hit) = event {
                    healths.push(hit.health);
                }
            }
        }

        assert_eq!(healths, vec![20, 0]);
        assert_eq!(state.player(2).unwrap().health, 0);
    }

    #[test]
    fn predicted_projectiles_never_deal_damage() {
        let mut state = GameState::with_seed(SimMode::Predicted, 1);
        state.add_player(Player::new(2, 140.0, 300.0));
        assert!(state.spawn_bullet(&Shoot {
            owner_id: 1,
            weapon_type: WeaponKind::Sniper.id(),
            x: 100.0,
            y: 300.0,
            vel_x: 2560.0,
            vel_y: 0.0,
        }));
        state.step();

        assert!(state.drain_events().is_empty());
        assert_eq!(state.player(2).unwrap().health, 100);
    }
}

/// SNAPSHOT FLOW TESTS
mod snapshot_tests {
    use super::*;

    #[test]
    fn every_tick_broadcasts_an_unreliable_snapshot() {
        let a = ClientId(1);
        let mut sink = WireRecorder::new(&[a]);
        let mut game = server_game();
        game.handle_message(a, Message::Ready, &mut sink);
        sink.take(a);

        for _ in 0..3 {
            game.tick(&mut sink);
        }
        let ticks: Vec<u32> = sink
            .take(a)
            .into_iter()
            .map(|(channel, message)| match message {
                Message::ServerSnapshot(snapshot) => {
                    assert_eq!(channel, Channel::Unreliable);
                    snapshot.tick
                }
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ticks, vec![1, 2, 3]);
    }

    #[test]
    fn reordered_snapshots_never_roll_the_client_back() {
        let (a, b) = (ClientId(1), ClientId(2));
        let mut sink = WireRecorder::new(&[a, b]);
        let mut server = server_game();
        server.handle_message(a, Message::Ready, &mut sink);
        server.handle_message(b, Message::Ready, &mut sink);

        let mut client = ClientGame::with_seed(1);
        for (_, message) in sink.take(a) {
            client.handle_message(message);
        }

        let mut snapshots = Vec::new();
        for _ in 0..4 {
            server.tick(&mut sink);
            snapshots.extend(sink.take(a).into_iter().map(|(_, m)| m));
        }
        sink.take(b);

        // Deliver newest first; the older ones must be ignored.
        snapshots.reverse();
        for message in snapshots {
            client.handle_message(message);
        }
        assert_eq!(client.last_server_tick(), Some(4));
    }

    #[test]
    fn client_reports_drive_the_server_actor() {
        let a = ClientId(1);
        let mut sink = WireRecorder::new(&[a]);
        let mut server = server_game();
        server.handle_message(a, Message::Ready, &mut sink);

        let mut client = ClientGame::with_seed(9);
        for (_, message) in sink.take(a) {
            client.handle_message(message);
        }

        let walk = InputState {
            right: true,
            aim_x: 5000.0,
            ..Default::default()
        };
        let frame = client.update(Duration::from_micros(15_625 * 4), &walk);
        let last_report = frame
            .outgoing
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::ClientSnapshot(s) => Some(*s),
                _ => None,
            })
            .unwrap();

        for message in frame.outgoing {
            server.handle_message(a, message, &mut sink);
        }
        server.tick(&mut sink);

        // One server tick of physics on top of the adopted report.
        let actor = server.state().player(1).unwrap();
        assert!((actor.x - last_report.x).abs() < 15.0);
        assert_eq!(actor.angle, last_report.angle);
    }

    #[test]
    fn shots_reach_other_clients_but_not_the_shooter() {
        let (a, b) = (ClientId(1), ClientId(2));
        let mut sink = WireRecorder::new(&[a, b]);
        let mut server = server_game();
        server.handle_message(a, Message::Ready, &mut sink);
        server.handle_message(b, Message::Ready, &mut sink);
        sink.take(a);
        sink.take(b);

        let shot = Shoot {
            owner_id: 1,
            weapon_type: WeaponKind::Smg.id(),
            x: 200.0,
            y: 200.0,
            vel_x: 900.0,
            vel_y: 0.0,
        };
        server.handle_message(a, Message::Shoot(shot), &mut sink);

        assert!(sink.take(a).is_empty());
        assert!(matches!(
            &sink.take(b)[..],
            [(Channel::Unreliable, Message::Shoot(Shoot { owner_id: 1, .. }))]
        ));
    }
}
