//! Network tests over real loopback sockets.
//!
//! A server session runs in a background task while one or more `NetClient`s
//! negotiate peer links with it through WebSocket signaling.

use std::time::{Duration, Instant};

use client::network::{ClientConfig, ClientEvent, ConnectionState, NetClient};
use server::config::{ListenConfig, ServerConfig};
use server::game::{self, ServerGame};
use server::network::NetServer;
use shared::protocol::{Message, PlayerJoined, PlayerLeft};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    url: String,
    task: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn start_server(listen: ListenConfig) -> TestServer {
    let config = ServerConfig {
        listen: ListenConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            ..listen
        },
        seed: Some(7),
        ..Default::default()
    };
    let mut net = NetServer::listen(&config.listen).await.unwrap();
    let url = format!("ws://{}", net.local_addr());
    let mut game = ServerGame::new(&config).unwrap();

    let task = tokio::spawn(async move {
        game::run(&mut net, &mut game, Duration::from_millis(1)).await;
    });
    TestServer { url, task }
}

async fn connect(url: &str) -> NetClient {
    let mut client = NetClient::new(ClientConfig::default()).unwrap();
    client.connect(url);
    match timeout(WAIT, client.next_event()).await.unwrap() {
        Some(ClientEvent::Connected) => {}
        other => panic!("expected Connected, got {other:?}"),
    }
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    client
}

/// Skips events until a message matches `wanted`.
async fn wait_for<F>(client: &mut NetClient, mut wanted: F) -> Message
where
    F: FnMut(&Message) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let event = tokio::time::timeout_at(deadline, client.next_event())
            .await
            .expect("timed out waiting for a message");
        match event {
            Some(ClientEvent::Message(message)) if wanted(&message) => return message,
            Some(ClientEvent::Message(_)) => continue,
            other => panic!("unexpected event {other:?}"),
        }
    }
}

async fn join(client: &mut NetClient) -> u8 {
    client.send_message(&Message::Ready).unwrap();
    match wait_for(client, |m| matches!(m, Message::Welcome(_))).await {
        Message::Welcome(welcome) => {
            assert_eq!(welcome.map, "m1");
            welcome.player_id
        }
        _ => unreachable!(),
    }
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    /// Ready over the reliable channel is answered with Welcome, then
    /// snapshots start arriving over the unreliable one.
    #[tokio::test]
    async fn test_join_and_receive_snapshots() {
        let server = start_server(ListenConfig::default()).await;
        let mut client = connect(&server.url).await;

        assert_eq!(join(&mut client).await, 1);

        let snapshot = wait_for(&mut client, |m| matches!(m, Message::ServerSnapshot(_))).await;
        match snapshot {
            Message::ServerSnapshot(snapshot) => {
                assert!(snapshot.tick > 0);
                assert!(snapshot.players.iter().any(|p| p.id == 1));
            }
            _ => unreachable!(),
        }
    }

    /// Other clients learn about joins and leaves; the joiner is not told
    /// about itself.
    #[tokio::test]
    async fn test_join_and_leave_are_announced() {
        let server = start_server(ListenConfig::default()).await;
        let mut first = connect(&server.url).await;
        assert_eq!(join(&mut first).await, 1);

        let mut second = connect(&server.url).await;
        assert_eq!(join(&mut second).await, 2);

        let joined = wait_for(&mut first, |m| matches!(m, Message::PlayerJoined(_))).await;
        assert!(matches!(joined, Message::PlayerJoined(PlayerJoined { id: 2, .. })));

        second.disconnect();
        match timeout(WAIT, second.next_event()).await.unwrap() {
            Some(ClientEvent::Disconnected(_)) => {}
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(second.next_event().await.is_none());
        drop(second);

        let left = wait_for(&mut first, |m| matches!(m, Message::PlayerLeft(_))).await;
        assert_eq!(left, Message::PlayerLeft(PlayerLeft { id: 2 }));
    }

    /// Stopping the server is reported to the client exactly once.
    #[tokio::test]
    async fn test_server_shutdown_disconnects_client() {
        let server = start_server(ListenConfig::default()).await;
        let mut client = connect(&server.url).await;
        drop(server);

        let deadline = tokio::time::Instant::now() + WAIT;
        let mut disconnects = 0;
        while let Some(event) = tokio::time::timeout_at(deadline, client.next_event())
            .await
            .expect("timed out waiting for the disconnect")
        {
            if let ClientEvent::Disconnected(_) = event {
                disconnects += 1;
            }
        }
        assert_eq!(disconnects, 1);
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }
}

/// SIMULATED NETWORK CONDITION TESTS
mod condition_tests {
    use super::*;

    #[tokio::test]
    async fn test_latency_delays_server_messages() {
        let server = start_server(ListenConfig {
            simulate_latency: Duration::from_millis(150),
            ..Default::default()
        })
        .await;
        let mut client = connect(&server.url).await;

        let started = Instant::now();
        join(&mut client).await;
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    /// Loss applies to application messages only, so the link still opens.
    #[tokio::test]
    async fn test_full_loss_still_connects_but_drops_messages() {
        let server = start_server(ListenConfig {
            simulate_packet_loss: 100.0,
            ..Default::default()
        })
        .await;
        let mut client = connect(&server.url).await;
        client.send_message(&Message::Ready).unwrap();

        let quiet = timeout(Duration::from_millis(300), client.next_event()).await;
        assert!(quiet.is_err(), "expected no server messages, got {quiet:?}");
    }
}
