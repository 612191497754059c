use std::time::Duration;

use clap::{Parser, ValueEnum};
use client::game::{self, ClientGame};
use client::network::{ClientConfig, NetClient};
use log::info;
use shared::player::InputState;

/// Input scripts for running the client without a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Script {
    /// No input at all.
    Idle,
    /// Walk back and forth, jumping now and then.
    Patrol,
    /// Patrol while firing to the right.
    Skirmish,
}

impl Script {
    fn input(self, game: &ClientGame, elapsed: Duration) -> InputState {
        let Some(local) = game.local_player() else {
            return InputState::default();
        };
        let secs = elapsed.as_secs_f32();
        let going_right = (secs / 2.0) as u32 % 2 == 0;

        match self {
            Script::Idle => InputState {
                aim_x: local.x + 1.0,
                aim_y: local.y,
                ..Default::default()
            },
            Script::Patrol | Script::Skirmish => InputState {
                left: !going_right,
                right: going_right,
                jump: secs % 3.0 < 0.2,
                fire: self == Script::Skirmish && secs % 0.5 < 0.25,
                aim_x: local.x + 200.0,
                aim_y: local.y,
                ..Default::default()
            },
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Signaling endpoint of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Input script to play
    #[arg(long, value_enum, default_value = "patrol")]
    script: Script,

    /// Seconds to stay connected (runs until the server closes when omitted)
    #[arg(short = 'd', long)]
    duration: Option<u64>,

    /// Seconds to wait for the peer link to open
    #[arg(long, default_value = "5")]
    connect_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ClientConfig {
        connect_timeout: Duration::from_secs(args.connect_timeout),
        ..Default::default()
    };

    info!("Starting headless client ({:?} script)", args.script);
    let mut net = NetClient::new(config)?;
    let mut game = ClientGame::new();
    net.connect(&args.server);

    let script = args.script;
    game::run(
        &mut net,
        &mut game,
        Duration::from_millis(16),
        args.duration.map(Duration::from_secs),
        |game, elapsed| script.input(game, elapsed),
    )
    .await;

    if let Some(local) = game.local_player() {
        info!(
            "Finished as player {} at ({:.0}, {:.0}) with {} health",
            local.id, local.x, local.y, local.health
        );
    }
    Ok(())
}
