use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use log::info;
use server::config::{ListenConfig, ServerConfig};
use server::game::{self, ServerGame};
use server::network::NetServer;
use shared::constants::DEFAULT_MAP;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: IpAddr,
    /// Signaling port
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Address advertised to peers, when different from the bind address
    #[clap(long)]
    public_ip: Option<IpAddr>,
    /// Map to load
    #[clap(short, long, default_value = DEFAULT_MAP)]
    map: String,
    /// Artificial latency added to every outbound send, in milliseconds
    #[clap(long, default_value = "0")]
    latency: u64,
    /// Percentage of outbound sends to drop (0-100)
    #[clap(long, default_value = "0")]
    packet_loss: f32,
    /// Seed for spawn, spread and simulated loss randomness
    #[clap(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen: ListenConfig {
                addr: SocketAddr::new(self.host, self.port),
                public_ip: self.public_ip,
                simulate_latency: Duration::from_millis(self.latency),
                simulate_packet_loss: self.packet_loss,
                loss_seed: self.seed,
            },
            map: self.map,
            seed: self.seed,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    let mut game = ServerGame::new(&config)?;
    let mut net = NetServer::listen(&config.listen).await?;
    info!("Serving map {} at {} Hz", game.map_name(), shared::constants::TICK_RATE);

    tokio::select! {
        _ = game::run(&mut net, &mut game, config.poll_interval) => {
            info!("Network closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    net.stop();
    Ok(())
}
