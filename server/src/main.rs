use clap::Parser;
use log::{error, info};
use server::config::{GameConfig, ServerConfig};
use server::network::{BoxError, Server};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, env = "TACTICS_HOST", default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, env = "TACTICS_PORT", default_value = "8080")]
    port: u16,
    /// Maximum number of concurrent connections
    #[clap(short, long, env = "TACTICS_MAX_CONNECTIONS", default_value = "256")]
    max_connections: usize,
    /// Grid width in cells
    #[clap(long, env = "TACTICS_GRID_WIDTH", default_value = "10")]
    grid_width: i32,
    /// Grid height in cells
    #[clap(long, env = "TACTICS_GRID_HEIGHT", default_value = "10")]
    grid_height: i32,
    /// Action points granted at the start of each turn
    #[clap(short, long, env = "TACTICS_ACTION_POINTS", default_value = "5")]
    action_points: u32,
    /// Seconds before a stalled turn is ended automatically (0 disables)
    #[clap(long, env = "TACTICS_TURN_TIMEOUT_SEC", default_value = "45")]
    turn_timeout_secs: u64,
    /// Seconds without inbound frames before a connection is dropped (0 disables)
    #[clap(long, env = "TACTICS_IDLE_TIMEOUT_SEC", default_value = "300")]
    idle_timeout_secs: u64,
    /// Pick the opening player at random
    #[clap(long, env = "TACTICS_RANDOM_TURN_ORDER")]
    random_turn_order: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            address: format!("{}:{}", self.host, self.port),
            max_connections: self.max_connections,
            turn_timeout: Duration::from_secs(self.turn_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            game: GameConfig {
                grid_width: self.grid_width,
                grid_height: self.grid_height,
                action_points_per_turn: self.action_points,
                random_turn_order: self.random_turn_order,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();

    let config = Args::parse().into_config();
    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Server stopped: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
