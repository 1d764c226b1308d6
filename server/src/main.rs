use clap::Parser;
use log::info;
use server::game::DEFAULT_BOARD_SIZE;
use server::network::{ConfigError, Server, ServerConfig};
use shared::{DEFAULT_HOST, DEFAULT_PORT};

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Don't Get Angry game server")]
struct Args {
    /// Address to bind to
    #[clap(default_value = DEFAULT_HOST)]
    host: String,
    /// Port to listen on
    #[clap(default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Maximum number of rooms that may exist at once
    #[clap(long, default_value_t = 10)]
    max_rooms: usize,
    /// Maximum number of players per room
    #[clap(long, default_value_t = 4)]
    max_clients_per_room: usize,
    /// Number of fields on the board
    #[clap(long, default_value_t = DEFAULT_BOARD_SIZE)]
    board_size: usize,
    /// Fixed die seed for reproducible games
    #[clap(long)]
    seed: Option<u64>,
}

impl TryFrom<Args> for ServerConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, ConfigError> {
        let config = ServerConfig {
            host: args.host,
            port: args.port,
            max_rooms: args.max_rooms,
            max_clients_per_room: args.max_clients_per_room,
            board_size: args.board_size,
            seed: args.seed,
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let config = match ServerConfig::try_from(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    let mut server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }
    server.shutdown();

    Ok(())
}
