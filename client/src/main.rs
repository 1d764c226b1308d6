use clap::Parser;
use client::input;
use client::network::Client;
use log::{error, info};
use shared::{DEFAULT_HOST, DEFAULT_PORT};
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about = "Don't Get Angry text client", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let mut client = match Client::connect(&address).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Cannot connect to the server: {}", e);
            std::process::exit(1);
        }
    };
    info!("Connected to {}", address);

    let result = input::run(&mut client, BufReader::new(tokio::io::stdin())).await;
    client.close().await;

    if let Err(e) = result {
        error!("Client stopped: {}", e);
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }

    println!("Bye!");
    Ok(())
}
