use clap::Parser;
use server::network::Server;
use tokio::time::Duration;

/// Command-line configuration for the arena server binary.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Seconds between periodic status broadcasts (leaderboard, waiting
    /// status, end-condition poll)
    #[clap(short, long, default_value = "2")]
    broadcast_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, Duration::from_secs(args.broadcast_interval)).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
