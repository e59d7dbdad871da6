use clap::Parser;
use log::{error, info, warn};
use server::auth::TokenTable;
use server::config::GameConfig;
use server::error::ServerError;
use server::network::{Server, ServerSettings};
use server::persistence::{FileProfileStore, MemoryProfileStore, ProfileStore};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "SwordForge authoritative game server")]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of concurrent sessions
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// JSON file overriding game constants
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON token table: {"<token>": {"user_id": "...", "username": "..."}}
    #[arg(long)]
    tokens: Option<PathBuf>,

    /// Directory for player profiles; profiles stay in memory when absent
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seed for the world RNG
    #[arg(long, default_value = "0")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let game = match &args.config {
        Some(path) => GameConfig::from_file(path)?,
        None => GameConfig::default(),
    };

    let tokens = match &args.tokens {
        Some(path) => TokenTable::from_file(path)?,
        None => TokenTable::new(),
    };
    if tokens.is_empty() {
        warn!("Token table is empty; every connection will be refused");
    } else {
        info!("Loaded {} tokens", tokens.len());
    }

    let store: Box<dyn ProfileStore> = match &args.data_dir {
        Some(dir) => {
            info!("Storing profiles in {}", dir.display());
            Box::new(FileProfileStore::open(dir)?)
        }
        None => {
            warn!("No data directory given; profiles are lost on exit");
            Box::new(MemoryProfileStore::new())
        }
    };

    let settings = ServerSettings {
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        game,
        seed: args.seed,
    };
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, settings, Arc::new(tokens), store).await?;

    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    server.run_until(ctrl_c).await
}
