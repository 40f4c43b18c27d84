use clap::Parser;
use log::info;
use server::network::QueryServer;
use server::roster::generate_players;
use shared::ServerInfo;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Query port to listen on
    #[clap(short, long, default_value = "27015")]
    port: u16,
    /// Server name reported in info responses
    #[clap(short, long, default_value = "Local Test Server")]
    name: String,
    /// Map name reported in info responses
    #[clap(short, long, default_value = "cp_dustbowl")]
    map: String,
    /// Number of fake players to report
    #[clap(long, default_value = "4")]
    players: usize,
    /// Maximum player count reported in info responses
    #[clap(long, default_value = "24")]
    max_players: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let info = ServerInfo {
        name: args.name,
        map: args.map,
        folder: "tf".to_string(),
        game: "Team Fortress".to_string(),
        id: 440,
        max_players: args.max_players,
        server_type: b'd',
        environment: b'l',
        vac: 1,
        ..Default::default()
    };

    let players = generate_players(args.players, &mut rand::thread_rng());
    info!("Serving {} fake players", players.len());

    let address = format!("{}:{}", args.host, args.port);
    let server = QueryServer::bind(&address, info, players).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await;

    Ok(())
}
