use clap::Parser;
use client::poller::{Poller, PollerConfig, DEFAULT_LOOP_CADENCE};
use log::{info, warn};
use shared::ServerStatus;
use std::io::BufRead;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Game server host name or IP address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Game server query port
    #[arg(short = 'p', long, default_value = "27015")]
    port: u16,

    /// Local UDP port to send queries from (0 picks any free port)
    #[arg(long, default_value = "27005")]
    local_port: u16,

    /// Seconds to wait after a successful poll
    #[arg(short = 'i', long, default_value = "60")]
    interval: u64,

    /// Seconds to wait for each response before giving up on a poll
    #[arg(short = 't', long, default_value = "5")]
    timeout: f64,

    /// Print each status as a JSON line
    #[arg(long)]
    json: bool,

    /// Exit after the first status
    #[arg(long)]
    once: bool,
}

enum Command {
    Refresh,
    Quit,
}

/// Reads stdin on its own thread so a pending read never holds up shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<Command> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "" | "r" => Command::Refresh,
                "q" => Command::Quit,
                other => {
                    warn!("Unknown command '{}' (Enter or r refreshes, q quits)", other);
                    continue;
                }
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    });

    rx
}

fn print_status(status: &ServerStatus, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(status)?);
        return Ok(());
    }

    println!("[{}] {}", status.badge(), status.tooltip());
    if let ServerStatus::Ok(info) = status {
        for player in &info.player_list {
            let minutes = (player.duration / 60.0).floor() as u32;
            println!(
                "    {:<32} {:>6}  {:>4}m",
                player.name, player.score, minutes
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = PollerConfig {
        remote_host: args.host,
        remote_port: args.port,
        local_port: args.local_port,
        poll_interval: Duration::from_secs(args.interval),
        step_timeout: Duration::from_secs_f64(args.timeout.max(0.0).min(86_400.0)),
        loop_cadence: DEFAULT_LOOP_CADENCE,
    };

    info!("Querying {}:{}", config.remote_host, config.remote_port);
    if !args.json {
        info!("Press Enter to refresh, q to quit");
    }

    let mut handle = Poller::start(config).await?;
    let mut commands = spawn_stdin_reader();
    let mut stdin_open = true;

    print_status(&ServerStatus::Pending, args.json)?;

    loop {
        tokio::select! {
            status = handle.recv() => {
                let Some(status) = status else { break };
                print_status(&status, args.json)?;
                if args.once {
                    break;
                }
            },

            command = commands.recv(), if stdin_open => match command {
                Some(Command::Refresh) => {
                    handle.refresh();
                }
                Some(Command::Quit) => break,
                None => stdin_open = false,
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;

    Ok(())
}
