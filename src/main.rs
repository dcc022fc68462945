//! Command line front-end for the client. Supports initializing a
//! configuration file, streaming the timeline from the configured relays,
//! and publishing text notes.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use driftnet::client::Client;
use driftnet::config::Settings;
use driftnet::engine::Timeline;
use driftnet::relay::{RelayEvent, RelayStatus};

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "driftnet",
    author,
    version,
    about = "Multi-relay Nostr client"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file.
    Init,
    /// Connect to the configured relays and stream the timeline to stdout.
    Feed {
        /// Show all events instead of only the contact list's.
        #[arg(long)]
        global: bool,
    },
    /// Sign a text note and broadcast it to every connected relay.
    Post {
        /// Note content.
        content: String,
    },
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init => write_default_env(&cli.env)?,
        Commands::Feed { global } => {
            let mut client = connect_client(&cli.env)?;
            if global {
                client.engine_mut().set_timeline(Timeline::Global);
            }
            let mut printed: HashSet<String> = HashSet::new();
            while client.handle_next().await.is_some() {
                let fresh: Vec<(i64, String, String)> = client
                    .engine()
                    .visible_feed()
                    .iter()
                    .filter(|(ev, _)| !printed.contains(&ev.id))
                    .map(|(ev, profile)| {
                        let who = profile
                            .and_then(|p| p.name.clone())
                            .unwrap_or_else(|| short_key(&ev.pubkey));
                        (ev.created_at, who, ev.content.clone())
                    })
                    .collect();
                for (ev, _) in client.engine().visible_feed() {
                    printed.insert(ev.id.clone());
                }
                for (created_at, who, content) in fresh {
                    println!("[{created_at}] {who}: {content}");
                }
            }
        }
        Commands::Post { content } => {
            let mut client = connect_client(&cli.env)?;
            // Wait for the first relay to come up before broadcasting.
            loop {
                match client.handle_next().await {
                    Some((_, RelayEvent::Status(RelayStatus::Connected))) => break,
                    Some(_) => continue,
                    None => bail!("connection stream closed"),
                }
            }
            client.post(&content)?;
            // Give the transports a moment to flush the note.
            tokio::time::sleep(Duration::from_millis(500)).await;
            client.shutdown();
        }
    }
    Ok(())
}

/// Load settings and open connections to every configured relay.
fn connect_client(env_path: &str) -> anyhow::Result<Client> {
    let cfg = Settings::from_env(env_path)?;
    if cfg.relays.is_empty() {
        bail!("no relays configured; set RELAYS in {env_path}");
    }
    let client = Client::new(&cfg)?;
    client.connect();
    Ok(client)
}

/// Create a default `.env` file at `path`, refusing to overwrite one.
fn write_default_env(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        bail!("configuration already exists: {path}");
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut content = String::new();
    content.push_str(
        "RELAYS=wss://nostr-pub.wellorder.net,wss://nostr-relay.wlvs.space,wss://nostr.bitcoiner.social\n",
    );
    content.push_str("PUBKEY=fd3fdb0d0d8d6f9a7667b53211de8ae3c5246b79bdaf64ebac849d5148b5615f\n");
    content.push_str("PRIVKEY=\n");
    content.push_str("TOR_SOCKS=\n");
    fs::write(env_path, content)?;
    Ok(())
}

fn short_key(pubkey: &str) -> String {
    pubkey.chars().take(8).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    run(Cli::parse()).await
}
