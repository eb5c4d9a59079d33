//! Vex command-line chat client.
//!
//! # Usage
//!
//! ```bash
//! # Connect, register a fresh identity, chat in a channel
//! vex --host chat.example.com --channel general
//!
//! # Local development server without TLS, pinned server key
//! vex --host localhost:8000 --insecure --server-key <hex> --channel general
//! ```
//!
//! Lines read from stdin are posted to the channel. Incoming messages and
//! session events are logged.

mod key_file;

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vex_client::{Client, ClientConfig, Lifecycle, SystemEnv};
use vex_core::{Ed25519Keyring, Keyring};

/// Vex chat client
#[derive(Parser, Debug)]
#[command(name = "vex")]
#[command(about = "Vex chat protocol client")]
#[command(version)]
struct Args {
    /// Server host, with optional port
    #[arg(long, default_value = "localhost:8000")]
    host: String,

    /// Use ws/http instead of wss/https
    #[arg(long)]
    insecure: bool,

    /// Hex-encoded server public key to trust instead of pinning on first use
    #[arg(long)]
    server_key: Option<String>,

    /// File holding our hex-encoded secret key; written after a fresh key
    /// is registered
    #[arg(long, default_value = "vex.key")]
    key_file: PathBuf,

    /// Channel to join and post to
    #[arg(long)]
    channel: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let (keyring, fresh) = match key_file::load(&args.key_file).await? {
        Some(keyring) => (keyring, false),
        None => (Ed25519Keyring::generate(&SystemEnv::new()), true),
    };
    info!(public_key = %keyring.public_key_hex(), fresh, "identity");

    let mut config = ClientConfig::new(args.host);
    if args.insecure {
        config = config.insecure();
    }
    if let Some(key) = args.server_key {
        config = config.with_server_key(key);
    }

    let client = Client::connect(config, keyring.clone());
    spawn_event_log(&client);

    client.wait_ready().await?;
    info!(url = %client.config().websocket_url(), "connected");

    if fresh {
        let user = client.register().await?;
        key_file::save(&args.key_file, &keyring).await?;
        info!(
            user_id = %user.user_id,
            path = %args.key_file.display(),
            "registered new identity"
        );
    }

    let server_key = client.auth().await?;
    info!(%server_key, "authenticated");

    let Some(channel) = args.channel else {
        let channels = client.channels().retrieve().await?;
        for channel in channels {
            info!(id = %channel.channel_id, name = %channel.name, "channel");
        }
        client.logout().await?;
        return Ok(());
    };

    client.channels().join(&channel).await?;
    for message in client.messages().retrieve(&channel, None).await? {
        info!(user = %message.user_id, "{}", message.message);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(err) = client.messages().send(&channel, line).await {
            warn!(error = %err, "message not sent");
        }
    }

    client.logout().await?;
    Ok(())
}

/// Logs chat, lifecycle and fault notifications until the client shuts down.
fn spawn_event_log(client: &Client) {
    let subscriptions = client.subscriptions();
    let mut chat = subscriptions.chat();
    let mut lifecycle = subscriptions.lifecycle();
    let mut faults = subscriptions.faults();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Ok(message) = chat.recv() => {
                    info!(
                        channel = %message.channel_id,
                        user = %message.user_id,
                        "{}",
                        message.message
                    );
                },
                Ok(event) = lifecycle.recv() => match event {
                    Lifecycle::LivenessDegraded { missed } => {
                        warn!(missed, "server is not answering pings");
                    },
                    Lifecycle::StateChanged(state) => info!(?state, "session state"),
                    Lifecycle::Ready => {},
                },
                Ok(fault) = faults.recv() => warn!(%fault, "session fault"),
                else => break,
            }
        }
    });
}
