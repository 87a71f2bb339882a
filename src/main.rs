//! Pushbridge CLI - drives the push bridge against an imported subscription.
//!
//! This is the binary entry point. See the `pushbridge` library for the
//! core functionality.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use pushbridge::event_log::{EventLogStore, EventLogWriter};
use pushbridge::host::{ConsoleDisplay, FileHost};
use pushbridge::service_worker::ServiceWorker;
use pushbridge::{Config, PushClient, SegmentSet, SegmentValue};

#[derive(Parser)]
#[command(name = "pushbridge", version, about = "Push notification bridge for RichFlyer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the configuration, or set one key and save it
    Config {
        /// Config key, e.g. service_key
        key: Option<String>,
        /// New value
        value: Option<String>,
    },
    /// Print the server public key (base64url)
    ServerKey,
    /// Import a subscription exported with PushSubscription.toJSON()
    Import {
        /// Path to the exported JSON
        path: PathBuf,
    },
    /// Request permission, subscribe and activate the device
    Init,
    /// Send segments as key=value pairs
    Segments {
        /// Segment assignments, e.g. plan=pro age=30 vip=true
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Handle a received push payload (service worker side)
    Receive {
        /// Push payload JSON
        payload: String,
    },
    /// Report the pending notification event
    Report,
    /// Show the stored notification event record
    Pending,
    /// Drop the subscription and cached token
    Unsubscribe,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    let data_dir = config.data_dir()?;
    let host = FileHost::new(&data_dir);

    match cli.command {
        Commands::Config { key, value } => match (key, value) {
            (Some(key), Some(value)) => {
                config.set(&key, &value)?;
                config.save()?;
                println!("Set {key}");
            }
            (Some(key), None) => anyhow::bail!("Missing value for '{key}'"),
            _ => println!("{}", serde_json::to_string_pretty(&config)?),
        },
        Commands::ServerKey => {
            let client = client(config, &host)?;
            let key = client.server_public_key().await?;
            println!("{}", pushbridge::codec::encode_url_safe_base64(&key));
        }
        Commands::Import { path } => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let subscription = host.subscriptions().import(&json)?;
            println!("Imported subscription for {}", subscription.endpoint());
        }
        Commands::Init => {
            let outcome = client(config, &host)?.initialize().await?;
            println!("{outcome:?}");
        }
        Commands::Segments { values } => {
            let segments = parse_segments(&values)?;
            client(config, &host)?.update_segments(&segments).await?;
            println!("Updated {} segment(s)", segments.len());
        }
        Commands::Receive { payload } => {
            // The service worker side needs no service key or network
            let writer = EventLogWriter::new(EventLogStore::open(&data_dir));
            let worker = ServiceWorker::new(writer, Arc::new(ConsoleDisplay));
            worker.handle_push(Some(payload.as_bytes())).await?;
        }
        Commands::Report => {
            let outcome = client(config, &host)?.report_pending_event().await?;
            println!("{outcome:?}");
        }
        Commands::Pending => match EventLogStore::open(&data_dir).get().await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => println!("No notification recorded"),
        },
        Commands::Unsubscribe => {
            let removed = client(config, &host)?.unsubscribe().await?;
            println!("{}", if removed { "Unsubscribed" } else { "No subscription" });
        }
    }

    Ok(())
}

fn client(config: Config, host: &FileHost) -> Result<PushClient> {
    config.validate()?;
    Ok(PushClient::new(config, host)?)
}

fn parse_segments(values: &[String]) -> Result<SegmentSet> {
    values
        .iter()
        .map(|pair| {
            let (name, raw) = pair
                .split_once('=')
                .with_context(|| format!("Expected key=value, got '{pair}'"))?;
            Ok((name.to_string(), SegmentValue::parse_cli(raw)))
        })
        .collect()
}
