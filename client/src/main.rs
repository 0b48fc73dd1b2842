use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use client::{FeedHandle, SessionClient};
use shared::config::load_config;
use shared::types::{ClientConfig, LoginData, MessageId, TopicId};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "client", about = "Campus events session and notification client")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and persist the access token
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Log out and forget the stored token
    Logout,
    /// Show who the stored token belongs to
    Whoami,
    /// Follow the notification feed of one event
    Watch {
        #[arg(short, long)]
        topic: TopicId,
        /// Poll instead of holding a push connection
        #[arg(long)]
        poll: bool,
        /// Poll interval, overrides `polling.interval_ms`
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: Option<u64>,
    },
}

fn init_tracing(config: &ClientConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    init_tracing(&config);

    let session = SessionClient::from_config(&config)
        .await
        .context("Failed to build session client")?;

    match cli.command {
        Command::Login { username, password } => {
            let identity = session
                .login(&LoginData { username, password })
                .await
                .context("Login failed")?;
            println!("Logged in as {}", identity);
        }
        Command::Logout => {
            session.logout().await;
            println!("Logged out");
        }
        Command::Whoami => match session.restore_identity().await? {
            Some(identity) => println!("{}", identity),
            None => bail!("Not logged in"),
        },
        Command::Watch {
            topic,
            poll,
            interval_ms,
        } => {
            let handle = if poll {
                session.subscribe_polling(topic, interval_ms.map(Duration::from_millis))
            } else {
                session.subscribe_live(topic)
            };
            watch(handle).await;
        }
    }

    Ok(())
}

/// Print each message once, as it arrives, until the feed ends or Ctrl-C.
async fn watch(mut handle: FeedHandle) {
    let mut printed: HashSet<MessageId> = HashSet::new();
    info!("Watching topic {}", handle.topic_id());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, unsubscribing");
                break;
            }
            update = handle.changed() => {
                let Some(state) = update else { break };
                for message in state.messages.iter().filter(|m| printed.insert(m.id)) {
                    println!("{}", message);
                }
                if state.status.is_disconnected() {
                    match &state.last_error {
                        Some(reason) => warn!("Feed {}: {}", state.status, reason),
                        None => warn!("Feed {}", state.status),
                    }
                    break;
                }
            }
        }
    }

    let last = handle.shutdown().await;
    info!("Stopped watching topic {} ({})", last.topic_id, last.status);
}
