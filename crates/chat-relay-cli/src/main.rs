//! relay-server: chat relay bridge with a console host
//!
//! Listens for the chat bot on the configured address and stands in for the
//! game server on stdin/stdout:
//! - `join <name>` / `leave <name>` announce a participant
//! - `bot <name>` adds a host-controlled participant (never announced)
//! - `say <name> <text>` sends chat from a participant
//!
//! Frames from the bot are printed to stdout.

use anyhow::Result;
use chat_relay::{Host, Participant, Relay, RelayConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// One parsed console line
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Join(&'a str),
    Bot(&'a str),
    Leave(&'a str),
    Say(&'a str, &'a str),
}

fn parse_command(line: &str) -> Option<Command<'_>> {
    let (verb, rest) = line.trim().split_once(' ')?;
    let rest = rest.trim_start();
    match verb {
        "join" if !rest.is_empty() => Some(Command::Join(rest)),
        "bot" if !rest.is_empty() => Some(Command::Bot(rest)),
        "leave" if !rest.is_empty() => Some(Command::Leave(rest)),
        "say" => {
            let (name, text) = rest.split_once(' ')?;
            Some(Command::Say(name, text))
        }
        _ => None,
    }
}

/// Host that prints broadcasts and remembers which participants are bots
#[derive(Default)]
struct ConsoleHost {
    bots: Mutex<Vec<u32>>,
}

impl Host for ConsoleHost {
    fn broadcast(&self, text: &str) {
        println!("{}", text);
    }

    fn is_host_controlled(&self, participant: &Participant) -> bool {
        self.bots
            .lock()
            .map(|bots| bots.contains(&participant.id))
            .unwrap_or(false)
    }
}

/// Participants known to the console session
#[derive(Default)]
struct Roster {
    by_name: HashMap<String, Participant>,
    next_id: u32,
}

impl Roster {
    fn get_or_add(&mut self, name: &str) -> Participant {
        if let Some(participant) = self.by_name.get(name) {
            return participant.clone();
        }
        self.next_id += 1;
        let participant = Participant::new(self.next_id, name);
        self.by_name.insert(name.to_string(), participant.clone());
        participant
    }

    fn remove(&mut self, name: &str) -> Option<Participant> {
        self.by_name.remove(name)
    }
}

async fn handle_line(relay: &Arc<Relay>, host: &ConsoleHost, roster: &mut Roster, line: &str) {
    match parse_command(line) {
        Some(Command::Join(name)) => {
            let participant = roster.get_or_add(name);
            relay.on_participant_connected(&participant).await;
        }
        Some(Command::Bot(name)) => {
            let participant = roster.get_or_add(name);
            if let Ok(mut bots) = host.bots.lock() {
                bots.push(participant.id);
            }
            relay.on_participant_connected(&participant).await;
        }
        Some(Command::Leave(name)) => match roster.remove(name) {
            Some(participant) => {
                relay
                    .on_participant_disconnected(&participant, "left the game")
                    .await
            }
            None => warn!("Unknown participant: {}", name),
        },
        Some(Command::Say(name, text)) => {
            let participant = roster.get_or_add(name);
            relay.on_chat_broadcast(&participant, text).await;
        }
        None => {
            if !line.trim().is_empty() {
                warn!("Unrecognized command: {}", line.trim());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::default(),
    };

    info!(
        "Starting relay-server on {}, heartbeat every {:?}",
        config.listen_addr(),
        config.heartbeat_period()
    );

    let host = Arc::new(ConsoleHost::default());
    let relay = Relay::new(config, host.clone());
    relay
        .on_match_started()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start relay: {}", e))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut roster = Roster::default();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => handle_line(&relay, &host, &mut roster, &line).await,
                    None => {
                        info!("Console closed (EOF)");
                        break;
                    }
                }
            }
        }
    }

    relay.shutdown().await;
    Ok(())
}
