use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tack_core::{ChannelId, EngineConfig, PinEmoji, DEFAULT_PIN_CAPACITY};
use tack_discord::{GatewayHandler, PinBridgeRuntime, SerenityPinCapability};
use tack_engine::PinEngine;
use tack_store::{PinStore, SqlitePinStore};
use tokio::sync::{mpsc, watch};
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be at least 1".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be at least 1".to_string());
    }
    Ok(parsed)
}

fn parse_pin_capacity(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if !(1..=DEFAULT_PIN_CAPACITY).contains(&parsed) {
        return Err(format!("value must be in range 1..={DEFAULT_PIN_CAPACITY}"));
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "tack",
    about = "Reaction-driven auto-pin bot for Discord",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "TACK_DISCORD_TOKEN",
        hide_env_values = true,
        help = "Bot token used for the gateway session and REST calls"
    )]
    discord_token: String,

    #[arg(
        long,
        env = "TACK_PIN_EMOJI",
        default_value = "\u{1F4CC}",
        help = "Reaction emoji that counts toward the pin threshold, literal Unicode or <:name:id>"
    )]
    pin_emoji: String,

    #[arg(
        long,
        env = "TACK_THRESHOLD",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Reaction count that triggers an automatic pin"
    )]
    threshold: usize,

    #[arg(
        long,
        env = "TACK_CAPACITY",
        default_value_t = DEFAULT_PIN_CAPACITY,
        value_parser = parse_pin_capacity,
        help = "Channel pin capacity honored when making room, at most Discord's limit of 50"
    )]
    capacity: usize,

    #[arg(
        long,
        env = "TACK_UNPIN_ON_FALLBACK",
        default_value_t = true,
        action = ArgAction::Set,
        help = "Unpin a tracked message when its reaction count falls back below the threshold"
    )]
    unpin_on_fallback: bool,

    #[arg(
        long,
        env = "TACK_ANNOUNCE_PINS",
        default_value_t = true,
        action = ArgAction::Set,
        help = "Announce each automatic pin in the channel where it happened"
    )]
    announce_pins: bool,

    #[arg(
        long,
        env = "TACK_OPERATOR_CHANNEL",
        value_parser = parse_positive_u64,
        help = "Channel id that receives capacity and failure notices instead of the affected channel"
    )]
    operator_channel: Option<u64>,

    #[arg(
        long,
        env = "TACK_STATE_DB",
        default_value = ".tack/pins.sqlite3",
        help = "Path of the sqlite database holding durable pin state"
    )]
    state_db: PathBuf,

    #[arg(
        long,
        env = "TACK_QUEUE_CAPACITY",
        default_value_t = 1024,
        value_parser = parse_positive_usize,
        help = "Bounded gateway event queue size; events beyond the bound are dropped"
    )]
    queue_capacity: usize,

    #[arg(
        long,
        env = "TACK_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Attempts per pin or unpin call before the action is abandoned"
    )]
    retry_max_attempts: usize,

    #[arg(
        long,
        env = "TACK_SHUTDOWN_GRACE_MS",
        default_value_t = 5_000,
        help = "Milliseconds granted to in-flight pin actions during shutdown"
    )]
    shutdown_grace_ms: u64,
}

fn engine_config(cli: &Cli) -> Result<EngineConfig> {
    let pin_emoji = PinEmoji::parse(&cli.pin_emoji)
        .with_context(|| format!("invalid --pin-emoji {:?}", cli.pin_emoji))?;
    Ok(EngineConfig {
        pin_emoji,
        threshold: cli.threshold,
        capacity: cli.capacity,
        unpin_on_fallback: cli.unpin_on_fallback,
        announce_pins: cli.announce_pins,
        operator_channel: cli.operator_channel.map(ChannelId),
        retry_max_attempts: cli.retry_max_attempts,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = engine_config(&cli)?;
    info!(
        emoji = %config.pin_emoji,
        threshold = config.threshold,
        capacity = config.capacity,
        state_db = %cli.state_db.display(),
        "starting tack"
    );

    let store = SqlitePinStore::new(&cli.state_db)
        .with_context(|| format!("opening pin state store at {}", cli.state_db.display()))?;
    let store: Arc<dyn PinStore> = Arc::new(store);

    let (events_tx, events_rx) = mpsc::channel(cli.queue_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handler = GatewayHandler::new(config.pin_emoji.clone(), events_tx);
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS;
    let mut client = Client::builder(&cli.discord_token, intents)
        .event_handler(handler)
        .await
        .context("building discord gateway client")?;

    let capability = Arc::new(SerenityPinCapability::new(client.http.clone()));
    let engine = Arc::new(PinEngine::new(store, capability, config));
    engine
        .resume()
        .await
        .context("replaying tracked pin state after restart")?;

    let runtime = PinBridgeRuntime::new(
        engine,
        events_rx,
        shutdown_rx,
        Duration::from_millis(cli.shutdown_grace_ms),
        cli.queue_capacity,
    );
    let runtime_task = tokio::spawn(runtime.run());

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown signal received, closing gateway session");
        shard_manager.shutdown_all().await;
    });

    let gateway = client.start().await;
    let _ = shutdown_tx.send(true);
    runtime_task
        .await
        .context("pin bridge runtime task failed")?;
    gateway.context("discord gateway session ended with an error")?;
    info!("tack stopped");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::{engine_config, Cli};
    use clap::Parser;

    fn cli_from(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("arguments should parse")
    }

    #[test]
    fn default_configuration_is_valid() {
        let cli = cli_from(&["tack", "--discord-token", "secret"]);
        let config = engine_config(&cli).expect("defaults should validate");
        assert_eq!(config.threshold, 3);
        assert_eq!(config.capacity, 50);
        assert!(config.unpin_on_fallback);
        assert!(config.announce_pins);
        assert!(config.operator_channel.is_none());
    }

    #[test]
    fn zero_threshold_is_rejected_at_parse_time() {
        let parsed = Cli::try_parse_from(["tack", "--discord-token", "secret", "--threshold", "0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn capacity_above_discord_limit_is_rejected() {
        let parsed = Cli::try_parse_from(["tack", "--discord-token", "secret", "--capacity", "51"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn malformed_emoji_spec_is_rejected() {
        let cli = cli_from(&["tack", "--discord-token", "secret", "--pin-emoji", "<:bad:>"]);
        assert!(engine_config(&cli).is_err());
    }

    #[test]
    fn custom_emoji_spec_lands_in_config() {
        let cli = cli_from(&[
            "tack",
            "--discord-token",
            "secret",
            "--pin-emoji",
            "<:goldstar:112233>",
        ]);
        let config = engine_config(&cli).expect("custom emoji should validate");
        assert_eq!(config.pin_emoji.to_string(), "<:goldstar:112233>");
    }

    #[test]
    fn settable_bools_accept_explicit_values() {
        let cli = cli_from(&[
            "tack",
            "--discord-token",
            "secret",
            "--unpin-on-fallback",
            "false",
            "--announce-pins",
            "false",
        ]);
        let config = engine_config(&cli).expect("explicit bools should validate");
        assert!(!config.unpin_on_fallback);
        assert!(!config.announce_pins);
    }
}
