// Entry point for the message pump demo

mod config;
mod producer;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use msgpump::{
    channel_with, CancellationToken, ChannelWriter, Dispatcher, Driver, FailurePolicy, Message,
    Overflow, Pump, QuitPolicy,
};
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Run a message pump fed by synthetic producers or a script.
#[derive(Debug, Parser)]
#[command(name = "msgpump", version, about)]
struct Cli {
    /// Replay messages from a JSON-lines file instead of synthetic producers
    #[arg(long)]
    script: Option<PathBuf>,

    /// Number of synthetic producers
    #[arg(long, default_value_t = 2)]
    producers: usize,

    /// Messages written by each synthetic producer
    #[arg(long, default_value_t = 6)]
    messages: usize,

    /// Complete the channel without writing Quit
    #[arg(long)]
    no_quit: bool,

    /// Bound the channel (overrides PUMP_CHANNEL_CAPACITY)
    #[arg(long)]
    capacity: Option<usize>,

    /// Overflow policy for a bounded channel (overrides PUMP_OVERFLOW)
    #[arg(long)]
    overflow: Option<Overflow>,

    /// stop | drain (overrides PUMP_QUIT_POLICY)
    #[arg(long)]
    quit_policy: Option<QuitPolicy>,

    /// stop | continue (overrides PUMP_ON_HANDLER_ERROR)
    #[arg(long)]
    on_handler_error: Option<FailurePolicy>,
}

impl Cli {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(capacity) = self.capacity {
            let overflow = self.overflow.unwrap_or(config.channel.overflow);
            config.channel = msgpump::ChannelConfig::bounded(capacity, overflow);
        } else if let Some(overflow) = self.overflow {
            config.channel.overflow = overflow;
        }
        if let Some(policy) = self.quit_policy {
            config.driver.quit_policy = policy;
        }
        if let Some(policy) = self.on_handler_error {
            config.driver.on_handler_error = policy;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,msgpump=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = cli.apply(Config::from_env().context("Failed to load configuration")?);
    info!(?config, "Configuration loaded");

    let (writer, reader) = channel_with(config.channel);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling pump");
                shutdown.cancel();
            }
        }
    });

    let feeder = tokio::spawn(feed(writer, cli.script.clone(), cli.producers, cli.messages, !cli.no_quit));

    let driver = Driver::new(Dispatcher::standard()).with_config(config.driver);
    let report = driver
        .run(Pump::new(reader, shutdown.child_token()))
        .await
        .context("Pump run failed")?;

    info!(
        dispatched = report.dispatched,
        unhandled = report.unhandled,
        failed = report.failed,
        exit = ?report.exit,
        "Pump finished"
    );

    // Producers may still be writing after an early Quit; their results no
    // longer matter.
    feeder.abort();
    Ok(())
}

/// Run every producer, then write Quit (if asked) and complete the channel.
async fn feed(
    writer: ChannelWriter,
    script: Option<PathBuf>,
    producers: usize,
    messages: usize,
    send_quit: bool,
) -> Result<()> {
    let mut tasks = JoinSet::new();
    match script {
        Some(path) => {
            let writer = writer.clone();
            tasks.spawn(async move { producer::run_script(writer, &path).await });
        }
        None => {
            for id in 0..producers {
                tasks.spawn(producer::run_synthetic(writer.clone(), id, messages));
            }
        }
    }

    let mut written = 0;
    while let Some(result) = tasks.join_next().await {
        match result.context("Producer task panicked")? {
            Ok(count) => written += count,
            Err(e) => warn!(error = %e, "Producer stopped early"),
        }
    }
    info!(written, "All producers finished");

    // A closed channel means the run already ended
    if send_quit && !writer.is_closed() {
        if let Err(e) = writer.write(Message::quit()) {
            warn!(error = %e, "Could not write quit");
        }
    }
    writer.complete();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgpump::ChannelConfig;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("msgpump").chain(args.iter().copied()))
    }

    #[test]
    fn test_no_flags_keep_env_config() {
        let env = Config {
            channel: ChannelConfig::bounded(8, Overflow::Reject),
            driver: msgpump::DriverConfig {
                quit_policy: QuitPolicy::DrainBuffered,
                on_handler_error: FailurePolicy::Continue,
            },
        };
        assert_eq!(cli(&[]).apply(env), env);
    }

    #[test]
    fn test_overflow_flag_without_capacity_stays_unbounded() {
        let config = cli(&["--overflow", "reject"]).apply(Config::default());
        assert_eq!(config.channel.capacity, None);
        assert_eq!(config.channel.overflow, Overflow::Reject);
    }

    #[test]
    fn test_capacity_flag_keeps_env_overflow() {
        let env = Config {
            channel: ChannelConfig::bounded(64, Overflow::DropOldest),
            ..Default::default()
        };
        let config = cli(&["--capacity", "4"]).apply(env);
        assert_eq!(config.channel, ChannelConfig::bounded(4, Overflow::DropOldest));

        let config = cli(&["--capacity", "4", "--overflow", "drop-newest"]).apply(env);
        assert_eq!(config.channel, ChannelConfig::bounded(4, Overflow::DropNewest));
    }

    #[test]
    fn test_policy_flags_override_env() {
        let env = Config {
            driver: msgpump::DriverConfig {
                quit_policy: QuitPolicy::DrainBuffered,
                on_handler_error: FailurePolicy::Continue,
            },
            ..Default::default()
        };
        let config = cli(&["--quit-policy", "stop", "--on-handler-error", "stop"]).apply(env);
        assert_eq!(config.driver.quit_policy, QuitPolicy::StopImmediately);
        assert_eq!(config.driver.on_handler_error, FailurePolicy::Stop);
        assert_eq!(config.channel, env.channel);
    }

    #[test]
    fn test_bad_flag_value_is_rejected() {
        let args = ["msgpump", "--overflow", "block"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
