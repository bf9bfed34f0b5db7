use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use airwatch::daemon::Daemon;
use airwatch::models::FlightRecord;
use airwatch::notify::{HistoryStore, ThrottlePolicy};

#[derive(Parser, Debug)]
#[command(
    name = "airwatch",
    about = "Flight price watcher - answers flight searches from cached route data and alerts on price drops"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/airwatch.toml", global = true)]
    config: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the listener, route monitor and alert consumer until Ctrl-C
    Run,
    /// Send one test alert through every channel, bypassing the throttle
    Notify {
        #[arg(long, default_value = "150")]
        price: Decimal,
        #[arg(long, default_value = "Test Airline")]
        airline: String,
        #[arg(long, default_value = "")]
        origin: String,
        #[arg(long, default_value = "Test Destination")]
        destination: String,
    },
    /// Reset the notification history file
    ClearHistory,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = airwatch::load_config(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config))?;

    match cli.command {
        Command::Run => {
            let daemon = Daemon::from_config(config).await;
            let cancel = daemon.cancel_token();

            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received shutdown signal");
                cancel.cancel();
            });

            daemon.run().await.context("Daemon error")?;
        }
        Command::Notify {
            price,
            airline,
            origin,
            destination,
        } => {
            let throttle = airwatch::build_throttle(&config, ThrottlePolicy::Disabled).await;
            let flight = FlightRecord {
                price,
                carrier: airline,
                origin,
                destination,
                departure: String::new(),
                fetched_at: Utc::now(),
                source: "airwatch notify".to_string(),
            };
            if !throttle.evaluate(&flight, config.threshold).await {
                bail!(
                    "Price {} is not below the threshold {}",
                    flight.price,
                    config.threshold
                );
            }
            println!(
                "Test alert sent via {}",
                throttle.channel_names().join(", ")
            );
        }
        Command::ClearHistory => {
            let history = HistoryStore::new(&config.notifications.history_path);
            history
                .clear()
                .await
                .with_context(|| format!("Failed to clear {}", history.path().display()))?;
            println!("Notification history cleared: {}", history.path().display());
        }
    }

    Ok(())
}
