//! # dicefleetd — dice fleet daemon
//!
//! Composition root that wires a transport into a [`Fleet`] and prints the
//! fleet's events.
//!
//! ## Responsibilities
//! - Load configuration (`dicefleet.toml`, env vars)
//! - Initialize logging
//! - Build the configured transport (BLE or virtual dice)
//! - Start the fleet and its discovery cycle
//! - Drain the event queues periodically and print each event as a JSON line
//! - Handle graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod output;

use std::time::Duration;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

use dicefleet_adapter_ble::BleTransport;
use dicefleet_adapter_virtual::VirtualTransport;
use dicefleet_app::Fleet;
use dicefleet_app::ports::Transport;
use dicefleet_domain::command::BlinkParams;
use dicefleet_domain::die::RollState;

use config::{Config, OutputConfig, TransportKind};
use output::EventLine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .with_writer(std::io::stderr)
        .init();

    match config.transport.kind {
        TransportKind::Ble => {
            let transport = BleTransport::new(config.ble.clone()).await?;
            run(transport, &config).await;
        }
        TransportKind::Virtual => {
            let transport = VirtualTransport::new(&config.virtual_dice);
            let simulation = (config.virtual_dice.roll_interval_ms > 0).then(|| {
                transport.spawn_simulation(Duration::from_millis(
                    config.virtual_dice.roll_interval_ms,
                ))
            });
            run(transport, &config).await;
            if let Some(simulation) = simulation {
                simulation.abort();
            }
        }
    }

    Ok(())
}

/// Run the fleet until Ctrl-C.
async fn run<T: Transport>(transport: T, config: &Config) {
    let fleet = Fleet::start(transport, config.fleet.clone());
    fleet.start_discovery(
        config.scan.duration(),
        config.scan.interval(),
        config.scan.auto_connect,
    );

    let mut ticker = tokio::time::interval(config.output.poll_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => poll(&fleet, &config.output).await,
            result = &mut shutdown => {
                if let Err(err) = result {
                    tracing::error!(%err, "failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    tracing::info!("shutting down");
    fleet.shutdown().await;
}

/// Drain both queues and print their entries.
async fn poll<T: Transport>(fleet: &Fleet<T>, output: &OutputConfig) {
    for (id, event) in fleet.drain_roll_events() {
        let name = fleet.description(id).name;
        emit(&EventLine::new(Utc::now(), id, &name, event));

        if output.blink_on_roll && event.state == RollState::OnFace {
            fleet.send_blink(id, &BlinkParams::default()).await;
        }
    }

    for (id, event) in fleet.drain_battery_events() {
        let name = fleet.description(id).name;
        emit(&EventLine::new(Utc::now(), id, &name, event));
    }
}

fn emit(line: &EventLine<'_>) {
    match line.render() {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::warn!(%err, "failed to render event"),
    }
}
