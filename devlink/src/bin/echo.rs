//! Demo loop for a device link.
//!
//! Connects to a board, then forever prints every received frame and sends
//! `[1]` during the first half of each 200-cycle period and `[0]` during the
//! second half, which blinks an LED on a stock sketch.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal::unix::{self, SignalKind};

use devlink::config::LinkConfig;
use devlink::link::DeviceLink;
use devlink::rate::FrameRate;
use devlink::tracing::{self, prelude::*};

/// Cycles per on/off period.
const PERIOD: u32 = 200;

#[derive(Parser, Debug)]
#[command(name = "devlink-echo", about = "Exchange frames with a serial device")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port to open instead of discovering one
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    baud_rate: Option<u32>,

    /// Width of every outbound field
    #[arg(short, long)]
    digits: Option<usize>,

    #[arg(short, long)]
    max_retries: Option<u32>,
}

impl Args {
    fn into_config(self) -> Result<LinkConfig> {
        self.into_config_with(|key| std::env::var(key).ok())
    }

    // Layer file, then `lookup` (the environment in production), then flags.
    fn into_config_with<F>(self, lookup: F) -> Result<LinkConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.config {
            Some(path) => LinkConfig::load_from(path)?,
            None => LinkConfig::default(),
        };
        config.apply_overrides(lookup)?;

        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(baud_rate) = self.baud_rate {
            config.baud_rate = baud_rate;
        }
        if let Some(digits) = self.digits {
            config.digits = digits;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Value to send on the given cycle, counted from 1.
fn cycle_value(count: u32) -> i64 {
    if count < PERIOD / 2 {
        1
    } else {
        0
    }
}

async fn run(mut link: DeviceLink) {
    let mut rate = FrameRate::default();
    let mut count = 0;

    loop {
        count += 1;

        let fields = link.receive().await;
        println!("{:?}", fields);

        if !link.send(&[cycle_value(count)]).await {
            trace!(health = %link.health(), "Send failed.");
        }

        rate.tick();
        if count == PERIOD {
            debug!("{rate}");
            count = 0;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stdout();

    let config = Args::parse().into_config()?;
    let link = DeviceLink::connect(config).await;
    if !link.is_connected() {
        bail!("no serial device connected");
    }
    info!(port = link.port_name().unwrap_or_default(), "Started.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;

    tokio::select! {
        _ = run(link) => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }

    trace!("Shutting down.");
    info!("Exiting.");
    Ok(())
}
